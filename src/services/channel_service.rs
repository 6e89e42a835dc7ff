use sea_orm::DatabaseConnection;
use serde_json::Value;
use tracing::{error, info};

use crate::db::entities::channel;
use crate::db::enums::ChannelType;
use crate::db::services::channel_service as channel_db;
use crate::notifications::models::{
    ChannelConfig, ChannelResponse, Configuration, CreateChannelRequest, UpdateChannelRequest,
};
use crate::web::error::AppError;
use crate::web::models::AuthenticatedUser;

fn decode_config(channel_type: ChannelType, configuration: &Configuration) -> Result<ChannelConfig, AppError> {
    ChannelConfig::from_configuration(channel_type, configuration).map_err(AppError::invalid_fields)
}

/// Loads the channel and fails unless `user_id` owns it.
async fn owned_channel(
    db: &DatabaseConnection,
    user_id: i32,
    channel_id: i32,
    include_config: bool,
) -> Result<(channel::Model, Option<ChannelConfig>), AppError> {
    let (found, config) = channel_db::load_channel(db, channel_id, include_config)
        .await
        .inspect_err(|e| error!(error = %e, channel_id, "Error loading channel."))?
        .ok_or_else(|| AppError::NotFound(format!("channel {channel_id}")))?;

    if found.user_id != user_id {
        return Err(AppError::Forbidden);
    }
    Ok((found, config))
}

pub async fn create_channel(
    db: &DatabaseConnection,
    user: &AuthenticatedUser,
    req: CreateChannelRequest,
) -> Result<ChannelResponse, AppError> {
    let channel_type = req
        .channel_type
        .trim()
        .parse::<ChannelType>()
        .map_err(|_| AppError::UnsupportedChannelType(req.channel_type.clone()))?;

    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::invalid_fields(["name"]));
    }

    let mut configuration = req.configuration.unwrap_or_default();
    // Email channels notify the owner unless told otherwise.
    if channel_type == ChannelType::Email
        && configuration
            .get("email")
            .and_then(Value::as_str)
            .map_or(true, |s| s.trim().is_empty())
    {
        configuration.insert("email".into(), Value::from(user.email.clone()));
    }
    let config = decode_config(channel_type, &configuration)?;

    let saved = channel_db::save_channel(db, user.id, name, &config)
        .await
        .inspect_err(|e| error!(error = %e, user_id = user.id, "Error saving channel."))?;
    info!(user_id = user.id, channel_id = saved.id, channel_type = %channel_type, "Channel created.");
    Ok(ChannelResponse::new(saved, Some(&config)))
}

pub async fn get_channel(
    db: &DatabaseConnection,
    user_id: i32,
    channel_id: i32,
) -> Result<ChannelResponse, AppError> {
    let (found, config) = owned_channel(db, user_id, channel_id, true).await?;
    Ok(ChannelResponse::new(found, config.as_ref()))
}

pub async fn list_channels(
    db: &DatabaseConnection,
    user_id: i32,
    include_config: bool,
) -> Result<Vec<ChannelResponse>, AppError> {
    let channels = channel_db::get_channels_for_user(db, user_id, include_config)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "Error listing channels."))?;
    Ok(channels
        .into_iter()
        .map(|(c, config)| ChannelResponse::new(c, config.as_ref()))
        .collect())
}

/// Renames and/or reconfigures a channel. The configuration is read with the
/// channel's stored type, so the type itself never changes.
pub async fn update_channel(
    db: &DatabaseConnection,
    user_id: i32,
    channel_id: i32,
    req: UpdateChannelRequest,
) -> Result<ChannelResponse, AppError> {
    let (existing, current) = owned_channel(db, user_id, channel_id, true).await?;

    let name = match req.name.as_deref().map(str::trim) {
        Some("") => return Err(AppError::invalid_fields(["name"])),
        Some(n) => n.to_string(),
        None => existing.name.clone(),
    };
    let new_config = req
        .configuration
        .as_ref()
        .map(|c| decode_config(existing.channel_type, c))
        .transpose()?;

    let updated = channel_db::update_channel(db, existing, &name, new_config.as_ref())
        .await
        .inspect_err(|e| error!(error = %e, channel_id, "Error updating channel."))?;
    info!(user_id, channel_id, "Channel updated.");

    let config = new_config.or(current);
    Ok(ChannelResponse::new(updated, config.as_ref()))
}

pub async fn delete_channel(db: &DatabaseConnection, user_id: i32, channel_id: i32) -> Result<(), AppError> {
    let (existing, _) = owned_channel(db, user_id, channel_id, false).await?;
    channel_db::delete_channel(db, &existing)
        .await
        .inspect_err(|e| error!(error = %e, channel_id, "Error deleting channel."))?;
    info!(user_id, channel_id, "Channel deleted.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::{channel_email, prelude::Channel};
    use crate::db::enums::AccountType;
    use crate::db::services::user_service;
    use crate::test_support::test_db;
    use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait};
    use serde_json::json;

    async fn seed_user(db: &DatabaseConnection, email: &str) -> AuthenticatedUser {
        let user = user_service::create_user(db, email, "Channels", "hash", AccountType::Free)
            .await
            .unwrap();
        AuthenticatedUser {
            id: user.id,
            email: user.email,
            name: user.name,
            account_type: user.account_type.to_string(),
        }
    }

    fn request(channel_type: &str, name: &str, configuration: Value) -> CreateChannelRequest {
        CreateChannelRequest {
            name: name.to_string(),
            channel_type: channel_type.to_string(),
            configuration: configuration.as_object().cloned(),
        }
    }

    #[tokio::test]
    async fn email_channel_round_trips() {
        let db = test_db().await;
        let user = seed_user(&db, "round@cronspy.com").await;

        let created = create_channel(&db, &user, request("EMAIL", "ops", json!({ "email": "a@b.com" })))
            .await
            .unwrap();
        let loaded = get_channel(&db, user.id, created.id).await.unwrap();

        assert_eq!(loaded.channel_type, ChannelType::Email);
        assert_eq!(loaded.name, "ops");
        assert_eq!(loaded.configuration, json!({ "email": "a@b.com" }).as_object().cloned());
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn email_defaults_to_owner_address() {
        let db = test_db().await;
        let user = seed_user(&db, "me@cronspy.com").await;

        let created = create_channel(&db, &user, request("EMAIL", "me", Value::Null))
            .await
            .unwrap();
        let configuration = created.configuration.unwrap();
        assert_eq!(configuration.get("email"), Some(&json!("me@cronspy.com")));
    }

    #[tokio::test]
    async fn unsupported_type_and_missing_fields_write_nothing() {
        let db = test_db().await;
        let user = seed_user(&db, "bad@cronspy.com").await;

        let err = create_channel(&db, &user, request("PAGER", "p", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedChannelType(t) if t == "PAGER"));

        let err = create_channel(&db, &user, request("SLACK", "s", json!({ "slack_channel_name": "#ops" })))
            .await
            .unwrap_err();
        match err {
            AppError::InvalidFields(fields) => assert_eq!(fields, ["base_url"]),
            other => panic!("unexpected error: {other:?}"),
        }

        assert_eq!(Channel::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_config_write_rolls_back_channel() {
        let db = test_db().await;
        let user = seed_user(&db, "atomic@cronspy.com").await;
        db.execute_unprepared("DROP TABLE channels_email").await.unwrap();

        let err = create_channel(&db, &user, request("EMAIL", "x", json!({ "email": "a@b.com" })))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));
        assert_eq!(Channel::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_keeps_type_and_replaces_config() {
        let db = test_db().await;
        let user = seed_user(&db, "update@cronspy.com").await;
        let created = create_channel(
            &db,
            &user,
            request("WEB_HOOK", "hook", json!({ "base_url": "https://a.example.com" })),
        )
        .await
        .unwrap();

        let updated = update_channel(
            &db,
            user.id,
            created.id,
            UpdateChannelRequest {
                name: Some("renamed".into()),
                configuration: json!({ "base_url": "https://b.example.com", "payload_type": "FORM" })
                    .as_object()
                    .cloned(),
            },
        )
        .await
        .unwrap();

        assert_eq!(updated.channel_type, ChannelType::WebHook);
        let reloaded = get_channel(&db, user.id, created.id).await.unwrap();
        assert_eq!(reloaded.name, "renamed");
        let configuration = reloaded.configuration.unwrap();
        assert_eq!(configuration.get("base_url"), Some(&json!("https://b.example.com")));
        assert_eq!(configuration.get("payload_type"), Some(&json!("FORM")));
    }

    #[tokio::test]
    async fn other_users_cannot_touch_channel() {
        let db = test_db().await;
        let owner = seed_user(&db, "owner@cronspy.com").await;
        let intruder = seed_user(&db, "intruder@cronspy.com").await;
        let created = create_channel(&db, &owner, request("EMAIL", "mine", json!({ "email": "o@b.com" })))
            .await
            .unwrap();

        let err = update_channel(
            &db,
            intruder.id,
            created.id,
            UpdateChannelRequest { name: Some("stolen".into()), configuration: None },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let err = delete_channel(&db, intruder.id, created.id).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        assert_eq!(get_channel(&db, owner.id, created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn delete_removes_both_rows() {
        let db = test_db().await;
        let user = seed_user(&db, "delete@cronspy.com").await;
        let created = create_channel(&db, &user, request("EMAIL", "gone", json!({ "email": "g@b.com" })))
            .await
            .unwrap();

        delete_channel(&db, user.id, created.id).await.unwrap();
        assert!(matches!(get_channel(&db, user.id, created.id).await, Err(AppError::NotFound(_))));
        assert!(channel_email::Entity::find_by_id(created.id).one(&db).await.unwrap().is_none());
        assert!(list_channels(&db, user.id, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_config_update_keeps_old_name_and_config() {
        let db = test_db().await;
        let user = seed_user(&db, "keep@cronspy.com").await;
        let created = create_channel(
            &db,
            &user,
            request("WEB_HOOK", "hook", json!({ "base_url": "https://a.example.com" })),
        )
        .await
        .unwrap();
        db.execute_unprepared(
            "CREATE TRIGGER block_webhook_write BEFORE INSERT ON channels_webhook \
             BEGIN SELECT RAISE(ABORT, 'webhook settings locked'); END",
        )
        .await
        .unwrap();
        db.execute_unprepared(
            "CREATE TRIGGER block_webhook_update BEFORE UPDATE ON channels_webhook \
             BEGIN SELECT RAISE(ABORT, 'webhook settings locked'); END",
        )
        .await
        .unwrap();

        let err = update_channel(
            &db,
            user.id,
            created.id,
            UpdateChannelRequest {
                name: Some("renamed".into()),
                configuration: json!({ "base_url": "https://b.example.com" }).as_object().cloned(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));

        assert_eq!(get_channel(&db, user.id, created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn failed_delete_keeps_both_rows() {
        let db = test_db().await;
        let user = seed_user(&db, "stay@cronspy.com").await;
        let created = create_channel(&db, &user, request("EMAIL", "stay", json!({ "email": "s@b.com" })))
            .await
            .unwrap();
        db.execute_unprepared(
            "CREATE TRIGGER block_channel_delete BEFORE DELETE ON channels \
             BEGIN SELECT RAISE(ABORT, 'channels locked'); END",
        )
        .await
        .unwrap();

        let err = delete_channel(&db, user.id, created.id).await.unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));

        assert!(channel_email::Entity::find_by_id(created.id).one(&db).await.unwrap().is_some());
        assert_eq!(get_channel(&db, user.id, created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn foreign_config_on_update_is_a_field_error() {
        let db = test_db().await;
        let user = seed_user(&db, "foreign@cronspy.com").await;
        let created = create_channel(
            &db,
            &user,
            request("WEB_HOOK", "hook", json!({ "base_url": "https://a.example.com" })),
        )
        .await
        .unwrap();

        let err = update_channel(
            &db,
            user.id,
            created.id,
            UpdateChannelRequest {
                name: None,
                configuration: json!({ "email": "x@y.z" }).as_object().cloned(),
            },
        )
        .await
        .unwrap_err();
        match err {
            AppError::InvalidFields(fields) => assert_eq!(fields, ["base_url"]),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(get_channel(&db, user.id, created.id).await.unwrap(), created);
    }
}
