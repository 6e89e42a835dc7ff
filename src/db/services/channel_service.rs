use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DatabaseTransaction, DbErr, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::error;

use crate::db::entities::{channel, channel_email, channel_slack, channel_webhook};
use crate::db::enums::ChannelType;
use crate::notifications::models::ChannelConfig;

// --- Channel Service Functions ---
//
// A channel is stored as a generic `channels` row plus one typed row in the
// side table matching its type. Every write that touches both runs inside a
// single transaction.

/// Inserts the channel and its typed configuration atomically.
pub async fn save_channel(
    db: &DatabaseConnection,
    user_id: i32,
    name: &str,
    config: &ChannelConfig,
) -> Result<channel::Model, DbErr> {
    let txn = db.begin().await?;

    let result = async {
        let now = Utc::now();
        let new_channel = channel::ActiveModel {
            user_id: Set(user_id),
            channel_type: Set(config.channel_type()),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        let saved = new_channel.insert(&txn).await?;
        write_channel_config(&txn, saved.id, config).await?;
        Ok::<_, DbErr>(saved)
    }
    .await;

    match result {
        Ok(saved) => {
            txn.commit().await?;
            Ok(saved)
        }
        Err(e) => {
            rollback(txn).await;
            Err(e)
        }
    }
}

/// Loads a channel and, when asked for, its typed configuration.
pub async fn load_channel<C: ConnectionTrait>(
    db: &C,
    channel_id: i32,
    include_config: bool,
) -> Result<Option<(channel::Model, Option<ChannelConfig>)>, DbErr> {
    let Some(found) = channel::Entity::find_by_id(channel_id).one(db).await? else {
        return Ok(None);
    };

    let config = if include_config {
        Some(read_channel_config(db, &found).await?)
    } else {
        None
    };
    Ok(Some((found, config)))
}

/// All channels of a user, in creation order.
pub async fn get_channels_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    include_config: bool,
) -> Result<Vec<(channel::Model, Option<ChannelConfig>)>, DbErr> {
    let channels = channel::Entity::find()
        .filter(channel::Column::UserId.eq(user_id))
        .order_by_asc(channel::Column::Id)
        .all(db)
        .await?;

    let mut result = Vec::with_capacity(channels.len());
    for c in channels {
        let config = if include_config {
            Some(read_channel_config(db, &c).await?)
        } else {
            None
        };
        result.push((c, config));
    }
    Ok(result)
}

/// Renames the channel and overwrites its typed configuration.
/// Callers decode the configuration with the channel's own type.
pub async fn update_channel(
    db: &DatabaseConnection,
    existing: channel::Model,
    name: &str,
    config: Option<&ChannelConfig>,
) -> Result<channel::Model, DbErr> {
    debug_assert!(
        config.is_none_or(|c| c.channel_type() == existing.channel_type),
        "configuration type must match the channel type"
    );

    let channel_id = existing.id;
    let txn = db.begin().await?;

    let result = async {
        let mut active: channel::ActiveModel = existing.into();
        active.name = Set(name.to_string());
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        if let Some(config) = config {
            write_channel_config(&txn, channel_id, config).await?;
        }
        Ok::<_, DbErr>(updated)
    }
    .await;

    match result {
        Ok(updated) => {
            txn.commit().await?;
            Ok(updated)
        }
        Err(e) => {
            rollback(txn).await;
            Err(e)
        }
    }
}

/// Deletes the typed configuration, then the channel itself.
pub async fn delete_channel(db: &DatabaseConnection, existing: &channel::Model) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    let result = async {
        match existing.channel_type {
            ChannelType::Email => {
                channel_email::Entity::delete_by_id(existing.id).exec(&txn).await?;
            }
            ChannelType::Slack => {
                channel_slack::Entity::delete_by_id(existing.id).exec(&txn).await?;
            }
            ChannelType::WebHook => {
                channel_webhook::Entity::delete_by_id(existing.id).exec(&txn).await?;
            }
        }
        channel::Entity::delete_by_id(existing.id).exec(&txn).await?;
        Ok::<_, DbErr>(())
    }
    .await;

    match result {
        Ok(()) => txn.commit().await,
        Err(e) => {
            rollback(txn).await;
            Err(e)
        }
    }
}

/// Rolls back after a failed write. The write's own error is what callers see.
async fn rollback(txn: DatabaseTransaction) {
    if let Err(e) = txn.rollback().await {
        error!(error = %e, "Failed to roll back channel transaction.");
    }
}

/// Inserts or overwrites the typed row keyed by `channel_id`.
async fn write_channel_config<C: ConnectionTrait>(
    db: &C,
    channel_id: i32,
    config: &ChannelConfig,
) -> Result<(), DbErr> {
    match config.clone() {
        ChannelConfig::Email { email } => {
            let row = channel_email::ActiveModel {
                id: Set(channel_id),
                email: Set(email),
            };
            channel_email::Entity::insert(row)
                .on_conflict(
                    OnConflict::column(channel_email::Column::Id)
                        .update_column(channel_email::Column::Email)
                        .to_owned(),
                )
                .exec(db)
                .await?;
        }
        ChannelConfig::Slack {
            base_url,
            slack_channel_name,
        } => {
            let row = channel_slack::ActiveModel {
                id: Set(channel_id),
                base_url: Set(base_url),
                slack_channel_name: Set(slack_channel_name),
            };
            channel_slack::Entity::insert(row)
                .on_conflict(
                    OnConflict::column(channel_slack::Column::Id)
                        .update_columns([
                            channel_slack::Column::BaseUrl,
                            channel_slack::Column::SlackChannelName,
                        ])
                        .to_owned(),
                )
                .exec(db)
                .await?;
        }
        ChannelConfig::WebHook {
            base_url,
            payload_type,
            basic_auth_username,
            basic_auth_password,
        } => {
            let row = channel_webhook::ActiveModel {
                id: Set(channel_id),
                base_url: Set(base_url),
                payload_type: Set(payload_type),
                basic_auth_username: Set(basic_auth_username),
                basic_auth_password: Set(basic_auth_password),
            };
            channel_webhook::Entity::insert(row)
                .on_conflict(
                    OnConflict::column(channel_webhook::Column::Id)
                        .update_columns([
                            channel_webhook::Column::BaseUrl,
                            channel_webhook::Column::PayloadType,
                            channel_webhook::Column::BasicAuthUsername,
                            channel_webhook::Column::BasicAuthPassword,
                        ])
                        .to_owned(),
                )
                .exec(db)
                .await?;
        }
    }
    Ok(())
}

/// Reads the typed row matching the channel's type.
async fn read_channel_config<C: ConnectionTrait>(
    db: &C,
    c: &channel::Model,
) -> Result<ChannelConfig, DbErr> {
    let missing = || {
        DbErr::RecordNotFound(format!(
            "{} configuration for channel {}",
            c.channel_type, c.id
        ))
    };

    let config = match c.channel_type {
        ChannelType::Email => channel_email::Entity::find_by_id(c.id)
            .one(db)
            .await?
            .map(ChannelConfig::from),
        ChannelType::Slack => channel_slack::Entity::find_by_id(c.id)
            .one(db)
            .await?
            .map(ChannelConfig::from),
        ChannelType::WebHook => channel_webhook::Entity::find_by_id(c.id)
            .one(db)
            .await?
            .map(ChannelConfig::from),
    };
    config.ok_or_else(missing)
}
