use chrono::{DateTime, Duration, Utc};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use tracing::{error, info, warn};

use crate::db::entities::password_reset;
use crate::db::services::{password_reset_service as reset_db, user_service};
use crate::server::config::ServerConfig;
use crate::services::auth_service::hash_password;
use crate::web::error::AppError;
use crate::web::validation::validate_password;

/// Number of reset links a single reset may send.
pub const MAX_PASSWORD_RESETS: i32 = 3;
/// Minimum gap between two reset emails for the same user.
pub const MINUTES_TO_WAIT_BEFORE_EMAIL_RESEND: i64 = 5;
/// A reset link is valid this long after its last update.
pub const PASSWORD_RESET_VALIDITY_HOURS: i64 = 24;

fn is_expired(reset: &password_reset::Model, now: DateTime<Utc>) -> bool {
    now - reset.updated_at > Duration::hours(PASSWORD_RESET_VALIDITY_HOURS)
}

/// Starts or re-sends a password reset for the account behind `email`.
/// Returns the reset id, which is the token carried by the link.
pub async fn request_password_reset(
    db: &DatabaseConnection,
    email: &str,
) -> Result<String, AppError> {
    let user = user_service::get_user_by_email(db, email)
        .await
        .inspect_err(|e| error!(error = %e, "Error loading user for password reset."))?
        .ok_or_else(|| {
            warn!(email, "Password reset requested for an unknown email.");
            AppError::UnknownUser
        })?;

    let now = Utc::now();
    let open = reset_db::get_open_password_reset_by_user(db, user.id)
        .await
        .inspect_err(|e| error!(error = %e, user_id = user.id, "Error loading password reset."))?;

    let reset = match open {
        Some(stale) if is_expired(&stale, now) => {
            reset_db::delete_password_reset(db, &stale.id)
                .await
                .inspect_err(|e| error!(error = %e, reset_id = %stale.id, "Error deleting stale password reset."))?;
            None
        }
        other => other,
    };

    let Some(reset) = reset else {
        let created = reset_db::create_password_reset(db, user.id)
            .await
            .inspect_err(|e| error!(error = %e, user_id = user.id, "Error creating password reset."))?;
        info!(user_id = user.id, reset_id = %created.id, "Password reset created.");
        return Ok(created.id);
    };

    if now - reset.updated_at < Duration::minutes(MINUTES_TO_WAIT_BEFORE_EMAIL_RESEND) {
        return Err(AppError::NeedToWaitBeforeResend);
    }

    let count = reset.link_sent_count + 1;
    if count > MAX_PASSWORD_RESETS {
        warn!(user_id = user.id, reset_id = %reset.id, "Max number of password resets reached.");
        return Err(AppError::MaxPasswordResetReached);
    }

    let updated = reset_db::update_password_reset_count(db, reset, count)
        .await
        .inspect_err(|e| error!(error = %e, user_id = user.id, "Error updating password reset count."))?;
    info!(user_id = user.id, reset_id = %updated.id, count, "Password reset re-sent.");
    Ok(updated.id)
}

/// Marks the reset as validated once its link is opened.
pub async fn validate_password_reset(db: &DatabaseConnection, reset_id: &str) -> Result<(), AppError> {
    let reset = reset_db::get_password_reset_by_id(db, reset_id)
        .await
        .inspect_err(|e| error!(error = %e, reset_id, "Error loading password reset."))?
        .ok_or_else(|| AppError::NotFound("password reset".to_string()))?;

    if reset.used {
        return Err(AppError::PasswordResetAlreadyUsed);
    }
    if is_expired(&reset, Utc::now()) {
        return Err(AppError::PasswordResetTokenExpired);
    }

    reset_db::mark_password_reset_validated(db, reset)
        .await
        .inspect_err(|e| error!(error = %e, reset_id, "Error validating password reset."))?;
    Ok(())
}

/// Consumes a validated reset and stores the new password.
/// The checks, the password update and the `used` flag share one transaction.
pub async fn change_password_with_reset(
    db: &DatabaseConnection,
    config: &ServerConfig,
    reset_id: &str,
    new_password: &str,
) -> Result<(), AppError> {
    validate_password(new_password)?;
    let new_hash = hash_password(new_password, config.bcrypt_cost)?;

    let txn = db.begin().await?;
    let result = async {
        let reset = reset_db::get_password_reset_by_id(&txn, reset_id)
            .await?
            .ok_or_else(|| AppError::NotFound("password reset".to_string()))?;

        if reset.used {
            return Err(AppError::PasswordResetAlreadyUsed);
        }
        if !reset.validated {
            return Err(AppError::PasswordResetNotValidated);
        }
        if is_expired(&reset, Utc::now()) {
            return Err(AppError::PasswordResetTokenExpired);
        }

        let user_id = reset.user_id;
        user_service::update_password_hash(&txn, user_id, &new_hash).await?;
        reset_db::mark_password_reset_used(&txn, reset).await?;
        Ok::<_, AppError>(user_id)
    }
    .await;

    match result {
        Ok(user_id) => {
            txn.commit().await.map_err(|e: DbErr| {
                error!(error = %e, reset_id, "Error committing password change.");
                AppError::from(e)
            })?;
            info!(user_id, reset_id, "Password changed through reset link.");
            Ok(())
        }
        Err(e) => {
            if let AppError::DatabaseError(ref msg) = e {
                error!(error = %msg, reset_id, "Error changing password with reset.");
            }
            if let Err(rollback_err) = txn.rollback().await {
                error!(error = %rollback_err, reset_id, "Failed to roll back password change.");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::user;
    use crate::db::enums::AccountType;
    use crate::test_support::{test_config, test_db};
    use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};

    async fn seed_user(db: &DatabaseConnection, email: &str) -> user::Model {
        let hash = hash_password("abcd1234", 4).unwrap();
        user_service::create_user(db, email, "Reset User", &hash, AccountType::Free)
            .await
            .unwrap()
    }

    /// Moves the reset's last update into the past.
    async fn age_reset(db: &DatabaseConnection, reset_id: &str, by: Duration) {
        let reset = reset_db::get_password_reset_by_id(db, reset_id).await.unwrap().unwrap();
        let updated_at = reset.updated_at - by;
        let mut active: password_reset::ActiveModel = reset.into();
        active.updated_at = Set(updated_at);
        active.update(db).await.unwrap();
    }

    async fn stored(db: &DatabaseConnection, reset_id: &str) -> password_reset::Model {
        reset_db::get_password_reset_by_id(db, reset_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn unknown_email_is_reported() {
        let db = test_db().await;
        let err = request_password_reset(&db, "ghost@cronspy.com").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownUser));
    }

    #[tokio::test]
    async fn first_request_creates_reset() {
        let db = test_db().await;
        let user = seed_user(&db, "first@cronspy.com").await;

        let reset_id = request_password_reset(&db, "first@cronspy.com").await.unwrap();
        let reset = stored(&db, &reset_id).await;
        assert_eq!(reset.user_id, user.id);
        assert_eq!(reset.link_sent_count, 1);
        assert!(!reset.validated);
        assert!(!reset.used);
    }

    #[tokio::test]
    async fn resend_within_wait_window_is_rejected_without_changes() {
        let db = test_db().await;
        seed_user(&db, "wait@cronspy.com").await;

        let reset_id = request_password_reset(&db, "wait@cronspy.com").await.unwrap();
        let before = stored(&db, &reset_id).await;

        let err = request_password_reset(&db, "wait@cronspy.com").await.unwrap_err();
        assert!(matches!(err, AppError::NeedToWaitBeforeResend));
        assert_eq!(stored(&db, &reset_id).await, before);
    }

    #[tokio::test]
    async fn resend_after_wait_increments_counter_until_max() {
        let db = test_db().await;
        seed_user(&db, "max@cronspy.com").await;

        let reset_id = request_password_reset(&db, "max@cronspy.com").await.unwrap();
        for expected in 2..=MAX_PASSWORD_RESETS {
            age_reset(&db, &reset_id, Duration::minutes(MINUTES_TO_WAIT_BEFORE_EMAIL_RESEND + 1)).await;
            let again = request_password_reset(&db, "max@cronspy.com").await.unwrap();
            assert_eq!(again, reset_id);
            assert_eq!(stored(&db, &reset_id).await.link_sent_count, expected);
        }

        age_reset(&db, &reset_id, Duration::minutes(MINUTES_TO_WAIT_BEFORE_EMAIL_RESEND + 1)).await;
        let err = request_password_reset(&db, "max@cronspy.com").await.unwrap_err();
        assert!(matches!(err, AppError::MaxPasswordResetReached));
        assert_eq!(stored(&db, &reset_id).await.link_sent_count, MAX_PASSWORD_RESETS);
    }

    #[tokio::test]
    async fn stale_reset_is_replaced() {
        let db = test_db().await;
        seed_user(&db, "stale@cronspy.com").await;

        let old_id = request_password_reset(&db, "stale@cronspy.com").await.unwrap();
        age_reset(&db, &old_id, Duration::hours(PASSWORD_RESET_VALIDITY_HOURS + 1)).await;

        let new_id = request_password_reset(&db, "stale@cronspy.com").await.unwrap();
        assert_ne!(new_id, old_id);
        assert!(reset_db::get_password_reset_by_id(&db, &old_id).await.unwrap().is_none());
        assert_eq!(stored(&db, &new_id).await.link_sent_count, 1);
    }

    #[tokio::test]
    async fn validate_marks_reset() {
        let db = test_db().await;
        seed_user(&db, "validate@cronspy.com").await;
        let reset_id = request_password_reset(&db, "validate@cronspy.com").await.unwrap();

        validate_password_reset(&db, &reset_id).await.unwrap();
        assert!(stored(&db, &reset_id).await.validated);

        let err = validate_password_reset(&db, "no-such-token").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn validate_expired_reset_fails() {
        let db = test_db().await;
        seed_user(&db, "expired@cronspy.com").await;
        let reset_id = request_password_reset(&db, "expired@cronspy.com").await.unwrap();
        age_reset(&db, &reset_id, Duration::hours(PASSWORD_RESET_VALIDITY_HOURS) + Duration::minutes(1)).await;

        let err = validate_password_reset(&db, &reset_id).await.unwrap_err();
        assert!(matches!(err, AppError::PasswordResetTokenExpired));
        assert!(!stored(&db, &reset_id).await.validated);
    }

    #[tokio::test]
    async fn change_with_reset_requires_validation_and_is_single_use() {
        let db = test_db().await;
        let config = test_config();
        let user = seed_user(&db, "consume@cronspy.com").await;
        let reset_id = request_password_reset(&db, "consume@cronspy.com").await.unwrap();

        let err = change_password_with_reset(&db, &config, &reset_id, "brand-new-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordResetNotValidated));

        validate_password_reset(&db, &reset_id).await.unwrap();
        change_password_with_reset(&db, &config, &reset_id, "brand-new-pass")
            .await
            .unwrap();

        let reloaded = user_service::get_user_by_id(&db, user.id).await.unwrap().unwrap();
        assert!(bcrypt::verify("brand-new-pass", &reloaded.password_hash).unwrap());
        assert!(stored(&db, &reset_id).await.used);

        let err = change_password_with_reset(&db, &config, &reset_id, "another-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::PasswordResetAlreadyUsed));
        let err = validate_password_reset(&db, &reset_id).await.unwrap_err();
        assert!(matches!(err, AppError::PasswordResetAlreadyUsed));
    }

    #[tokio::test]
    async fn change_with_reset_checks_password_format_first() {
        let db = test_db().await;
        let config = test_config();
        seed_user(&db, "format@cronspy.com").await;
        let reset_id = request_password_reset(&db, "format@cronspy.com").await.unwrap();
        validate_password_reset(&db, &reset_id).await.unwrap();

        let err = change_password_with_reset(&db, &config, &reset_id, "short")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidPasswordFormat));
        assert!(!stored(&db, &reset_id).await.used);
    }

    #[tokio::test]
    async fn failed_consume_keeps_old_password() {
        let db = test_db().await;
        let config = test_config();
        let user = seed_user(&db, "rollback@cronspy.com").await;
        let reset_id = request_password_reset(&db, "rollback@cronspy.com").await.unwrap();
        validate_password_reset(&db, &reset_id).await.unwrap();

        // The user row is written first, then this blocks marking the reset used.
        db.execute_unprepared(
            "CREATE TRIGGER block_reset_update BEFORE UPDATE ON password_resets \
             BEGIN SELECT RAISE(ABORT, 'resets locked'); END",
        )
        .await
        .unwrap();

        let err = change_password_with_reset(&db, &config, &reset_id, "brand-new-pass")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DatabaseError(_)));

        assert!(!stored(&db, &reset_id).await.used);
        let reloaded = user_service::get_user_by_id(&db, user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.password_hash, user.password_hash);
        assert!(bcrypt::verify("abcd1234", &reloaded.password_hash).unwrap());
    }
}
