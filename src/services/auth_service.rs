use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use sea_orm::{DatabaseConnection, SqlErr};
use tracing::{error, info};

use crate::db::entities::user;
use crate::db::enums::AccountType;
use crate::db::services::user_service;
use crate::server::config::ServerConfig;
use crate::web::error::AppError;
use crate::web::models::{Claims, LoginRequest, LoginResponse, RegisterRequest, UserResponse};
use crate::web::validation::{validate_email, validate_password};

pub const JWT_ALGORITHM: Algorithm = Algorithm::HS512;

pub fn hash_password(password: &str, cost: u32) -> Result<String, AppError> {
    hash(password, cost).map_err(|e| AppError::PasswordHashingError(e.to_string()))
}

fn password_matches(password: &str, password_hash: &str) -> Result<bool, AppError> {
    verify(password, password_hash)
        .map_err(|e| AppError::InternalServerError(format!("Password verification failed: {e}")))
}

pub async fn register_user(
    db: &DatabaseConnection,
    config: &ServerConfig,
    req: RegisterRequest,
) -> Result<UserResponse, AppError> {
    validate_email(&req.email)?;
    validate_password(&req.password)?;

    let existing = user_service::get_user_by_email(db, &req.email)
        .await
        .inspect_err(|e| error!(error = %e, email = %req.email, "Error loading user by email."))?;
    if existing.is_some() {
        return Err(AppError::UserExists);
    }

    let password_hash = hash_password(&req.password, config.bcrypt_cost)?;

    // Self-registered accounts always start on the free tier.
    let created = user_service::create_user(
        db,
        &req.email,
        req.name.trim(),
        &password_hash,
        AccountType::Free,
    )
    .await
    .map_err(|e| match e.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => AppError::UserExists,
        _ => {
            error!(error = %e, email = %req.email, "Error creating user.");
            AppError::from(e)
        }
    })?;

    info!(user_id = created.id, "User registered.");
    Ok(UserResponse::from(created))
}

pub async fn login_user(
    db: &DatabaseConnection,
    config: &ServerConfig,
    req: LoginRequest,
) -> Result<LoginResponse, AppError> {
    // Malformed credentials get the same answer as wrong ones.
    if validate_email(&req.email).is_err() || req.password.is_empty() {
        return Err(AppError::InvalidPassword);
    }

    let user = user_service::get_user_by_email(db, &req.email)
        .await
        .inspect_err(|e| error!(error = %e, "Error loading user for login."))?
        .ok_or(AppError::InvalidPassword)?;

    if !password_matches(&req.password, &user.password_hash)? {
        return Err(AppError::InvalidPassword);
    }

    let access_token = create_jwt_for_user(&user, config)?;
    Ok(LoginResponse {
        user: UserResponse::from(user),
        access_token,
    })
}

pub fn create_jwt_for_user(user: &user::Model, config: &ServerConfig) -> Result<String, AppError> {
    let expiration = (Utc::now() + Duration::hours(config.token_expiration_hours)).timestamp();

    let claims = Claims {
        id: user.id,
        email: user.email.clone(),
        name: user.name.clone(),
        account_type: user.account_type.to_string(),
        exp: expiration as usize,
    };

    encode(
        &Header::new(JWT_ALGORITHM),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::TokenCreationError(e.to_string()))
}

/// Authenticated password change; the current password must match.
pub async fn change_password(
    db: &DatabaseConnection,
    config: &ServerConfig,
    user_id: i32,
    old_password: &str,
    new_password: &str,
) -> Result<(), AppError> {
    validate_password(new_password)?;

    let user = user_service::get_user_by_id(db, user_id)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "Error loading user."))?
        .ok_or(AppError::Unauthorized)?;

    if !password_matches(old_password, &user.password_hash)? {
        return Err(AppError::InvalidPassword);
    }

    let new_hash = hash_password(new_password, config.bcrypt_cost)?;
    user_service::update_password_hash(db, user_id, &new_hash)
        .await
        .inspect_err(|e| error!(error = %e, user_id, "Error updating user password."))?;

    info!(user_id, "Password changed.");
    Ok(())
}
