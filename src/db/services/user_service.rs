use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};

use crate::db::entities::user;
use crate::db::enums::AccountType;

// --- User Service Functions ---

/// Inserts a new user with an already hashed password.
pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    email: &str,
    name: &str,
    password_hash: &str,
    account_type: AccountType,
) -> Result<user::Model, DbErr> {
    let now = Utc::now();
    let new_user = user::ActiveModel {
        created_at: Set(now),
        updated_at: Set(now),
        email: Set(email.to_string()),
        name: Set(name.to_string()),
        password_hash: Set(password_hash.to_string()),
        account_type: Set(account_type),
        ..Default::default()
    };
    new_user.insert(db).await
}

/// Retrieves a user by their ID.
pub async fn get_user_by_id<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find_by_id(user_id).one(db).await
}

/// Retrieves a user by their email address.
pub async fn get_user_by_email<C: ConnectionTrait>(
    db: &C,
    email: &str,
) -> Result<Option<user::Model>, DbErr> {
    user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(db)
        .await
}

/// Replaces the stored password hash.
pub async fn update_password_hash<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    password_hash: &str,
) -> Result<(), DbErr> {
    let user = user::ActiveModel {
        id: Set(user_id),
        password_hash: Set(password_hash.to_string()),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    user.update(db).await?;
    Ok(())
}
