use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use uuid::Uuid;

use crate::db::entities::password_reset;

/// Creates a reset with its first link already counted as sent.
pub async fn create_password_reset<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<password_reset::Model, DbErr> {
    let now = Utc::now();
    let reset = password_reset::ActiveModel {
        id: Set(Uuid::new_v4().to_string()),
        user_id: Set(user_id),
        created_at: Set(now),
        updated_at: Set(now),
        link_sent_count: Set(1),
        validated: Set(false),
        used: Set(false),
    };
    reset.insert(db).await
}

pub async fn get_password_reset_by_id<C: ConnectionTrait>(
    db: &C,
    reset_id: &str,
) -> Result<Option<password_reset::Model>, DbErr> {
    password_reset::Entity::find_by_id(reset_id.to_string())
        .one(db)
        .await
}

/// Most recently touched reset of the user that has not been consumed yet.
pub async fn get_open_password_reset_by_user<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
) -> Result<Option<password_reset::Model>, DbErr> {
    password_reset::Entity::find()
        .filter(password_reset::Column::UserId.eq(user_id))
        .filter(password_reset::Column::Used.eq(false))
        .order_by_desc(password_reset::Column::UpdatedAt)
        .one(db)
        .await
}

pub async fn delete_password_reset<C: ConnectionTrait>(db: &C, reset_id: &str) -> Result<(), DbErr> {
    password_reset::Entity::delete_by_id(reset_id.to_string())
        .exec(db)
        .await?;
    Ok(())
}

/// Stores the new sent count and restarts the resend/validity clock.
pub async fn update_password_reset_count<C: ConnectionTrait>(
    db: &C,
    reset: password_reset::Model,
    count: i32,
) -> Result<password_reset::Model, DbErr> {
    let mut active: password_reset::ActiveModel = reset.into();
    active.link_sent_count = Set(count);
    active.updated_at = Set(Utc::now());
    active.update(db).await
}

pub async fn mark_password_reset_validated<C: ConnectionTrait>(
    db: &C,
    reset: password_reset::Model,
) -> Result<password_reset::Model, DbErr> {
    let mut active: password_reset::ActiveModel = reset.into();
    active.validated = Set(true);
    active.update(db).await
}

pub async fn mark_password_reset_used<C: ConnectionTrait>(
    db: &C,
    reset: password_reset::Model,
) -> Result<password_reset::Model, DbErr> {
    let mut active: password_reset::ActiveModel = reset.into();
    active.used = Set(true);
    active.update(db).await
}
