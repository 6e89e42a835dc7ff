use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};

use crate::db::entities::job;

/// Number of jobs owned by a user.
pub async fn count_jobs_for_user<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<u64, DbErr> {
    job::Entity::find()
        .filter(job::Column::UserId.eq(user_id))
        .count(db)
        .await
}

/// One slice of a user's jobs, oldest first.
pub async fn get_jobs_for_user<C: ConnectionTrait>(
    db: &C,
    user_id: i32,
    limit: u64,
    offset: u64,
) -> Result<Vec<job::Model>, DbErr> {
    job::Entity::find()
        .filter(job::Column::UserId.eq(user_id))
        .order_by_asc(job::Column::CreatedAt)
        .order_by_asc(job::Column::Id)
        .limit(limit)
        .offset(offset)
        .all(db)
        .await
}

pub async fn get_job_by_id<C: ConnectionTrait>(
    db: &C,
    job_id: &str,
) -> Result<Option<job::Model>, DbErr> {
    job::Entity::find_by_id(job_id.to_string()).one(db).await
}

pub async fn insert_job<C: ConnectionTrait>(
    db: &C,
    new_job: job::ActiveModel,
) -> Result<job::Model, DbErr> {
    new_job.insert(db).await
}
