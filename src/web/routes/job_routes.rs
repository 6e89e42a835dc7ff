use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::db::entities::job;
use crate::services::job_service;
use crate::web::models::{AuthenticatedUser, CreateJobRequest, JobsQuery, JobsResponse};
use crate::web::{AppError, AppState};

pub fn create_job_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_jobs_handler).post(create_job_handler))
        .route("/{job_id}", get(get_job_handler))
}

async fn list_jobs_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<JobsQuery>, AppError>,
) -> Result<Json<JobsResponse>, AppError> {
    let (page_size, page) = job_service::parse_pagination(&query)?;
    let response = job_service::get_jobs(&app_state.db_pool, auth_user.id, page_size, page).await?;
    Ok(Json(response))
}

async fn create_job_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateJobRequest>, AppError>,
) -> Result<(StatusCode, Json<job::Model>), AppError> {
    let created = job_service::create_job(&app_state.db_pool, auth_user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_job_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Result<Json<job::Model>, AppError> {
    let found = job_service::get_job(&app_state.db_pool, auth_user.id, &job_id).await?;
    Ok(Json(found))
}
