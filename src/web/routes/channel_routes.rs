use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::notifications::models::{ChannelResponse, CreateChannelRequest, UpdateChannelRequest};
use crate::services::channel_service;
use crate::web::models::{AuthenticatedUser, ChannelsQuery};
use crate::web::validation::parse_entity_id;
use crate::web::{AppError, AppState};

pub fn create_channel_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_channels_handler).post(create_channel_handler))
        .route(
            "/{channel_id}",
            get(get_channel_handler)
                .put(update_channel_handler)
                .delete(delete_channel_handler),
        )
}

async fn list_channels_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<ChannelsQuery>, AppError>,
) -> Result<Json<Vec<ChannelResponse>>, AppError> {
    let channels =
        channel_service::list_channels(&app_state.db_pool, auth_user.id, query.include_config).await?;
    Ok(Json(channels))
}

async fn create_channel_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<CreateChannelRequest>, AppError>,
) -> Result<(StatusCode, Json<ChannelResponse>), AppError> {
    let created = channel_service::create_channel(&app_state.db_pool, &auth_user, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_channel_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<ChannelResponse>, AppError> {
    let channel_id = parse_entity_id(&channel_id)?;
    let found = channel_service::get_channel(&app_state.db_pool, auth_user.id, channel_id).await?;
    Ok(Json(found))
}

async fn update_channel_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateChannelRequest>, AppError>,
) -> Result<Json<ChannelResponse>, AppError> {
    let channel_id = parse_entity_id(&channel_id)?;
    let updated =
        channel_service::update_channel(&app_state.db_pool, auth_user.id, channel_id, payload).await?;
    Ok(Json(updated))
}

async fn delete_channel_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    Path(channel_id): Path<String>,
) -> Result<StatusCode, AppError> {
    let channel_id = parse_entity_id(&channel_id)?;
    channel_service::delete_channel(&app_state.db_pool, auth_user.id, channel_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
