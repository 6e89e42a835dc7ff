use axum::{
    extract::{Extension, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::extract::WithRejection;
use std::sync::Arc;

use crate::services::{auth_service, password_reset_service};
use crate::web::middleware::auth::TOKEN_COOKIE;
use crate::web::models::{
    AuthenticatedUser, ChangePasswordRequest, ChangePasswordWithResetRequest, LoginRequest,
    PasswordResetRequest, PasswordResetResponse, RegisterRequest, UserResponse, ValidateResetQuery,
};
use crate::web::{AppError, AppState};

/// Routes reachable without a token.
pub fn create_public_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/passwordReset", post(request_password_reset_handler))
        .route("/passwordReset/validate", get(validate_password_reset_handler))
        .route("/passwordReset/change", post(change_password_with_reset_handler))
}

pub fn create_protected_router() -> Router<Arc<AppState>> {
    Router::new().route("/changePassword", put(change_password_handler))
}

async fn register_handler(
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    let user = auth_service::register_user(&app_state.db_pool, &app_state.config, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_handler(
    State(app_state): State<Arc<AppState>>,
    jar: CookieJar,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, AppError>,
) -> Result<impl IntoResponse, AppError> {
    let login_response = auth_service::login_user(&app_state.db_pool, &app_state.config, payload).await?;

    let auth_cookie = Cookie::build((TOKEN_COOKIE, login_response.access_token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(true)
        .build();

    Ok((jar.add(auth_cookie), Json(login_response)))
}

async fn change_password_handler(
    Extension(auth_user): Extension<AuthenticatedUser>,
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<ChangePasswordRequest>, AppError>,
) -> Result<StatusCode, AppError> {
    auth_service::change_password(
        &app_state.db_pool,
        &app_state.config,
        auth_user.id,
        &payload.old_password,
        &payload.new_password,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn request_password_reset_handler(
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<PasswordResetRequest>, AppError>,
) -> Result<Json<PasswordResetResponse>, AppError> {
    let reset_id =
        password_reset_service::request_password_reset(&app_state.db_pool, payload.email.trim()).await?;
    Ok(Json(PasswordResetResponse { reset_id }))
}

async fn validate_password_reset_handler(
    State(app_state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<ValidateResetQuery>, AppError>,
) -> Result<StatusCode, AppError> {
    password_reset_service::validate_password_reset(&app_state.db_pool, &query.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password_with_reset_handler(
    State(app_state): State<Arc<AppState>>,
    WithRejection(Json(payload), _): WithRejection<Json<ChangePasswordWithResetRequest>, AppError>,
) -> Result<StatusCode, AppError> {
    password_reset_service::change_password_with_reset(
        &app_state.db_pool,
        &app_state.config,
        &payload.token,
        &payload.new_password,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
