use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Unauthorized request")]
    Unauthorized,
    #[error("Forbidden: the resource belongs to another user")]
    Forbidden,
    #[error("User already exists")]
    UserExists,
    #[error("Invalid fields: {}", .0.join(","))]
    InvalidFields(Vec<String>),
    #[error("Invalid page")]
    InvalidPage,
    #[error("Invalid page size")]
    InvalidPageSize,
    #[error("Invalid entity id: {0}")]
    InvalidEntityId(String),
    #[error("Invalid email address")]
    InvalidEmailAddress,
    #[error("Invalid password format")]
    InvalidPasswordFormat,
    #[error("Invalid password")]
    InvalidPassword,
    #[error("Unknown user")]
    UnknownUser,
    #[error("Max number of password resets reached")]
    MaxPasswordResetReached,
    #[error("Need to wait before resending the password reset")]
    NeedToWaitBeforeResend,
    #[error("Password reset token expired")]
    PasswordResetTokenExpired,
    #[error("Password reset token already used")]
    PasswordResetAlreadyUsed,
    #[error("Password reset token not validated")]
    PasswordResetNotValidated,
    #[error("Unsupported channel type: {0}")]
    UnsupportedChannelType(String),
    #[error("Password hashing failed: {0}")]
    PasswordHashingError(String),
    #[error("JWT creation failed: {0}")]
    TokenCreationError(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<String>,
}

impl AppError {
    pub fn invalid_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AppError::InvalidFields(fields.into_iter().map(Into::into).collect())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) | AppError::UnknownUser => StatusCode::NOT_FOUND,
            AppError::Unauthorized | AppError::InvalidPassword => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::UserExists => StatusCode::CONFLICT,
            AppError::MaxPasswordResetReached | AppError::NeedToWaitBeforeResend => {
                StatusCode::TOO_MANY_REQUESTS
            }
            AppError::InvalidFields(_)
            | AppError::InvalidPage
            | AppError::InvalidPageSize
            | AppError::InvalidEntityId(_)
            | AppError::InvalidEmailAddress
            | AppError::InvalidPasswordFormat
            | AppError::PasswordResetTokenExpired
            | AppError::PasswordResetAlreadyUsed
            | AppError::PasswordResetNotValidated
            | AppError::UnsupportedChannelType(_) => StatusCode::BAD_REQUEST,
            AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "not_found",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::UserExists => "user_exists",
            AppError::InvalidFields(_) => "invalid_fields",
            AppError::InvalidPage => "invalid_page",
            AppError::InvalidPageSize => "invalid_page_size",
            AppError::InvalidEntityId(_) => "invalid_entity_id",
            AppError::InvalidEmailAddress => "invalid_email",
            AppError::InvalidPasswordFormat => "invalid_password_format",
            AppError::InvalidPassword => "invalid_password",
            AppError::UnknownUser => "unknown_user",
            AppError::MaxPasswordResetReached => "max_password_reset_reached",
            AppError::NeedToWaitBeforeResend => "wait_before_resend",
            AppError::PasswordResetTokenExpired => "password_reset_expired",
            AppError::PasswordResetAlreadyUsed => "password_reset_used",
            AppError::PasswordResetNotValidated => "password_reset_not_validated",
            AppError::UnsupportedChannelType(_) => "unsupported_channel_type",
            AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => "internal_server_error",
        }
    }

    fn message(&self) -> String {
        match self {
            AppError::NotFound(_) => "record not found".to_string(),
            AppError::Unauthorized => "unauthorized request".to_string(),
            AppError::Forbidden => "the resource belongs to another user".to_string(),
            AppError::UserExists => "user already exists".to_string(),
            AppError::InvalidFields(_) => "some fields are missing or invalid".to_string(),
            AppError::InvalidPage => "invalid page".to_string(),
            AppError::InvalidPageSize => "invalid page size".to_string(),
            AppError::InvalidEntityId(_) => "invalid entity id".to_string(),
            AppError::InvalidEmailAddress => "invalid email address".to_string(),
            AppError::InvalidPasswordFormat => "invalid password format".to_string(),
            AppError::InvalidPassword => "invalid password".to_string(),
            AppError::UnknownUser => "unknown user".to_string(),
            AppError::MaxPasswordResetReached => {
                "max number of password resets has been reached".to_string()
            }
            AppError::NeedToWaitBeforeResend => {
                "need to wait some time before resending the email".to_string()
            }
            AppError::PasswordResetTokenExpired => "password reset link has expired".to_string(),
            AppError::PasswordResetAlreadyUsed => {
                "password reset link has already been used".to_string()
            }
            AppError::PasswordResetNotValidated => {
                "password reset link has not been validated".to_string()
            }
            AppError::UnsupportedChannelType(t) => format!("channel type '{t}' is not supported"),
            AppError::PasswordHashingError(_)
            | AppError::TokenCreationError(_)
            | AppError::DatabaseError(_)
            | AppError::InternalServerError(_) => "internal server error occurred".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // Details stay in the logs only.
            error!(error = %self, "Request failed with an internal error.");
        }

        let body = ErrorBody {
            code: self.code(),
            message: self.message(),
            fields: match &self {
                AppError::InvalidFields(fields) if !fields.is_empty() => Some(fields.join(",")),
                _ => None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::DatabaseError(err.to_string())
    }
}

/// Field named by a deserialization error, e.g. "missing field `job_type`"
/// or "job_type: invalid type: ...".
fn rejected_field(text: &str) -> Option<String> {
    if let Some((_, rest)) = text.split_once("missing field `") {
        return rest.split_once('`').map(|(field, _)| field.to_string());
    }
    let detail = text.split_once(": ").map_or(text, |(_, detail)| detail);
    let (path, _) = detail.split_once(": ")?;
    let is_path = !path.is_empty()
        && path
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '[' | ']'));
    is_path.then(|| path.to_string())
}

fn rejected_input(body_text: String) -> AppError {
    warn!(rejection = %body_text, "Rejected malformed request input.");
    AppError::InvalidFields(rejected_field(&body_text).into_iter().collect())
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        rejected_input(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        rejected_input(rejection.body_text())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InternalServerError(format!("JSON serialization/deserialization error: {err}"))
    }
}
