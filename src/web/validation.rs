use validator::ValidateEmail;

use crate::web::error::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

pub fn validate_email(email: &str) -> Result<(), AppError> {
    if email.validate_email() {
        Ok(())
    } else {
        Err(AppError::InvalidEmailAddress)
    }
}

pub fn validate_password(password: &str) -> Result<(), AppError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::InvalidPasswordFormat);
    }
    Ok(())
}

/// Parses a numeric path segment such as a channel id.
pub fn parse_entity_id(raw: &str) -> Result<i32, AppError> {
    raw.parse::<i32>()
        .map_err(|e| AppError::InvalidEntityId(format!("'{raw}': {e}")))
}
