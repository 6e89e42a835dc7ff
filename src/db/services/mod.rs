pub mod channel_service;
pub mod job_service;
pub mod password_reset_service;
pub mod user_service;
