pub mod channel_routes;
pub mod job_routes;
pub mod user_routes;
