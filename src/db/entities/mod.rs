pub mod channel;
pub mod channel_email;
pub mod channel_slack;
pub mod channel_webhook;
pub mod job;
pub mod job_alert;
pub mod password_reset;
pub mod user;

pub mod prelude {
    pub use super::channel::Entity as Channel;
    pub use super::channel_email::Entity as ChannelEmail;
    pub use super::channel_slack::Entity as ChannelSlack;
    pub use super::channel_webhook::Entity as ChannelWebHook;
    pub use super::job::Entity as Job;
    pub use super::job_alert::Entity as JobAlert;
    pub use super::password_reset::Entity as PasswordReset;
    pub use super::user::Entity as User;
}
