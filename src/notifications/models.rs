use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::entities::{channel, channel_email, channel_slack, channel_webhook};
use crate::db::enums::ChannelType;

pub type Configuration = Map<String, Value>;

pub const DEFAULT_WEBHOOK_PAYLOAD_TYPE: &str = "JSON";

/// Type-specific settings of a notification channel.
///
/// The configuration arrives over the wire as a loose JSON object; it is turned
/// into one of these variants before anything touches the database, and each
/// variant maps onto its own side table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelConfig {
    Email {
        email: String,
    },
    Slack {
        base_url: String,
        slack_channel_name: Option<String>,
    },
    WebHook {
        base_url: String,
        payload_type: String,
        basic_auth_username: Option<String>,
        basic_auth_password: Option<String>,
    },
}

fn string_field(configuration: &Configuration, key: &str) -> Option<String> {
    configuration
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl ChannelConfig {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            ChannelConfig::Email { .. } => ChannelType::Email,
            ChannelConfig::Slack { .. } => ChannelType::Slack,
            ChannelConfig::WebHook { .. } => ChannelType::WebHook,
        }
    }

    /// Decodes the wire configuration for the given channel type.
    /// On failure returns the names of the missing required fields.
    pub fn from_configuration(
        channel_type: ChannelType,
        configuration: &Configuration,
    ) -> Result<Self, Vec<&'static str>> {
        match channel_type {
            ChannelType::Email => {
                let email = string_field(configuration, "email").ok_or_else(|| vec!["email"])?;
                Ok(ChannelConfig::Email { email })
            }
            ChannelType::Slack => {
                let base_url =
                    string_field(configuration, "base_url").ok_or_else(|| vec!["base_url"])?;
                Ok(ChannelConfig::Slack {
                    base_url,
                    slack_channel_name: string_field(configuration, "slack_channel_name"),
                })
            }
            ChannelType::WebHook => {
                let base_url =
                    string_field(configuration, "base_url").ok_or_else(|| vec!["base_url"])?;
                Ok(ChannelConfig::WebHook {
                    base_url,
                    payload_type: string_field(configuration, "payload_type")
                        .unwrap_or_else(|| DEFAULT_WEBHOOK_PAYLOAD_TYPE.to_string()),
                    basic_auth_username: string_field(configuration, "basic_auth_username"),
                    basic_auth_password: string_field(configuration, "basic_auth_password"),
                })
            }
        }
    }

    /// Flattens the settings back into the wire configuration object.
    /// Optional fields that are unset are left out.
    pub fn to_configuration(&self) -> Configuration {
        let mut configuration = Configuration::new();
        match self {
            ChannelConfig::Email { email } => {
                configuration.insert("email".into(), Value::from(email.clone()));
            }
            ChannelConfig::Slack {
                base_url,
                slack_channel_name,
            } => {
                configuration.insert("base_url".into(), Value::from(base_url.clone()));
                if let Some(name) = slack_channel_name {
                    configuration.insert("slack_channel_name".into(), Value::from(name.clone()));
                }
            }
            ChannelConfig::WebHook {
                base_url,
                payload_type,
                basic_auth_username,
                basic_auth_password,
            } => {
                configuration.insert("base_url".into(), Value::from(base_url.clone()));
                configuration.insert("payload_type".into(), Value::from(payload_type.clone()));
                if let Some(username) = basic_auth_username {
                    configuration.insert("basic_auth_username".into(), Value::from(username.clone()));
                }
                if let Some(password) = basic_auth_password {
                    configuration.insert("basic_auth_password".into(), Value::from(password.clone()));
                }
            }
        }
        configuration
    }
}

impl From<channel_email::Model> for ChannelConfig {
    fn from(m: channel_email::Model) -> Self {
        ChannelConfig::Email { email: m.email }
    }
}

impl From<channel_slack::Model> for ChannelConfig {
    fn from(m: channel_slack::Model) -> Self {
        ChannelConfig::Slack {
            base_url: m.base_url,
            slack_channel_name: m.slack_channel_name,
        }
    }
}

impl From<channel_webhook::Model> for ChannelConfig {
    fn from(m: channel_webhook::Model) -> Self {
        ChannelConfig::WebHook {
            base_url: m.base_url,
            payload_type: m.payload_type,
            basic_auth_username: m.basic_auth_username,
            basic_auth_password: m.basic_auth_password,
        }
    }
}

/// API request body for creating a new notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    pub configuration: Option<Configuration>,
}

/// API request body for updating an existing channel. The type cannot change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: Option<String>,
    pub configuration: Option<Configuration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChannelResponse {
    pub id: i32,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub configuration: Option<Configuration>,
}

impl ChannelResponse {
    pub fn new(channel: channel::Model, config: Option<&ChannelConfig>) -> Self {
        Self {
            id: channel.id,
            channel_type: channel.channel_type,
            name: channel.name,
            configuration: config.map(ChannelConfig::to_configuration),
        }
    }
}
