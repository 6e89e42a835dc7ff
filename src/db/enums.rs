use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountType {
    #[sea_orm(string_value = "FREE")]
    Free,
    #[sea_orm(string_value = "STARTUP")]
    Startup,
    #[sea_orm(string_value = "BUSINESS")]
    Business,
    #[sea_orm(string_value = "CUSTOM")]
    Custom,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Free => "FREE",
            AccountType::Startup => "STARTUP",
            AccountType::Business => "BUSINESS",
            AccountType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobType {
    #[sea_orm(string_value = "CRON")]
    Cron,
    #[sea_orm(string_value = "AUTO")]
    Auto,
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CRON" => Ok(JobType::Cron),
            "AUTO" => Ok(JobType::Auto),
            other => Err(other.to_string()),
        }
    }
}

/// Set by the external monitor; new jobs start as `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[sea_orm(string_value = "UNKNOWN")]
    Unknown,
    #[sea_orm(string_value = "OK")]
    Ok,
    #[sea_orm(string_value = "ERROR")]
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    #[sea_orm(string_value = "EMAIL")]
    Email,
    #[sea_orm(string_value = "SLACK")]
    Slack,
    #[sea_orm(string_value = "WEB_HOOK")]
    WebHook,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Email => "EMAIL",
            ChannelType::Slack => "SLACK",
            ChannelType::WebHook => "WEB_HOOK",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "EMAIL" => Ok(ChannelType::Email),
            "SLACK" => Ok(ChannelType::Slack),
            "WEB_HOOK" => Ok(ChannelType::WebHook),
            other => Err(other.to_string()),
        }
    }
}
