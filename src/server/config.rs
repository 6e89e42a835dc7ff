use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
}

/// Server settings. Built once at startup and shared read-only.
#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Lifetime of issued access tokens, in hours.
    #[serde(default = "default_token_expiration_hours")]
    pub token_expiration_hours: i64,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default)]
    pub auto_create_schema: bool,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    token_expiration_hours: Option<i64>,
    db_max_connections: Option<u32>,
    request_timeout_secs: Option<u64>,
    bcrypt_cost: Option<u32>,
    log_dir: Option<String>,
    auto_create_schema: Option<bool>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_token_expiration_hours() -> i64 {
    24
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl ServerConfig {
    /// Config with every optional field at its default.
    pub fn new(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            jwt_secret: jwt_secret.into(),
            listen_addr: default_listen_addr(),
            token_expiration_hours: default_token_expiration_hours(),
            db_max_connections: default_db_max_connections(),
            request_timeout_secs: default_request_timeout_secs(),
            bcrypt_cost: default_bcrypt_cost(),
            log_dir: default_log_dir(),
            auto_create_schema: false,
        }
    }

    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config = match config_path {
            Some(path_str) if Path::new(path_str).exists() => {
                let contents = fs::read_to_string(path_str).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                Self::parse_toml(path_str, &contents)?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    fn parse_toml(path: &str, contents: &str) -> Result<PartialServerConfig, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            jwt_secret: env_config
                .jwt_secret
                .or(file_config.jwt_secret)
                .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            token_expiration_hours: env_config
                .token_expiration_hours
                .or(file_config.token_expiration_hours)
                .unwrap_or_else(default_token_expiration_hours),
            db_max_connections: env_config
                .db_max_connections
                .or(file_config.db_max_connections)
                .unwrap_or_else(default_db_max_connections),
            request_timeout_secs: env_config
                .request_timeout_secs
                .or(file_config.request_timeout_secs)
                .unwrap_or_else(default_request_timeout_secs),
            bcrypt_cost: env_config
                .bcrypt_cost
                .or(file_config.bcrypt_cost)
                .unwrap_or_else(default_bcrypt_cost),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            auto_create_schema: env_config
                .auto_create_schema
                .or(file_config.auto_create_schema)
                .unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_overrides_file() {
        let file = ServerConfig::parse_toml(
            "config.toml",
            r#"
            database_url = "postgres://file/db"
            jwt_secret = "file-secret"
            token_expiration_hours = 48
            "#,
        )
        .unwrap();
        let env = PartialServerConfig {
            jwt_secret: Some("env-secret".into()),
            ..Default::default()
        };

        let config = ServerConfig::merge(env, file).unwrap();
        assert_eq!(config.database_url, "postgres://file/db");
        assert_eq!(config.jwt_secret, "env-secret");
        assert_eq!(config.token_expiration_hours, 48);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(!config.auto_create_schema);
    }

    #[test]
    fn missing_secret_is_an_error() {
        let file = PartialServerConfig {
            database_url: Some("sqlite::memory:".into()),
            ..Default::default()
        };
        let err = ServerConfig::merge(PartialServerConfig::default(), file).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
    }

    #[test]
    fn malformed_toml_is_reported_with_path() {
        let err = ServerConfig::parse_toml("broken.toml", "jwt_secret = ").unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }
}
