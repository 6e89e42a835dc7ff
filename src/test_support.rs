use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::db::schema;
use crate::server::config::ServerConfig;

/// Fresh in-memory SQLite database with every table created.
pub async fn test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    // One connection, otherwise each pooled connection sees its own empty database.
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.expect("sqlite connection");
    schema::create_tables(&db).await.expect("schema creation");
    db
}

/// Defaults plus the cheapest bcrypt cost.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::new("sqlite::memory:", "test-secret");
    config.bcrypt_cost = 4;
    config
}
