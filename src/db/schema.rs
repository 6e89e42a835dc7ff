use sea_orm::{ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, Schema};
use tracing::info;

use crate::db::entities::prelude::*;

fn create_table<E: EntityTrait>(schema: &Schema, entity: E) -> sea_orm::sea_query::TableCreateStatement {
    let mut stmt = schema.create_table_from_entity(entity);
    stmt.if_not_exists();
    stmt
}

/// Creates any missing table from the entity definitions.
/// Parents are created before the tables that reference them.
pub async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let schema = Schema::new(backend);

    let statements = [
        create_table(&schema, User),
        create_table(&schema, Job),
        create_table(&schema, Channel),
        create_table(&schema, ChannelEmail),
        create_table(&schema, ChannelSlack),
        create_table(&schema, ChannelWebHook),
        create_table(&schema, JobAlert),
        create_table(&schema, PasswordReset),
    ];

    for stmt in statements.iter() {
        db.execute(backend.build(stmt)).await?;
    }

    info!(tables = statements.len(), "Database schema is up to date.");
    Ok(())
}
