use std::time::Duration;

use sea_orm::sea_query::Index;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
};
use tracing::{info, warn};

use crate::entity::{resource, resource_ref};

pub async fn init_db(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());

    if db_url.starts_with("sqlite:") {
        // In-memory SQLite databases live and die with their single connection.
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(100)
            .min_connections(5)
            .connect_timeout(Duration::from_secs(8))
            .acquire_timeout(Duration::from_secs(8))
            .idle_timeout(Duration::from_secs(8))
            .max_lifetime(Duration::from_secs(8));
    }
    opt.sqlx_logging(false);

    let db = Database::connect(opt).await?;
    create_tables(&db).await?;
    ensure_indexes(&db).await?;

    Ok(db)
}

/// Create the resource tables if they do not exist yet.
pub async fn create_tables(db: &DatabaseConnection) -> Result<(), DbErr> {
    create_table(db, resource::Entity).await?;
    create_table(db, resource_ref::Entity).await?;
    Ok(())
}

async fn create_table<E: EntityTrait>(db: &DatabaseConnection, entity: E) -> Result<(), DbErr> {
    let backend = db.get_database_backend();
    let mut stmt = Schema::new(backend).create_table_from_entity(entity);
    stmt.if_not_exists();
    db.execute_raw(backend.build(&stmt)).await?;
    Ok(())
}

/// Ensure required database indexes exist.
///
/// The `(owner_id, path)` unique index is what turns a lost `reserve` race
/// into a constraint violation instead of a duplicate record.
pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
    let backend = db.get_database_backend();

    let stmt = Index::create()
        .if_not_exists()
        .unique()
        .name("idx_resource_owner_path")
        .table(resource::Entity)
        .col(resource::Column::OwnerId)
        .col(resource::Column::Path)
        .to_owned();
    db.execute_raw(backend.build(&stmt)).await?;
    info!("Ensured index idx_resource_owner_path exists");

    // Reference lookups by memory.
    let stmt = Index::create()
        .if_not_exists()
        .name("idx_resource_ref_memory")
        .table(resource_ref::Entity)
        .col(resource_ref::Column::MemoryId)
        .to_owned();
    if let Err(e) = db.execute_raw(backend.build(&stmt)).await {
        warn!("Failed to create index idx_resource_ref_memory: {}", e);
    }

    Ok(())
}
