use std::sync::Arc;

use crate::config::DatabaseConfig;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

use super::kv_store::{KeyValueStore, SeaOrmKeyValueStore, StoreError};
use super::memory::MemoryKeyValueStore;

pub type DbPool = DatabaseConnection;

pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .sqlx_logging(false);
    Database::connect(options).await
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), DbErr> {
    Migrator::up(pool, None).await
}

/// 打开键值存储并确认连通性；失败时调用方应终止进程
pub async fn open_store(config: &DatabaseConfig) -> Result<Arc<dyn KeyValueStore>, StoreError> {
    if config.is_memory() {
        log::warn!("Using in-memory giveaway store; drawings will not survive a restart");
        return Ok(Arc::new(MemoryKeyValueStore::new()));
    }

    let pool = create_pool(config).await?;
    run_migrations(&pool).await?;
    let store = SeaOrmKeyValueStore::new(pool);
    store.ping().await?;
    Ok(Arc::new(store))
}
