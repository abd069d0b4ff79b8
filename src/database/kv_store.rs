use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect, Set,
};
use thiserror::Error;

use crate::entities::kv_entry_entity as kv;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt value at {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

/// Text key-value store contract.
///
/// `delete` is idempotent and reports whether a key was actually removed.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// `kv_entries` 表上的键值存储（Postgres）
#[derive(Clone)]
pub struct SeaOrmKeyValueStore {
    pool: DatabaseConnection,
}

impl SeaOrmKeyValueStore {
    pub fn new(pool: DatabaseConnection) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl KeyValueStore for SeaOrmKeyValueStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.pool.ping().await?;
        Ok(())
    }

    async fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let model = kv::ActiveModel {
            key: Set(key.to_string()),
            value: Set(value.to_string()),
            updated_at: Set(Utc::now()),
        };
        // Upsert：同一 key 覆盖旧值
        kv::Entity::insert(model)
            .on_conflict(
                OnConflict::column(kv::Column::Key)
                    .update_columns([kv::Column::Value, kv::Column::UpdatedAt])
                    .to_owned(),
            )
            .exec_without_returning(&self.pool)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let found = kv::Entity::find_by_id(key.to_string())
            .one(&self.pool)
            .await?;
        Ok(found.map(|m| m.value))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let res = kv::Entity::delete_by_id(key.to_string())
            .exec(&self.pool)
            .await?;
        Ok(res.rows_affected > 0)
    }

    async fn list_keys_by_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let keys: Vec<String> = kv::Entity::find()
            .select_only()
            .column(kv::Column::Key)
            .filter(kv::Column::Key.starts_with(prefix))
            .into_tuple()
            .all(&self.pool)
            .await?;
        Ok(keys)
    }
}
