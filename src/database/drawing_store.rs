use std::sync::Arc;

use crate::models::{DrawingRecord, Snowflake};

use super::kv_store::{KeyValueStore, StoreError};

pub const GIVEAWAY_PREFIX: &str = "giveaway:";

/// 抽奖记录的持久化映射（drawing id -> DrawingRecord）
///
/// Record presence is the "still active" marker: once a key is deleted the
/// drawing counts as resolved.
#[derive(Clone)]
pub struct DrawingStore {
    kv: Arc<dyn KeyValueStore>,
}

impl DrawingStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    pub fn key(message_id: Snowflake) -> String {
        format!("{GIVEAWAY_PREFIX}{message_id}")
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.kv.ping().await
    }

    pub async fn put(&self, record: &DrawingRecord) -> Result<(), StoreError> {
        let value = serde_json::to_string(record)?;
        self.kv.put(&Self::key(record.message_id), &value).await
    }

    /// `Ok(None)` means not found; an unreadable value is `StoreError::Corrupt`
    pub async fn get(&self, message_id: Snowflake) -> Result<Option<DrawingRecord>, StoreError> {
        let key = Self::key(message_id);
        match self.kv.get(&key).await? {
            None => Ok(None),
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::Corrupt {
                    key,
                    reason: e.to_string(),
                }),
        }
    }

    pub async fn delete(&self, message_id: Snowflake) -> Result<bool, StoreError> {
        self.kv.delete(&Self::key(message_id)).await
    }

    pub async fn list_ids(&self) -> Result<Vec<Snowflake>, StoreError> {
        let keys = self.kv.list_keys_by_prefix(GIVEAWAY_PREFIX).await?;
        let ids = keys
            .iter()
            .filter_map(|k| {
                let suffix = k.strip_prefix(GIVEAWAY_PREFIX)?;
                match suffix.parse::<Snowflake>() {
                    Ok(id) => Some(id),
                    Err(_) => {
                        log::warn!("Ignoring giveaway key with non-numeric id: {k}");
                        None
                    }
                }
            })
            .collect();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryKeyValueStore;
    use chrono::{TimeZone, Utc};

    fn record(message_id: u64) -> DrawingRecord {
        DrawingRecord {
            guild_id: 100,
            channel_id: 200,
            message_id,
            end_time: Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 15).unwrap()
                + chrono::Duration::microseconds(123_456),
            winners: 2,
            prize: "Steam key".into(),
            required_role_id: Some(77),
            creator_id: 5,
            creator_name: "host".into(),
        }
    }

    fn setup() -> (Arc<MemoryKeyValueStore>, DrawingStore) {
        let kv = Arc::new(MemoryKeyValueStore::new());
        (kv.clone(), DrawingStore::new(kv))
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let (kv, store) = setup();
        let r = record(42);
        store.put(&r).await.unwrap();
        assert_eq!(store.get(42).await.unwrap(), Some(r));

        let raw = kv.get("giveaway:42").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["messageId"], 42);
        assert_eq!(json["winners"], 2);
        assert_eq!(json["requiredRoleId"], 77);
        assert_eq!(json["endTime"], "2025-06-01T08:30:15.123456+00:00");
    }

    #[tokio::test]
    async fn test_null_role_round_trip() {
        let (_, store) = setup();
        let mut r = record(43);
        r.required_role_id = None;
        store.put(&r).await.unwrap();
        assert_eq!(store.get(43).await.unwrap().unwrap().required_role_id, None);
    }

    #[tokio::test]
    async fn test_naive_and_legacy_records_are_read_as_utc() {
        let (kv, store) = setup();
        kv.put(
            "giveaway:7",
            r#"{"guild_id": 1, "channel_id": 2, "message_id": 7, "end_time": "2025-06-01T08:30:15",
                "winners": 1, "prize": "X", "required_role_id": null, "creator_id": 3, "creator_name": "c"}"#,
        )
        .await
        .unwrap();
        let r = store.get(7).await.unwrap().unwrap();
        assert_eq!(r.end_time, Utc.with_ymd_and_hms(2025, 6, 1, 8, 30, 15).unwrap());
        assert_eq!(r.message_id, 7);

        // 写回后带上显式 UTC 偏移
        store.put(&r).await.unwrap();
        let raw = kv.get("giveaway:7").await.unwrap().unwrap();
        assert!(raw.contains(r#""endTime":"2025-06-01T08:30:15+00:00""#));
        assert_eq!(store.get(7).await.unwrap(), Some(r));
    }

    #[tokio::test]
    async fn test_corrupt_values_are_distinct_from_missing() {
        let (kv, store) = setup();
        kv.put("giveaway:8", "{not json").await.unwrap();
        kv.put(
            "giveaway:9",
            r#"{"guildId":1,"channelId":2,"messageId":9,"endTime":"soon","winners":1,"prize":"X","creatorId":3}"#,
        )
        .await
        .unwrap();

        assert!(matches!(store.get(8).await, Err(StoreError::Corrupt { .. })));
        assert!(matches!(store.get(9).await, Err(StoreError::Corrupt { .. })));
        assert!(matches!(store.get(10).await, Ok(None)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_list_ids_filters_keys() {
        let (kv, store) = setup();
        assert!(store.list_ids().await.unwrap().is_empty());

        store.put(&record(1)).await.unwrap();
        store.put(&record(2)).await.unwrap();
        kv.put("giveaway:oops", "{}").await.unwrap();
        kv.put("session:3", "{}").await.unwrap();

        let mut ids = store.list_ids().await.unwrap();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);

        assert!(store.delete(1).await.unwrap());
        assert!(!store.delete(1).await.unwrap());
        assert_eq!(store.list_ids().await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_error() {
        let (kv, store) = setup();
        kv.set_available(false);
        assert!(matches!(store.list_ids().await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.put(&record(1)).await, Err(StoreError::Unavailable(_))));
        assert!(matches!(store.get(1).await, Err(StoreError::Unavailable(_))));
    }
}
