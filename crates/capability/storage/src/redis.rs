//! Redis 运动状态缓存实现
//!
//! 键格式：`{prefix}:{vehicle_id}`，值为 `MotionState` 的 JSON，不设置过期时间。

use crate::error::StorageError;
use crate::traits::MotionStateStore;
use domain::MotionState;
use redis::AsyncCommands;

fn state_key(prefix: &str, vehicle_id: i64) -> String {
    format!("{prefix}:{vehicle_id}")
}

fn parse_vehicle_id_from_key(prefix: &str, key: &str) -> Option<i64> {
    key.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(':'))
        .and_then(|id| id.parse().ok())
}

/// Redis 运动状态存储
pub struct RedisMotionStateStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisMotionStateStore {
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    pub fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, key_prefix))
    }
}

#[async_trait::async_trait]
impl MotionStateStore for RedisMotionStateStore {
    async fn get_state(&self, vehicle_id: i64) -> Result<Option<MotionState>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data: Option<String> = connection
            .get(state_key(&self.key_prefix, vehicle_id))
            .await?;
        let Some(data) = data else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    async fn set_state(&self, vehicle_id: i64, state: &MotionState) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let data = serde_json::to_string(state)?;
        connection
            .set::<_, _, ()>(state_key(&self.key_prefix, vehicle_id), data)
            .await?;
        Ok(())
    }

    async fn list_vehicle_ids(&self) -> Result<Vec<i64>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let pattern = format!("{}:*", self.key_prefix);
        let mut cursor: u64 = 0;
        let mut ids = Vec::new();
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await?;
            ids.extend(
                keys.iter()
                    .filter_map(|key| parse_vehicle_id_from_key(&self.key_prefix, key)),
            );
            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }
}
