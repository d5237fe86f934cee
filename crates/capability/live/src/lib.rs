//! 实时状态推送
//!
//! 入库后的最新定位与运动状态变化推送给看板等订阅方。推送为尽力而为：
//! 调用方记录失败日志后继续，不影响入库结果。

use async_trait::async_trait;
use domain::MotionStatus;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 推送错误。
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<redis::RedisError> for LiveError {
    fn from(err: redis::RedisError) -> Self {
        Self::Publish(err.to_string())
    }
}

/// 最新定位推送。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    pub vehicle_id: i64,
    pub lat: f64,
    pub lng: f64,
    pub speed: u16,
    pub angle: u16,
    pub ignition: Option<bool>,
    pub movement: Option<bool>,
    pub ts_ms: i64,
}

/// 运动状态变化推送。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionUpdate {
    pub vehicle_id: i64,
    pub status: MotionStatus,
    pub since_ms: i64,
    pub lat: f64,
    pub lng: f64,
}

/// 进程内广播消息。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveMessage {
    Location(LocationUpdate),
    Motion(MotionUpdate),
}

/// 实时状态推送接口。
#[async_trait]
pub trait LiveStatusSink: Send + Sync {
    async fn publish_location(&self, update: &LocationUpdate) -> Result<(), LiveError>;
    async fn publish_motion(&self, update: &MotionUpdate) -> Result<(), LiveError>;
}

/// 空推送（无订阅方部署）。
#[derive(Debug, Default)]
pub struct NoopLiveSink;

#[async_trait]
impl LiveStatusSink for NoopLiveSink {
    async fn publish_location(&self, _update: &LocationUpdate) -> Result<(), LiveError> {
        Ok(())
    }

    async fn publish_motion(&self, _update: &MotionUpdate) -> Result<(), LiveError> {
        Ok(())
    }
}

/// 进程内广播推送。没有订阅者时消息直接丢弃。
#[derive(Debug, Clone)]
pub struct BroadcastLiveSink {
    tx: broadcast::Sender<LiveMessage>,
}

impl BroadcastLiveSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LiveMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl LiveStatusSink for BroadcastLiveSink {
    async fn publish_location(&self, update: &LocationUpdate) -> Result<(), LiveError> {
        let _ = self.tx.send(LiveMessage::Location(update.clone()));
        Ok(())
    }

    async fn publish_motion(&self, update: &MotionUpdate) -> Result<(), LiveError> {
        let _ = self.tx.send(LiveMessage::Motion(update.clone()));
        Ok(())
    }
}

/// Redis pub/sub 推送，频道为 `{prefix}:location` 与 `{prefix}:motion`。
pub struct RedisLiveSink {
    client: redis::Client,
    channel_prefix: String,
}

impl RedisLiveSink {
    pub fn new(client: redis::Client, channel_prefix: impl Into<String>) -> Self {
        Self {
            client,
            channel_prefix: channel_prefix.into(),
        }
    }

    pub fn connect(redis_url: &str, channel_prefix: impl Into<String>) -> Result<Self, LiveError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, channel_prefix))
    }

    async fn publish<T: Serialize + Sync>(&self, topic: &str, payload: &T) -> Result<(), LiveError> {
        let data = serde_json::to_string(payload)?;
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        connection
            .publish::<_, _, ()>(format!("{}:{topic}", self.channel_prefix), data)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LiveStatusSink for RedisLiveSink {
    async fn publish_location(&self, update: &LocationUpdate) -> Result<(), LiveError> {
        self.publish("location", update).await
    }

    async fn publish_motion(&self, update: &MotionUpdate) -> Result<(), LiveError> {
        self.publish("motion", update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_delivers_tagged_messages() {
        let sink = BroadcastLiveSink::new(8);
        let mut rx = sink.subscribe();
        let update = MotionUpdate {
            vehicle_id: 3,
            status: MotionStatus::Parking,
            since_ms: 1_000,
            lat: 41.0,
            lng: 69.0,
        };
        sink.publish_motion(&update).await.expect("publish");
        let message = rx.recv().await.expect("message");
        assert_eq!(message, LiveMessage::Motion(update));

        let json = serde_json::to_value(&message).expect("json");
        assert_eq!(json["type"], "motion");
        assert_eq!(json["status"], "parking");
    }

    #[tokio::test]
    async fn broadcast_without_subscribers_is_fine() {
        let sink = BroadcastLiveSink::new(1);
        let update = LocationUpdate {
            vehicle_id: 1,
            lat: 41.0,
            lng: 69.0,
            speed: 0,
            angle: 0,
            ignition: None,
            movement: None,
            ts_ms: 0,
        };
        sink.publish_location(&update).await.expect("publish");
    }
}
