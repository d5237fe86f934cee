//! 工作队列能力
//!
//! 会话层把解码后的批次投递到队列，消费者异步完成入库与状态机推进，
//! 套接字 I/O 与存储 I/O 由此解耦。
//!
//! - 分区：`vehicle_id mod partitions`，每个分区一个消费者，同一车辆的批次按投递顺序串行处理
//! - 投递语义：至少一次；处理器失败按固定间隔重试，超过次数后丢弃（内存）或转入失败列表（Redis）

pub mod memory;
pub mod redis_queue;

use async_trait::async_trait;
use domain::TelemetryBatch;
use std::sync::Arc;
use std::time::Duration;

pub use memory::InMemoryBatchQueue;
pub use redis_queue::RedisBatchQueue;

/// 队列投递错误。
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue full: partition {0}")]
    Full(usize),
    #[error("queue closed")]
    Closed,
    #[error("queue backend error: {0}")]
    Backend(String),
    #[error("payload error: {0}")]
    Payload(String),
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

/// 批次处理错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("handler error: {0}")]
    Handler(String),
}

/// 批次处理器（入库 + 状态机）。
#[async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle(&self, batch: &TelemetryBatch) -> Result<(), IngestError>;
}

/// 批次投递端。
#[async_trait]
pub trait BatchQueue: Send + Sync {
    async fn enqueue(&self, batch: TelemetryBatch) -> Result<(), QueueError>;
}

/// 队列参数。
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub partitions: usize,
    pub max_retries: u64,
    pub backoff_ms: u64,
    /// 内存后端每个分区的缓冲容量
    pub partition_capacity: usize,
    /// Redis 键前缀
    pub key_prefix: String,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            partitions: 8,
            max_retries: 3,
            backoff_ms: 500,
            partition_capacity: 1024,
            key_prefix: "queue:gps-position".to_string(),
        }
    }
}

impl QueueConfig {
    pub(crate) fn sanitized(mut self) -> Self {
        if self.partitions == 0 {
            self.partitions = 1;
        }
        if self.partition_capacity == 0 {
            self.partition_capacity = 1;
        }
        self
    }
}

/// 车辆所属分区。
pub fn partition_for(vehicle_id: i64, partitions: usize) -> usize {
    let partitions = partitions.max(1) as i64;
    vehicle_id.rem_euclid(partitions) as usize
}

/// 按固定间隔重试处理器，超过 `max_retries` 次后返回最后一次错误。
pub async fn handle_with_retry(
    handler: Arc<dyn BatchHandler>,
    batch: &TelemetryBatch,
    max_retries: u64,
    backoff_ms: u64,
) -> Result<(), IngestError> {
    let mut attempt = 0u64;
    loop {
        match handler.handle(batch).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }
                tracing::warn!(
                    target: "fleet.queue",
                    vehicle_id = batch.vehicle_id,
                    attempt = attempt,
                    error = %err,
                    "batch_retry"
                );
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}
