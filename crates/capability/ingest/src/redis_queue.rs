//! Redis 列表队列
//!
//! 键布局（`prefix` 默认 `queue:gps-position`）：
//! - `{prefix}:{partition}`：待处理列表，LPUSH 入队
//! - `{prefix}:{partition}:processing`：处理中列表，消费者 BLMOVE 取出后暂存于此
//! - `{prefix}:failed`：重试耗尽或负载无法解析的批次
//!
//! 处理成功后才从处理中列表移除，进程崩溃时批次保留，下次启动时放回待处理列表。

use crate::{BatchHandler, BatchQueue, QueueConfig, QueueError, handle_with_retry, partition_for};
use async_trait::async_trait;
use domain::TelemetryBatch;
use fleet_telemetry::record_batch_failure;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// BLMOVE 阻塞等待秒数，超时后重新进入循环
const BLOCK_TIMEOUT_SECONDS: f64 = 5.0;

fn pending_key(prefix: &str, partition: usize) -> String {
    format!("{prefix}:{partition}")
}

fn processing_key(prefix: &str, partition: usize) -> String {
    format!("{prefix}:{partition}:processing")
}

fn failed_key(prefix: &str) -> String {
    format!("{prefix}:failed")
}

pub struct RedisBatchQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisBatchQueue {
    pub fn new(client: redis::Client, config: QueueConfig) -> Self {
        Self {
            client,
            config: config.sanitized(),
        }
    }

    pub fn connect(redis_url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self::new(client, config))
    }

    /// 把上次运行遗留在处理中列表的批次放回待处理列表，返回放回数量。
    pub async fn recover_in_flight(&self) -> Result<usize, QueueError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let mut recovered = 0usize;
        for partition in 0..self.config.partitions {
            let source = processing_key(&self.config.key_prefix, partition);
            let target = pending_key(&self.config.key_prefix, partition);
            loop {
                // 从最新一条开始移到消费端，保持原有处理顺序
                let moved: Option<String> = redis::cmd("LMOVE")
                    .arg(&source)
                    .arg(&target)
                    .arg("LEFT")
                    .arg("RIGHT")
                    .query_async(&mut connection)
                    .await?;
                if moved.is_none() {
                    break;
                }
                recovered += 1;
            }
        }
        if recovered > 0 {
            warn!(
                target: "fleet.queue",
                recovered = recovered,
                "in_flight_batches_requeued"
            );
        }
        Ok(recovered)
    }

    /// 为每个分区启动消费者任务。
    pub fn spawn_consumers(&self, handler: Arc<dyn BatchHandler>) -> Vec<JoinHandle<()>> {
        info!(
            target: "fleet.queue",
            backend = "redis",
            partitions = self.config.partitions,
            prefix = %self.config.key_prefix,
            "queue_started"
        );
        (0..self.config.partitions)
            .map(|partition| {
                tokio::spawn(consume_partition(
                    self.client.clone(),
                    self.config.clone(),
                    partition,
                    handler.clone(),
                ))
            })
            .collect()
    }
}

#[async_trait]
impl BatchQueue for RedisBatchQueue {
    async fn enqueue(&self, batch: TelemetryBatch) -> Result<(), QueueError> {
        let partition = partition_for(batch.vehicle_id, self.config.partitions);
        let payload = serde_json::to_string(&batch)?;
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        connection
            .lpush::<_, _, ()>(pending_key(&self.config.key_prefix, partition), payload)
            .await?;
        Ok(())
    }
}

async fn consume_partition(
    client: redis::Client,
    config: QueueConfig,
    partition: usize,
    handler: Arc<dyn BatchHandler>,
) {
    loop {
        if let Err(err) = consume_until_error(&client, &config, partition, handler.clone()).await {
            warn!(
                target: "fleet.queue",
                partition = partition,
                error = %err,
                "consumer_reconnecting"
            );
            tokio::time::sleep(Duration::from_millis(config.backoff_ms.max(100))).await;
        }
    }
}

async fn consume_until_error(
    client: &redis::Client,
    config: &QueueConfig,
    partition: usize,
    handler: Arc<dyn BatchHandler>,
) -> Result<(), QueueError> {
    // 阻塞命令独占连接，每个分区单独建连
    let mut connection = client.get_multiplexed_tokio_connection().await?;
    let pending = pending_key(&config.key_prefix, partition);
    let processing = processing_key(&config.key_prefix, partition);
    let failed = failed_key(&config.key_prefix);
    loop {
        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&pending)
            .arg(&processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(BLOCK_TIMEOUT_SECONDS)
            .query_async(&mut connection)
            .await?;
        let Some(payload) = payload else {
            continue;
        };

        let outcome = match serde_json::from_str::<TelemetryBatch>(&payload) {
            Ok(batch) => {
                handle_with_retry(handler.clone(), &batch, config.max_retries, config.backoff_ms)
                    .await
                    .map_err(|err| err.to_string())
            }
            Err(err) => Err(format!("undecodable payload: {err}")),
        };

        if let Err(err) = outcome {
            record_batch_failure();
            error!(
                target: "fleet.queue",
                partition = partition,
                error = %err,
                "batch_moved_to_failed"
            );
            connection.lpush::<_, _, ()>(&failed, &payload).await?;
        }
        connection
            .lrem::<_, _, ()>(&processing, 1, &payload)
            .await?;
    }
}
