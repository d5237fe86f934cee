//! 内存分区队列
//!
//! 每个分区一个有界 mpsc 通道与一个消费者任务。进程退出即丢失，仅用于测试与单机部署。

use crate::{BatchHandler, BatchQueue, QueueConfig, QueueError, handle_with_retry, partition_for};
use async_trait::async_trait;
use domain::TelemetryBatch;
use fleet_telemetry::record_batch_failure;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub struct InMemoryBatchQueue {
    senders: Vec<mpsc::Sender<TelemetryBatch>>,
}

impl InMemoryBatchQueue {
    /// 创建队列并为每个分区启动消费者。
    ///
    /// 队列被丢弃后通道关闭，消费者处理完剩余批次后退出。
    pub fn start(
        config: QueueConfig,
        handler: Arc<dyn BatchHandler>,
    ) -> (Self, Vec<JoinHandle<()>>) {
        let config = config.sanitized();
        let mut senders = Vec::with_capacity(config.partitions);
        let mut consumers = Vec::with_capacity(config.partitions);
        for partition in 0..config.partitions {
            let (tx, rx) = mpsc::channel(config.partition_capacity);
            senders.push(tx);
            consumers.push(tokio::spawn(consume_partition(
                partition,
                rx,
                handler.clone(),
                config.max_retries,
                config.backoff_ms,
            )));
        }
        info!(
            target: "fleet.queue",
            backend = "memory",
            partitions = config.partitions,
            "queue_started"
        );
        (Self { senders }, consumers)
    }
}

#[async_trait]
impl BatchQueue for InMemoryBatchQueue {
    async fn enqueue(&self, batch: TelemetryBatch) -> Result<(), QueueError> {
        let partition = partition_for(batch.vehicle_id, self.senders.len());
        let sender = self.senders.get(partition).ok_or(QueueError::Closed)?;
        sender.try_send(batch).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => QueueError::Full(partition),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }
}

async fn consume_partition(
    partition: usize,
    mut rx: mpsc::Receiver<TelemetryBatch>,
    handler: Arc<dyn BatchHandler>,
    max_retries: u64,
    backoff_ms: u64,
) {
    while let Some(batch) = rx.recv().await {
        if let Err(err) = handle_with_retry(handler.clone(), &batch, max_retries, backoff_ms).await
        {
            record_batch_failure();
            error!(
                target: "fleet.queue",
                partition = partition,
                vehicle_id = batch.vehicle_id,
                records = batch.records.len(),
                error = %err,
                "batch_dropped"
            );
        }
    }
}
