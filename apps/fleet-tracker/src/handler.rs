//! 队列批次处理器
//!
//! 把入库流水线与运动状态机串成一个 `BatchHandler`：先入库，再用通过校验的记录推进状态机。
//! 任一步失败都返回错误，由队列按重试策略重新投递整个批次。

use domain::TelemetryBatch;
use fleet_ingest::{BatchHandler, IngestError};
use fleet_motion::MotionTracker;
use fleet_pipeline::Ingestor;
use fleet_telemetry::record_batch_ingested;
use std::sync::Arc;
use tracing::{debug, warn};

/// 流水线处理器
pub struct PipelineHandler {
    ingestor: Ingestor,
    motion: Arc<MotionTracker>,
}

impl PipelineHandler {
    pub fn new(ingestor: Ingestor, motion: Arc<MotionTracker>) -> Self {
        Self { ingestor, motion }
    }
}

#[async_trait::async_trait]
impl BatchHandler for PipelineHandler {
    async fn handle(&self, batch: &TelemetryBatch) -> Result<(), IngestError> {
        let outcome = self.ingestor.ingest(batch).await.map_err(|err| {
            warn!(
                target: "fleet.ingest",
                vehicle_id = batch.vehicle_id,
                error = %err,
                "pipeline_failed"
            );
            IngestError::Handler(err.to_string())
        })?;

        if !outcome.skipped {
            let state = self
                .motion
                .process_records(batch.vehicle_id, &outcome.records)
                .await
                .map_err(|err| {
                    warn!(
                        target: "fleet.motion",
                        vehicle_id = batch.vehicle_id,
                        error = %err,
                        "motion_failed"
                    );
                    IngestError::Handler(err.to_string())
                })?;
            if let Some(state) = state {
                debug!(
                    target: "fleet.motion",
                    vehicle_id = batch.vehicle_id,
                    status = state.status.as_str(),
                    "motion_state_applied"
                );
            }
        }

        record_batch_ingested();
        Ok(())
    }
}
