//! 入库流水线
//!
//! 每个出队批次执行一次（至少一次投递，必须可重放）：
//! 1. 逐条校验，丢弃不合理记录；全部被丢弃时批次为空操作
//! 2. 查询车辆当前司机用于归属
//! 3. 计算与上一定位点的 haversine 距离，超过跳点阈值记为空
//! 4. 推导发动机点火事件（带去抖）
//! 5. 原子写入定位明细、发动机事件与最新定位
//!
//! 写入成功后推送最新定位（尽力而为）。

mod engine;
mod validate;

pub use engine::{DeferredFlip, deferred_flip_since, derive_engine_events};
pub use validate::{RecordRejection, validate_record};

use domain::{Record, TelemetryBatch, haversine_m, now_epoch_ms};
use fleet_live::{LiveStatusSink, LocationUpdate};
use fleet_storage::{
    DriverAssignmentStore, LastPositionRecord, PositionBatch, PositionRow, PositionStore,
    StorageError,
};
use fleet_telemetry::{record_records_rejected, record_rows_written};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 流水线错误（存储不可用等，可由队列重试）。
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<StorageError> for PipelineError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// 流水线参数。
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// 最早可接受的定位时间（毫秒）
    pub epoch_floor_ms: i64,
    /// 允许超前当前时间的最大毫秒数
    pub max_future_ms: i64,
    /// 相邻定位点最大合理距离（米）
    pub max_jump_meters: f64,
    /// 点火翻转去抖窗口（毫秒）
    pub engine_debounce_ms: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            epoch_floor_ms: 1_767_225_600_000,
            max_future_ms: 3_600_000,
            max_jump_meters: 5_000.0,
            engine_debounce_ms: 30_000,
        }
    }
}

/// 单批处理结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestOutcome {
    pub accepted: usize,
    pub rejected: usize,
    pub engine_events: usize,
    /// 全部记录被丢弃，批次未写入
    pub skipped: bool,
    /// 通过校验的记录（按原顺序），供运动状态机继续处理
    pub records: Vec<Record>,
}

impl IngestOutcome {
    pub fn skipped(rejected: usize) -> Self {
        Self {
            rejected,
            skipped: true,
            ..Self::default()
        }
    }
}

/// 按批次顺序计算每条记录与上一定位点的距离。
///
/// `previous` 为车辆已存储的最新定位；超过 `max_jump_meters` 视为定位漂移，返回 `None`。
pub fn distances_from_previous(
    previous: Option<(f64, f64)>,
    records: &[Record],
    max_jump_meters: f64,
) -> Vec<Option<f64>> {
    let mut previous = previous;
    records
        .iter()
        .map(|record| {
            let distance = previous.map(|(lat, lng)| haversine_m(lat, lng, record.lat, record.lng));
            previous = Some((record.lat, record.lng));
            match distance {
                Some(meters) if meters <= max_jump_meters => Some(meters),
                Some(_) => None,
                None => None,
            }
        })
        .collect()
}

/// 入库流水线入口
pub struct Ingestor {
    positions: Arc<dyn PositionStore>,
    drivers: Arc<dyn DriverAssignmentStore>,
    live: Arc<dyn LiveStatusSink>,
    config: IngestConfig,
}

impl Ingestor {
    pub fn new(
        positions: Arc<dyn PositionStore>,
        drivers: Arc<dyn DriverAssignmentStore>,
        live: Arc<dyn LiveStatusSink>,
        config: IngestConfig,
    ) -> Self {
        Self {
            positions,
            drivers,
            live,
            config,
        }
    }

    pub async fn ingest(&self, batch: &TelemetryBatch) -> Result<IngestOutcome, PipelineError> {
        self.ingest_at(batch, now_epoch_ms()).await
    }

    /// 以给定的当前时间处理批次（未来时间校验以此为基准）。
    pub async fn ingest_at(
        &self,
        batch: &TelemetryBatch,
        now_ms: i64,
    ) -> Result<IngestOutcome, PipelineError> {
        let vehicle_id = batch.vehicle_id;
        let mut records = Vec::with_capacity(batch.records.len());
        for record in &batch.records {
            match validate_record(
                record,
                self.config.epoch_floor_ms,
                self.config.max_future_ms,
                now_ms,
            ) {
                Ok(()) => records.push(record.clone()),
                Err(reason) => {
                    warn!(
                        target: "fleet.ingest",
                        vehicle_id = vehicle_id,
                        reason = reason.as_str(),
                        lat = record.lat,
                        lng = record.lng,
                        ignition = ?record.io.ignition,
                        ts_ms = record.ts_ms,
                        "record_rejected"
                    );
                }
            }
        }
        let rejected = batch.records.len() - records.len();
        record_records_rejected(rejected);

        let Some(last) = records.last().cloned() else {
            info!(
                target: "fleet.ingest",
                vehicle_id = vehicle_id,
                rejected = rejected,
                "batch_skipped"
            );
            return Ok(IngestOutcome::skipped(rejected));
        };

        let driver_id = self.drivers.current_driver(vehicle_id).await?;
        let previous = self.positions.last_position(vehicle_id).await?;
        let last_event = self.positions.last_engine_event(vehicle_id).await?;

        let distances = distances_from_previous(
            previous.as_ref().map(|p| (p.lat, p.lng)),
            &records,
            self.config.max_jump_meters,
        );
        let carried = match (&last_event, &previous) {
            // 最新定位的点火值与最近事件不同：窗口内有尚未判定的翻转
            (Some(event), Some(previous))
                if previous.recorded_at_ms > event.event_at_ms
                    && previous.ignition.is_some_and(|on| on != event.kind.ignition()) =>
            {
                let rows = self
                    .positions
                    .list_positions_between(
                        vehicle_id,
                        event.event_at_ms,
                        event.event_at_ms + self.config.engine_debounce_ms,
                    )
                    .await?;
                deferred_flip_since(event, &rows)
            }
            _ => None,
        };
        let engine_events = derive_engine_events(
            vehicle_id,
            last_event.as_ref(),
            carried,
            &records,
            self.config.engine_debounce_ms,
        );

        let positions = records
            .iter()
            .zip(distances)
            .enumerate()
            .map(|(index, (record, distance))| PositionRow {
                vehicle_id,
                device_id: batch.device_id,
                driver_id,
                distance_from_prev: distance,
                // 帧字节数只记在首行，按行求和即为流量
                bytes_received: (index == 0).then_some(batch.bytes_received as i64),
                lat: record.lat,
                lng: record.lng,
                speed: i32::from(record.speed),
                angle: i32::from(record.angle),
                satellites: i32::from(record.satellites),
                ignition: record.io.ignition,
                raw_io: record.io.elements.clone(),
                recorded_at_ms: record.ts_ms,
            })
            .collect();

        let persist = PositionBatch {
            vehicle_id,
            positions,
            engine_events,
            last_position: last_position_from(vehicle_id, &last),
        };
        let summary = self.positions.persist_batch(&persist).await?;
        record_rows_written(summary.positions_written, summary.engine_events_written);
        for event in &persist.engine_events {
            debug!(
                target: "fleet.ingest",
                vehicle_id = vehicle_id,
                kind = event.kind.as_str(),
                event_at_ms = event.event_at_ms,
                "engine_event_derived"
            );
        }
        info!(
            target: "fleet.ingest",
            vehicle_id = vehicle_id,
            accepted = records.len(),
            rejected = rejected,
            positions_written = summary.positions_written,
            engine_events_written = summary.engine_events_written,
            "batch_persisted"
        );

        let update = LocationUpdate {
            vehicle_id,
            lat: last.lat,
            lng: last.lng,
            speed: last.speed,
            angle: last.angle,
            ignition: last.io.ignition,
            movement: last.io.movement,
            ts_ms: last.ts_ms,
        };
        if let Err(err) = self.live.publish_location(&update).await {
            warn!(target: "fleet.ingest", vehicle_id = vehicle_id, error = %err, "live_publish_failed");
        }

        Ok(IngestOutcome {
            accepted: records.len(),
            rejected,
            engine_events: persist.engine_events.len(),
            skipped: false,
            records,
        })
    }
}

fn last_position_from(vehicle_id: i64, record: &Record) -> LastPositionRecord {
    LastPositionRecord {
        vehicle_id,
        lat: record.lat,
        lng: record.lng,
        speed: i32::from(record.speed),
        angle: i32::from(record.angle),
        altitude: i32::from(record.altitude),
        satellites: i32::from(record.satellites),
        ignition: record.io.ignition,
        movement: record.io.movement,
        odometer: record.io.total_odometer,
        gsm_signal: record.io.gsm_signal,
        battery_voltage: record.io.battery_voltage,
        ext_voltage: record.io.external_voltage,
        recorded_at_ms: record.ts_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::IoSnapshot;

    fn at(lat: f64, lng: f64) -> Record {
        Record {
            ts_ms: 1_767_300_000_000,
            priority: 0,
            lat,
            lng,
            altitude: 0,
            angle: 0,
            satellites: 8,
            speed: 0,
            io: IoSnapshot::default(),
        }
    }

    #[test]
    fn identical_fixes_are_zero_distance() {
        let records = [at(41.2995, 69.2401), at(41.2995, 69.2401)];
        let distances = distances_from_previous(Some((41.2995, 69.2401)), &records, 5_000.0);
        assert_eq!(distances, vec![Some(0.0), Some(0.0)]);
    }

    #[test]
    fn first_fix_without_history_has_no_distance() {
        let distances = distances_from_previous(None, &[at(41.0, 69.0)], 5_000.0);
        assert_eq!(distances, vec![None]);
    }

    #[test]
    fn jump_beyond_limit_is_null_and_resets_reference() {
        let records = [at(42.0, 69.0), at(42.0001, 69.0)];
        let distances = distances_from_previous(Some((41.0, 69.0)), &records, 5_000.0);
        assert_eq!(distances[0], None);
        let meters = distances[1].expect("short hop");
        assert!(meters > 10.0 && meters < 12.0, "distance {meters}");
    }
}
