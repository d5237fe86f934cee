//! 定位存储内存实现
//!
//! 单把写锁覆盖一次批量写入，读者不会看到半写入的批次。

use crate::error::StorageError;
use crate::models::{
    EngineEventRecord, LastPositionRecord, PersistSummary, PositionBatch, PositionRow,
};
use crate::traits::PositionStore;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct VehicleTelemetry {
    positions: Vec<PositionRow>,
    engine_events: Vec<EngineEventRecord>,
    last_position: Option<LastPositionRecord>,
}

#[derive(Default)]
struct PositionState {
    vehicles: HashMap<i64, VehicleTelemetry>,
    next_event_id: i64,
}

/// 定位内存存储
pub struct InMemoryPositionStore {
    state: RwLock<PositionState>,
    unavailable: AtomicBool,
}

impl InMemoryPositionStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(PositionState::default()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// 模拟存储不可用：开启后所有写入返回错误（用于测试重试）
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// 获取全部定位行数量（用于测试）
    pub fn len(&self) -> usize {
        self.state
            .read()
            .map(|state| state.vehicles.values().map(|v| v.positions.len()).sum())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryPositionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PositionStore for InMemoryPositionStore {
    async fn last_position(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<LastPositionRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .vehicles
            .get(&vehicle_id)
            .and_then(|vehicle| vehicle.last_position.clone()))
    }

    async fn last_engine_event(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<EngineEventRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state.vehicles.get(&vehicle_id).and_then(|vehicle| {
            vehicle
                .engine_events
                .iter()
                .max_by_key(|event| event.event_at_ms)
                .cloned()
        }))
    }

    async fn persist_batch(&self, batch: &PositionBatch) -> Result<PersistSummary, StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::new("storage unavailable"));
        }
        let mut state = self
            .state
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut next_event_id = state.next_event_id;
        let vehicle = state.vehicles.entry(batch.vehicle_id).or_default();
        let mut summary = PersistSummary::default();

        for row in &batch.positions {
            let exists = vehicle
                .positions
                .iter()
                .any(|existing| existing.recorded_at_ms == row.recorded_at_ms);
            if exists {
                continue;
            }
            vehicle.positions.push(row.clone());
            summary.positions_written += 1;
        }
        vehicle.positions.sort_by_key(|row| row.recorded_at_ms);

        for event in &batch.engine_events {
            let exists = vehicle
                .engine_events
                .iter()
                .any(|existing| existing.event_at_ms == event.event_at_ms);
            if exists {
                continue;
            }
            next_event_id += 1;
            vehicle.engine_events.push(EngineEventRecord {
                id: next_event_id,
                vehicle_id: event.vehicle_id,
                kind: event.kind,
                event_at_ms: event.event_at_ms,
                lat: event.lat,
                lng: event.lng,
            });
            summary.engine_events_written += 1;
        }
        vehicle.engine_events.sort_by_key(|event| event.event_at_ms);

        let advance = vehicle
            .last_position
            .as_ref()
            .map(|current| batch.last_position.recorded_at_ms >= current.recorded_at_ms)
            .unwrap_or(true);
        if advance {
            vehicle.last_position = Some(batch.last_position.clone());
        }

        state.next_event_id = next_event_id;
        Ok(summary)
    }

    async fn list_positions(&self, vehicle_id: i64) -> Result<Vec<PositionRow>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .vehicles
            .get(&vehicle_id)
            .map(|vehicle| vehicle.positions.clone())
            .unwrap_or_default())
    }

    async fn list_positions_between(
        &self,
        vehicle_id: i64,
        after_ms: i64,
        until_ms: i64,
    ) -> Result<Vec<PositionRow>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .vehicles
            .get(&vehicle_id)
            .map(|vehicle| {
                vehicle
                    .positions
                    .iter()
                    .filter(|row| row.recorded_at_ms > after_ms && row.recorded_at_ms <= until_ms)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_engine_events(
        &self,
        vehicle_id: i64,
    ) -> Result<Vec<EngineEventRecord>, StorageError> {
        let state = self
            .state
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(state
            .vehicles
            .get(&vehicle_id)
            .map(|vehicle| vehicle.engine_events.clone())
            .unwrap_or_default())
    }
}
