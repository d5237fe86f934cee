use crate::MotionError;
use crate::machine::{MotionConfig, Transition, next_transition, promotion_due};
use domain::{MotionState, MotionStatus, Record, StopKind, now_epoch_ms};
use fleet_live::{LiveStatusSink, MotionUpdate};
use fleet_storage::{MotionStateStore, NewStopEvent, StopEventStore};
use fleet_telemetry::{
    record_motion_transition, record_stop_event_closed, record_stop_event_opened,
    record_sweep_promotion,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type VehicleLock = Arc<tokio::sync::Mutex<()>>;

/// 车辆锁守卫；释放时若无其他任务持有或等待该锁，则从锁表移除。
struct VehicleGuard<'a> {
    locks: &'a Mutex<HashMap<i64, VehicleLock>>,
    vehicle_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for VehicleGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // 克隆只在锁表互斥锁内发生，计数为 1 时没有其他持有者
        if let Ok(mut locks) = self.locks.lock()
            && locks
                .get(&self.vehicle_id)
                .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.vehicle_id);
        }
    }
}

/// 运动状态机入口
///
/// 同一车辆的状态读取、区间开闭与状态写回在车辆锁内完成。
pub struct MotionTracker {
    states: Arc<dyn MotionStateStore>,
    stops: Arc<dyn StopEventStore>,
    live: Arc<dyn LiveStatusSink>,
    config: MotionConfig,
    locks: Mutex<HashMap<i64, VehicleLock>>,
}

impl MotionTracker {
    pub fn new(
        states: Arc<dyn MotionStateStore>,
        stops: Arc<dyn StopEventStore>,
        live: Arc<dyn LiveStatusSink>,
        config: MotionConfig,
    ) -> Self {
        Self {
            states,
            stops,
            live,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_vehicle(&self, vehicle_id: i64) -> Result<VehicleGuard<'_>, MotionError> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| MotionError::Lock)?;
            locks.entry(vehicle_id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        Ok(VehicleGuard {
            locks: &self.locks,
            vehicle_id,
            guard: Some(guard),
        })
    }

    /// 按时间顺序应用一批已校验的记录，返回处理后的状态。
    ///
    /// 无缓存状态时以首条记录初始化为 `Moving`；不晚于 `last_record_ms` 的记录被忽略，
    /// 因此重复投递同一批次不会产生新的迁移。
    pub async fn process_records(
        &self,
        vehicle_id: i64,
        records: &[Record],
    ) -> Result<Option<MotionState>, MotionError> {
        let Some(first) = records.first() else {
            return Ok(None);
        };
        let guard = self.lock_vehicle(vehicle_id).await?;

        let mut state = match self.states.get_state(vehicle_id).await? {
            Some(state) => state,
            None => {
                debug!(target: "fleet.motion", vehicle_id = vehicle_id, "motion_state_seeded");
                MotionState::seed(first)
            }
        };
        let mut changes = Vec::new();
        for record in records {
            if record.ts_ms <= state.last_record_ms {
                continue;
            }
            let previous = state.status;
            state = self.apply(vehicle_id, state, record).await?;
            if state.status != previous {
                // 区间已开闭，先写回状态再处理后续记录
                self.states.set_state(vehicle_id, &state).await?;
                self.log_change(vehicle_id, previous, &state, "record");
                changes.push(state.clone());
            }
        }
        self.states.set_state(vehicle_id, &state).await?;
        drop(guard);

        for change in &changes {
            self.publish(vehicle_id, change).await;
        }
        Ok(Some(state))
    }

    async fn apply(
        &self,
        vehicle_id: i64,
        state: MotionState,
        record: &Record,
    ) -> Result<MotionState, MotionError> {
        match next_transition(&state, record, &self.config) {
            Transition::Unchanged => Ok(MotionState {
                last_record_ms: record.ts_ms,
                ..state
            }),
            Transition::Promote(kind) => {
                let event_id = self.open_stop(vehicle_id, kind, &state).await?;
                Ok(MotionState {
                    status: MotionStatus::confirmed(kind),
                    open_event_id: Some(event_id),
                    last_record_ms: record.ts_ms,
                    ..state
                })
            }
            Transition::Enter {
                status,
                close_event,
            } => {
                if let Some(event_id) = close_event {
                    self.close_stop(vehicle_id, event_id, record.ts_ms).await?;
                }
                Ok(MotionState::anchored(status, record))
            }
        }
    }

    /// 开启停车区间；先关闭车辆遗留的未关闭区间（结束时间取新区间开始时间）。
    async fn open_stop(
        &self,
        vehicle_id: i64,
        kind: StopKind,
        state: &MotionState,
    ) -> Result<i64, MotionError> {
        for stale in self.stops.list_open(vehicle_id).await? {
            warn!(
                target: "fleet.motion",
                vehicle_id = vehicle_id,
                event_id = stale.id,
                kind = stale.kind.as_str(),
                "stale_stop_event_closed"
            );
            self.close_stop(vehicle_id, stale.id, state.since_ms).await?;
        }
        let event_id = self
            .stops
            .open_event(&NewStopEvent {
                vehicle_id,
                kind,
                start_ms: state.since_ms,
                lat: state.lat,
                lng: state.lng,
            })
            .await?;
        record_stop_event_opened();
        info!(
            target: "fleet.motion",
            vehicle_id = vehicle_id,
            event_id = event_id,
            kind = kind.as_str(),
            start_ms = state.since_ms,
            "stop_event_opened"
        );
        Ok(event_id)
    }

    async fn close_stop(
        &self,
        vehicle_id: i64,
        event_id: i64,
        end_ms: i64,
    ) -> Result<(), MotionError> {
        match self.stops.close_event(event_id, end_ms).await? {
            Some(event) => {
                record_stop_event_closed();
                info!(
                    target: "fleet.motion",
                    vehicle_id = vehicle_id,
                    event_id = event_id,
                    kind = event.kind.as_str(),
                    duration_seconds = ?event.duration_seconds,
                    "stop_event_closed"
                );
            }
            None => {
                warn!(
                    target: "fleet.motion",
                    vehicle_id = vehicle_id,
                    event_id = event_id,
                    "stop_event_already_closed"
                );
            }
        }
        Ok(())
    }

    /// 对所有缓存车辆做一次超时巡检，返回升级的车辆数。
    ///
    /// 单车失败只记录日志，不影响其他车辆。
    pub async fn sweep(&self, now_ms: i64) -> Result<usize, MotionError> {
        let vehicle_ids = self.states.list_vehicle_ids().await?;
        let mut promoted = 0;
        for vehicle_id in vehicle_ids {
            match self.sweep_vehicle(vehicle_id, now_ms).await {
                Ok(true) => promoted += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        target: "fleet.motion",
                        vehicle_id = vehicle_id,
                        error = %err,
                        "sweep_vehicle_failed"
                    );
                }
            }
        }
        Ok(promoted)
    }

    async fn sweep_vehicle(&self, vehicle_id: i64, now_ms: i64) -> Result<bool, MotionError> {
        let guard = self.lock_vehicle(vehicle_id).await?;
        // 加锁后重新读取，避免覆盖刚完成的逐条迁移
        let Some(state) = self.states.get_state(vehicle_id).await? else {
            return Ok(false);
        };
        if !state.status.is_candidate() {
            return Ok(false);
        }
        let Some(kind) = promotion_due(&state, now_ms, &self.config) else {
            return Ok(false);
        };
        let event_id = self.open_stop(vehicle_id, kind, &state).await?;
        let previous = state.status;
        let promoted = MotionState {
            status: MotionStatus::confirmed(kind),
            open_event_id: Some(event_id),
            ..state
        };
        self.states.set_state(vehicle_id, &promoted).await?;
        drop(guard);

        record_sweep_promotion();
        self.log_change(vehicle_id, previous, &promoted, "sweep");
        self.publish(vehicle_id, &promoted).await;
        Ok(true)
    }

    /// 按固定间隔执行巡检，直到任务被取消。
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // 首次 tick 立即返回
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.sweep(now_epoch_ms()).await {
                    Ok(0) => {}
                    Ok(promoted) => {
                        info!(target: "fleet.motion", promoted = promoted, "sweep_completed");
                    }
                    Err(err) => {
                        error!(target: "fleet.motion", error = %err, "sweep_failed");
                    }
                }
            }
        })
    }

    fn log_change(&self, vehicle_id: i64, from: MotionStatus, state: &MotionState, source: &str) {
        record_motion_transition();
        info!(
            target: "fleet.motion",
            vehicle_id = vehicle_id,
            from = from.as_str(),
            to = state.status.as_str(),
            since_ms = state.since_ms,
            source = source,
            "motion_state_changed"
        );
    }

    async fn publish(&self, vehicle_id: i64, state: &MotionState) {
        let update = MotionUpdate {
            vehicle_id,
            status: state.status,
            since_ms: state.since_ms,
            lat: state.lat,
            lng: state.lng,
        };
        if let Err(err) = self.live.publish_motion(&update).await {
            warn!(target: "fleet.motion", vehicle_id = vehicle_id, error = %err, "live_publish_failed");
        }
    }
}
