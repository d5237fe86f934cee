//! 运动状态迁移规则（纯函数，不触达存储）

use domain::{MotionState, MotionStatus, Record, StopKind, haversine_m};

/// 状态机阈值。
#[derive(Debug, Clone)]
pub struct MotionConfig {
    /// 不超过此速度（km/h）视为静止
    pub speed_threshold_kmh: f64,
    /// 距锚点不超过此距离（米）视为原地漂移
    pub distance_threshold_m: f64,
    /// stop_candidate 升级为 stopped 所需时长（毫秒）
    pub stop_threshold_ms: i64,
    /// parking_candidate 升级为 parking 所需时长（毫秒）
    pub parking_threshold_ms: i64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            speed_threshold_kmh: 10.0,
            distance_threshold_m: 50.0,
            stop_threshold_ms: 120_000,
            parking_threshold_ms: 180_000,
        }
    }
}

impl MotionConfig {
    fn threshold_ms(&self, kind: StopKind) -> i64 {
        match kind {
            StopKind::Stop => self.stop_threshold_ms,
            StopKind::Parking => self.parking_threshold_ms,
        }
    }
}

/// 单条记录触发的迁移。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 状态不变（仅推进 last_record_ms）
    Unchanged,
    /// 待确认状态超时，升级并以原 since/锚点开启区间
    Promote(StopKind),
    /// 以当前记录为锚点进入新状态；`close_event` 为需关闭的区间
    Enter {
        status: MotionStatus,
        close_event: Option<i64>,
    },
}

/// 速度不超过阈值且距锚点不超过漂移阈值。
pub fn is_stationary(state: &MotionState, record: &Record, config: &MotionConfig) -> bool {
    let distance = haversine_m(state.lat, state.lng, record.lat, record.lng);
    f64::from(record.speed) <= config.speed_threshold_kmh && distance <= config.distance_threshold_m
}

/// 待确认状态在 `now_ms` 时是否已满足升级时长。
pub fn promotion_due(state: &MotionState, now_ms: i64, config: &MotionConfig) -> Option<StopKind> {
    let kind = state.status.promotes_to()?;
    (now_ms.saturating_sub(state.since_ms) >= config.threshold_ms(kind)).then_some(kind)
}

/// 计算记录对当前状态的迁移。
pub fn next_transition(state: &MotionState, record: &Record, config: &MotionConfig) -> Transition {
    if record.io.ignition == Some(false) {
        return settle(state, record.ts_ms, StopKind::Parking, config);
    }
    if is_stationary(state, record, config) {
        return settle(state, record.ts_ms, StopKind::Stop, config);
    }
    match state.status {
        MotionStatus::Moving => Transition::Unchanged,
        _ => Transition::Enter {
            status: MotionStatus::Moving,
            close_event: state.open_event_id,
        },
    }
}

/// 静止分支：已确认则不变，待确认则等待超时，其余状态进入对应的待确认状态。
fn settle(state: &MotionState, at_ms: i64, kind: StopKind, config: &MotionConfig) -> Transition {
    let candidate = match kind {
        StopKind::Stop => MotionStatus::StopCandidate,
        StopKind::Parking => MotionStatus::ParkingCandidate,
    };
    if state.status == MotionStatus::confirmed(kind) {
        return Transition::Unchanged;
    }
    if state.status == candidate {
        return match promotion_due(state, at_ms, config) {
            Some(kind) => Transition::Promote(kind),
            None => Transition::Unchanged,
        };
    }
    Transition::Enter {
        status: candidate,
        close_event: state.open_event_id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::IoSnapshot;
    use std::collections::BTreeMap;

    const T: i64 = 1_767_300_000_000;

    fn record(ts_ms: i64, speed: u16, ignition: bool) -> Record {
        let mut elements = BTreeMap::new();
        elements.insert(239, i64::from(ignition));
        Record {
            ts_ms,
            priority: 0,
            lat: 41.2995,
            lng: 69.2401,
            altitude: 450,
            angle: 0,
            satellites: 10,
            speed,
            io: IoSnapshot::from_elements(elements),
        }
    }

    fn state(status: MotionStatus, since_ms: i64, open_event_id: Option<i64>) -> MotionState {
        MotionState {
            status,
            since_ms,
            lat: 41.2995,
            lng: 69.2401,
            open_event_id,
            last_record_ms: since_ms,
        }
    }

    #[test]
    fn ignition_off_while_moving_becomes_parking_candidate() {
        let config = MotionConfig::default();
        let current = state(MotionStatus::Moving, T, None);
        assert_eq!(
            next_transition(&current, &record(T + 1_000, 0, false), &config),
            Transition::Enter {
                status: MotionStatus::ParkingCandidate,
                close_event: None,
            }
        );
    }

    #[test]
    fn ignition_off_while_stopped_closes_stop_event() {
        let config = MotionConfig::default();
        let current = state(MotionStatus::Stopped, T, Some(7));
        assert_eq!(
            next_transition(&current, &record(T + 5_000, 0, false), &config),
            Transition::Enter {
                status: MotionStatus::ParkingCandidate,
                close_event: Some(7),
            }
        );
    }

    #[test]
    fn parking_ignores_further_ignition_off() {
        let config = MotionConfig::default();
        let current = state(MotionStatus::Parking, T, Some(3));
        assert_eq!(
            next_transition(&current, &record(T + 600_000, 0, false), &config),
            Transition::Unchanged
        );
    }

    #[test]
    fn parking_candidate_promotes_at_threshold() {
        let config = MotionConfig::default();
        let current = state(MotionStatus::ParkingCandidate, T, None);
        assert_eq!(
            next_transition(&current, &record(T + 179_999, 0, false), &config),
            Transition::Unchanged
        );
        assert_eq!(
            next_transition(&current, &record(T + 180_000, 0, false), &config),
            Transition::Promote(StopKind::Parking)
        );
    }

    #[test]
    fn slow_and_close_becomes_stop_candidate_then_stopped() {
        let config = MotionConfig::default();
        let moving = state(MotionStatus::Moving, T, None);
        assert_eq!(
            next_transition(&moving, &record(T + 1_000, 5, true), &config),
            Transition::Enter {
                status: MotionStatus::StopCandidate,
                close_event: None,
            }
        );
        let candidate = state(MotionStatus::StopCandidate, T, None);
        assert_eq!(
            next_transition(&candidate, &record(T + 120_000, 5, true), &config),
            Transition::Promote(StopKind::Stop)
        );
    }

    #[test]
    fn drift_beyond_distance_threshold_counts_as_moving() {
        let config = MotionConfig::default();
        let candidate = state(MotionStatus::StopCandidate, T, None);
        let mut far = record(T + 30_000, 0, true);
        far.lat += 0.001;
        assert_eq!(
            next_transition(&candidate, &far, &config),
            Transition::Enter {
                status: MotionStatus::Moving,
                close_event: None,
            }
        );
    }

    #[test]
    fn ignition_on_while_parked_slow_closes_parking() {
        let config = MotionConfig::default();
        let parked = state(MotionStatus::Parking, T, Some(11));
        assert_eq!(
            next_transition(&parked, &record(T + 400_000, 0, true), &config),
            Transition::Enter {
                status: MotionStatus::StopCandidate,
                close_event: Some(11),
            }
        );
    }

    #[test]
    fn moving_away_closes_open_event() {
        let config = MotionConfig::default();
        let stopped = state(MotionStatus::Stopped, T, Some(4));
        assert_eq!(
            next_transition(&stopped, &record(T + 300_000, 40, true), &config),
            Transition::Enter {
                status: MotionStatus::Moving,
                close_event: Some(4),
            }
        );
        let moving = state(MotionStatus::Moving, T, None);
        assert_eq!(
            next_transition(&moving, &record(T + 1_000, 40, true), &config),
            Transition::Unchanged
        );
    }

    #[test]
    fn promotion_due_only_for_candidates() {
        let config = MotionConfig::default();
        let stopped = state(MotionStatus::Stopped, T, Some(1));
        assert_eq!(promotion_due(&stopped, T + 1_000_000, &config), None);
        let candidate = state(MotionStatus::StopCandidate, T, None);
        assert_eq!(promotion_due(&candidate, T + 119_000, &config), None);
        assert_eq!(
            promotion_due(&candidate, T + 121_000, &config),
            Some(StopKind::Stop)
        );
    }
}
