use crate::data::{Record, StopKind};
use serde::{Deserialize, Serialize};

/// 车辆运动状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MotionStatus {
    Moving,
    StopCandidate,
    Stopped,
    ParkingCandidate,
    Parking,
}

impl MotionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Moving => "moving",
            Self::StopCandidate => "stop_candidate",
            Self::Stopped => "stopped",
            Self::ParkingCandidate => "parking_candidate",
            Self::Parking => "parking",
        }
    }

    /// 是否为待确认状态（等待超时升级）。
    pub fn is_candidate(&self) -> bool {
        matches!(self, Self::StopCandidate | Self::ParkingCandidate)
    }

    /// 待确认状态升级后对应的停车区间类型。
    pub fn promotes_to(&self) -> Option<StopKind> {
        match self {
            Self::StopCandidate => Some(StopKind::Stop),
            Self::ParkingCandidate => Some(StopKind::Parking),
            _ => None,
        }
    }

    /// 停车区间类型对应的确认状态。
    pub fn confirmed(kind: StopKind) -> Self {
        match kind {
            StopKind::Stop => Self::Stopped,
            StopKind::Parking => Self::Parking,
        }
    }
}

/// 单车缓存的运动状态。
///
/// 不变量：仅当 `status` 为 `Stopped`/`Parking` 时 `open_event_id` 非空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionState {
    pub status: MotionStatus,
    /// 当前状态开始时间（毫秒）
    pub since_ms: i64,
    /// 锚点纬度
    pub lat: f64,
    /// 锚点经度
    pub lng: f64,
    pub open_event_id: Option<i64>,
    /// 最近一次应用的记录时间（毫秒），早于等于此时间的记录被忽略
    #[serde(default)]
    pub last_record_ms: i64,
}

impl MotionState {
    /// 以首条记录初始化为 `Moving`，首条记录本身仍需经过状态迁移。
    pub fn seed(record: &Record) -> Self {
        Self {
            last_record_ms: i64::MIN,
            ..Self::anchored(MotionStatus::Moving, record)
        }
    }

    /// 以记录为锚点进入新状态（不持有区间事件）。
    pub fn anchored(status: MotionStatus, record: &Record) -> Self {
        Self {
            status,
            since_ms: record.ts_ms,
            lat: record.lat,
            lng: record.lng,
            open_event_id: None,
            last_record_ms: record.ts_ms,
        }
    }
}
