//! 单条记录合理性校验

use domain::Record;

/// 记录被丢弃的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordRejection {
    /// 纬度或经度恰为 0（无定位）
    ZeroCoordinate,
    /// 点火状态未知（IO 239 缺失）
    IgnitionUnknown,
    /// 时间早于配置的最早时间
    BeforeEpochFloor,
    /// 时间超出当前时间加容许值
    InFuture,
}

impl RecordRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZeroCoordinate => "zero_coordinate",
            Self::IgnitionUnknown => "ignition_unknown",
            Self::BeforeEpochFloor => "before_epoch_floor",
            Self::InFuture => "in_future",
        }
    }
}

/// 校验单条记录。
pub fn validate_record(
    record: &Record,
    epoch_floor_ms: i64,
    max_future_ms: i64,
    now_ms: i64,
) -> Result<(), RecordRejection> {
    if record.lat == 0.0 || record.lng == 0.0 {
        return Err(RecordRejection::ZeroCoordinate);
    }
    if record.io.ignition.is_none() {
        return Err(RecordRejection::IgnitionUnknown);
    }
    if record.ts_ms < epoch_floor_ms {
        return Err(RecordRejection::BeforeEpochFloor);
    }
    if record.ts_ms > now_ms.saturating_add(max_future_ms) {
        return Err(RecordRejection::InFuture);
    }
    Ok(())
}
