pub mod data;
pub mod geo;
pub mod motion;

pub use data::{
    EngineEventKind, IoSnapshot, Record, StopKind, TelemetryBatch, VehicleBinding,
};
pub use geo::haversine_m;
pub use motion::{MotionState, MotionStatus};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
