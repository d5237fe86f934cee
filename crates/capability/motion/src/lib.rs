//! 运动状态机
//!
//! 按车辆维护 moving / stop_candidate / stopped / parking_candidate / parking 状态，
//! 并在确认停车、驻车时开启区间，离开时关闭区间。
//!
//! 两条驱动路径共用同一把车辆锁：
//! - 逐条记录迁移（入库流水线之后调用）
//! - 定时巡检：设备停止上报后，待确认状态按当前时间超时升级

mod machine;
mod tracker;

pub use machine::{MotionConfig, Transition, is_stationary, next_transition, promotion_due};
pub use tracker::MotionTracker;

use fleet_storage::StorageError;

/// 运动状态机错误（由队列重试）。
#[derive(Debug, thiserror::Error)]
pub enum MotionError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("vehicle lock poisoned")]
    Lock,
}

impl From<StorageError> for MotionError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
