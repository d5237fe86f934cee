//! 数据模型
//!
//! 定义所有存储相关的数据模型：
//! - 定位模型：PositionRow, LastPositionRecord
//! - 发动机事件：NewEngineEvent, EngineEventRecord
//! - 批量写入单元：PositionBatch, PersistSummary
//! - 停车区间：NewStopEvent, StopEventRecord

use domain::{EngineEventKind, StopKind};
use std::collections::BTreeMap;

/// 定位明细行（car_positions）。
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub vehicle_id: i64,
    pub device_id: i64,
    pub driver_id: Option<i64>,
    /// 与上一定位点的距离（米），异常跳点为 `None`
    pub distance_from_prev: Option<f64>,
    pub bytes_received: Option<i64>,
    pub lat: f64,
    pub lng: f64,
    pub speed: i32,
    pub angle: i32,
    pub satellites: i32,
    pub ignition: Option<bool>,
    pub raw_io: BTreeMap<u8, i64>,
    pub recorded_at_ms: i64,
}

/// 最新定位快照（car_last_positions，每车一行）。
#[derive(Debug, Clone, PartialEq)]
pub struct LastPositionRecord {
    pub vehicle_id: i64,
    pub lat: f64,
    pub lng: f64,
    pub speed: i32,
    pub angle: i32,
    pub altitude: i32,
    pub satellites: i32,
    pub ignition: Option<bool>,
    pub movement: Option<bool>,
    pub odometer: Option<i64>,
    pub gsm_signal: Option<i64>,
    pub battery_voltage: Option<i64>,
    pub ext_voltage: Option<i64>,
    pub recorded_at_ms: i64,
}

/// 待写入的发动机事件。
#[derive(Debug, Clone, PartialEq)]
pub struct NewEngineEvent {
    pub vehicle_id: i64,
    pub kind: EngineEventKind,
    pub event_at_ms: i64,
    pub lat: f64,
    pub lng: f64,
}

/// 已持久化的发动机事件。
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEventRecord {
    pub id: i64,
    pub vehicle_id: i64,
    pub kind: EngineEventKind,
    pub event_at_ms: i64,
    pub lat: f64,
    pub lng: f64,
}

/// 一次原子写入：定位明细 + 发动机事件 + 最新定位。
#[derive(Debug, Clone)]
pub struct PositionBatch {
    pub vehicle_id: i64,
    pub positions: Vec<PositionRow>,
    pub engine_events: Vec<NewEngineEvent>,
    pub last_position: LastPositionRecord,
}

/// 原子写入结果（重复投递时去重后的实际写入数）。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistSummary {
    pub positions_written: usize,
    pub engine_events_written: usize,
}

/// 待开启的停车区间。
#[derive(Debug, Clone, PartialEq)]
pub struct NewStopEvent {
    pub vehicle_id: i64,
    pub kind: StopKind,
    pub start_ms: i64,
    pub lat: f64,
    pub lng: f64,
}

/// 停车区间记录（car_stop_events）。
#[derive(Debug, Clone, PartialEq)]
pub struct StopEventRecord {
    pub id: i64,
    pub vehicle_id: i64,
    pub kind: StopKind,
    pub start_ms: i64,
    /// 未关闭时为 `None`
    pub end_ms: Option<i64>,
    /// 时长（秒），未关闭时为 `None`
    pub duration_seconds: Option<i64>,
    pub lat: f64,
    pub lng: f64,
}

impl StopEventRecord {
    pub fn is_open(&self) -> bool {
        self.end_ms.is_none()
    }
}

/// 区间时长（秒，向下取整，不为负）。
pub fn duration_seconds(start_ms: i64, end_ms: i64) -> i64 {
    end_ms.saturating_sub(start_ms).max(0) / 1000
}
