//! 存储接口 Trait 定义
//!
//! 定义接入链路依赖的全部异步存储接口：
//! - DeviceBindingStore：IMEI → 车辆绑定
//! - DriverAssignmentStore：车辆当前司机
//! - PositionStore：定位明细、最新定位、发动机事件
//! - StopEventStore：停车/驻车区间
//! - MotionStateStore：单车运动状态缓存
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    EngineEventRecord, LastPositionRecord, NewStopEvent, PersistSummary, PositionBatch,
    PositionRow, StopEventRecord,
};
use async_trait::async_trait;
use domain::{MotionState, VehicleBinding};

/// 设备绑定接口
///
/// 仅返回当前有效（未结束）的车辆-设备绑定。
#[async_trait]
pub trait DeviceBindingStore: Send + Sync {
    /// 根据 IMEI 查找当前绑定的车辆与设备
    async fn resolve_imei(&self, imei: &str) -> Result<Option<VehicleBinding>, StorageError>;
}

/// 司机分配接口
#[async_trait]
pub trait DriverAssignmentStore: Send + Sync {
    /// 查找车辆当前分配的司机（无结束时间的分配）
    async fn current_driver(&self, vehicle_id: i64) -> Result<Option<i64>, StorageError>;
}

/// 定位存储接口
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// 读取车辆最新定位
    async fn last_position(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<LastPositionRecord>, StorageError>;

    /// 读取车辆最近一条发动机事件
    async fn last_engine_event(
        &self,
        vehicle_id: i64,
    ) -> Result<Option<EngineEventRecord>, StorageError>;

    /// 原子写入定位明细、发动机事件与最新定位
    ///
    /// 同一时间点的重复定位/事件被忽略；最新定位只会向前推进。
    async fn persist_batch(&self, batch: &PositionBatch) -> Result<PersistSummary, StorageError>;

    /// 按时间升序列出车辆定位明细
    async fn list_positions(&self, vehicle_id: i64) -> Result<Vec<PositionRow>, StorageError>;

    /// 按时间升序列出 `(after_ms, until_ms]` 区间内的定位明细
    async fn list_positions_between(
        &self,
        vehicle_id: i64,
        after_ms: i64,
        until_ms: i64,
    ) -> Result<Vec<PositionRow>, StorageError>;

    /// 按时间升序列出车辆发动机事件
    async fn list_engine_events(
        &self,
        vehicle_id: i64,
    ) -> Result<Vec<EngineEventRecord>, StorageError>;
}

/// 停车区间存储接口
#[async_trait]
pub trait StopEventStore: Send + Sync {
    /// 列出车辆所有未关闭区间
    async fn list_open(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError>;

    /// 开启新区间，返回区间 ID
    async fn open_event(&self, event: &NewStopEvent) -> Result<i64, StorageError>;

    /// 关闭区间并计算时长；区间不存在或已关闭时返回 `None`
    async fn close_event(
        &self,
        event_id: i64,
        end_ms: i64,
    ) -> Result<Option<StopEventRecord>, StorageError>;

    /// 按开始时间升序列出车辆全部区间
    async fn list_events(&self, vehicle_id: i64) -> Result<Vec<StopEventRecord>, StorageError>;
}

/// 运动状态缓存接口（无过期时间）
#[async_trait]
pub trait MotionStateStore: Send + Sync {
    /// 读取车辆运动状态；首次上报前为空
    async fn get_state(&self, vehicle_id: i64) -> Result<Option<MotionState>, StorageError>;

    /// 覆盖写入车辆运动状态
    async fn set_state(&self, vehicle_id: i64, state: &MotionState) -> Result<(), StorageError>;

    /// 列出所有存在缓存状态的车辆
    async fn list_vehicle_ids(&self) -> Result<Vec<i64>, StorageError>;
}
