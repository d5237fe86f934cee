//! # PostgreSQL 存储实现模块
//!
//! 生产环境的关系型存储实现。
//!
//! ## 包含的实现
//!
//! - **DeviceBindingStore** (`device_binding.rs`)：IMEI → 车辆绑定查询
//! - **DriverAssignmentStore** (`driver.rs`)：车辆当前司机查询
//! - **PositionStore** (`position.rs`)：定位明细、最新定位、发动机事件的原子写入
//! - **StopEventStore** (`stop_event.rs`)：停车/驻车区间的开启与关闭
//!
//! ## 数据库模式要求
//!
//! 表结构见仓库根目录 `migrations/0001_tracking.sql`：
//! - `devices` / `car_devices`：设备与车辆绑定（`end_at is null` 为当前绑定）
//! - `car_drivers`：司机分配
//! - `car_positions`：定位明细，`(car_id, recorded_at)` 唯一
//! - `car_last_positions`：每车一行最新定位
//! - `car_engine_events`：发动机事件，`(car_id, event_at)` 唯一
//! - `car_stop_events`：停车区间
//!
//! ## 时间戳约定
//!
//! 领域层统一使用毫秒时间戳：
//! - 写入：`to_timestamp($n / 1000.0)`
//! - 读取：`(extract(epoch from col) * 1000)::bigint`
//!
//! ## 幂等写入
//!
//! 队列为至少一次投递，重复批次通过唯一约束 + `on conflict do nothing` 去重，
//! 最新定位仅在时间不回退时覆盖。

pub mod device_binding;
pub mod driver;
pub mod position;
pub mod stop_event;

pub use device_binding::*;
pub use driver::*;
pub use position::*;
pub use stop_event::*;
