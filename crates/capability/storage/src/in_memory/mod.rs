//! 内存存储实现模块
//!
//! 用于本地开发、单元测试与端到端测试，无需 Postgres/Redis。
//!
//! 包含以下实现：
//! - DeviceBindingStore: InMemoryDeviceBindingStore
//! - DriverAssignmentStore: InMemoryDriverAssignmentStore
//! - PositionStore: InMemoryPositionStore
//! - StopEventStore: InMemoryStopEventStore
//! - MotionStateStore: InMemoryMotionStateStore

pub mod device_binding;
pub mod driver;
pub mod motion_state;
pub mod position;
pub mod stop_event;

pub use device_binding::*;
pub use driver::*;
pub use motion_state::*;
pub use position::*;
pub use stop_event::*;
