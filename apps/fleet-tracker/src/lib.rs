//! 设备接入服务装配
//!
//! TCP 会话 → 工作队列 → 入库流水线 → 运动状态机，外加探针路由与超时巡检。

pub mod handler;
pub mod http;
pub mod settings;

pub use handler::PipelineHandler;
pub use http::create_router;
