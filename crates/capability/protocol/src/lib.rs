//! # 设备协议能力模块
//!
//! Teltonika 类 GPS 终端的接入协议：
//! - **Codec 8**：二进制帧 → 定位记录（纯函数，无 I/O）
//! - **拆帧**：TCP 字节流累积与完整帧切分、IMEI 握手解析
//! - **TCP Server**：每连接一个任务，握手、解码、投递队列、回写 ACK
//!
//! ## 数据流
//!
//! ```text
//! 设备 ──TCP──▶ TcpServer ──IMEI──▶ DeviceBindingStore
//!                  │
//!                  ├── FrameBuffer（拆帧）
//!                  ├── codec8::decode
//!                  ▼
//!              BatchQueue ──▶ 入库流水线 / 运动状态机
//! ```

pub mod codec8;
mod error;
pub mod framing;
mod tcp_server;

pub use codec8::{CODEC_8, Frame, decode};
pub use error::ProtocolError;
pub use framing::{FrameBuffer, parse_imei};
pub use tcp_server::{TcpServer, TcpServerConfig};
