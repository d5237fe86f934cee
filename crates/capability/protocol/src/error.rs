//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 帧内容不完整或结构非法（截断读取、不支持的 codec、声明长度超限）
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// IMEI 握手报文非法
    #[error("invalid imei: {0}")]
    InvalidImei(String),

    /// IMEI 未绑定车辆
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 空闲超时
    #[error("timeout: {0}")]
    Timeout(String),

    /// 设备绑定查询失败
    #[error("storage error: {0}")]
    Storage(String),
}
