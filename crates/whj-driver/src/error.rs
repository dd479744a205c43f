//! 驱动层错误类型定义

use thiserror::Error;
use whj_can::CanError;
use whj_protocol::{MotorId, ProtocolError};

/// 驱动层错误类型
///
/// 按调用级错误（返回给调用方，不影响会话/调度器存活）与
/// 传输级错误（总线丢失，致命）区分。
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 参数名不在目录中
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    /// 参数为只读
    #[error("Parameter {0} is read-only")]
    ReadOnlyParameter(&'static str),

    /// 工程值经标度换算后超出寄存器类型范围
    #[error("Value {value} out of range for parameter {name}")]
    OutOfRange { name: &'static str, value: f64 },

    /// 会话不在 Online 状态
    #[error("Motor {0} is offline")]
    MotorOffline(MotorId),

    /// 会话已在 Online 状态（online 仅允许从 Offline 发起）
    #[error("Motor {0} is already online")]
    AlreadyOnline(MotorId),

    /// 同一电机已有未决请求
    #[error("Motor {0} has a request in flight")]
    Busy(MotorId),

    /// 截止时间内未收到匹配应答
    #[error("Request timeout")]
    Timeout,

    /// 电机拒绝指令（应答状态字节非零）
    #[error("Command rejected by motor (status 0x{0:02X})")]
    Rejected(u8),

    /// 收到的应答种类与请求不匹配
    #[error("Unexpected feedback for request")]
    UnexpectedFeedback,

    /// 日志作用域已打开
    #[error("A logging scope is already open")]
    AlreadyLogging,

    /// 日志作用域未打开
    #[error("No logging scope is open")]
    NotLogging,

    /// 日志写入失败
    #[error("Log write failed: {0}")]
    Logging(String),

    /// 底层传输已丢失（致命，由上层决定进程退出）
    #[error("Transport lost")]
    TransportLost,

    /// IO 线程命令通道已关闭
    #[error("Command channel closed")]
    ChannelClosed,
}

impl DriverError {
    /// 日志 outcome 列的错误种类名
    pub fn outcome_str(&self) -> &'static str {
        match self {
            DriverError::Can(_) => "can-error",
            DriverError::Protocol(_) => "protocol-error",
            DriverError::UnknownParameter(_) => "unknown-parameter",
            DriverError::ReadOnlyParameter(_) => "read-only-parameter",
            DriverError::OutOfRange { .. } => "out-of-range",
            DriverError::MotorOffline(_) => "motor-offline",
            DriverError::AlreadyOnline(_) => "already-online",
            DriverError::Busy(_) => "busy",
            DriverError::Timeout => "timeout",
            DriverError::Rejected(_) => "rejected",
            DriverError::UnexpectedFeedback => "unexpected-feedback",
            DriverError::AlreadyLogging => "already-logging",
            DriverError::NotLogging => "not-logging",
            DriverError::Logging(_) => "log-write-failed",
            DriverError::TransportLost => "transport-lost",
            DriverError::ChannelClosed => "channel-closed",
        }
    }
}
