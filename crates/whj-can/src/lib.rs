//! # WHJ CAN Adapter Layer
//!
//! CANFD 硬件抽象层，提供统一的总线接口抽象。
//!
//! 上层（driver）只依赖 [`CanAdapter`] trait；后端的接口配置
//! （比特率、FD 模式、`ip link` 启动）属于系统工具职责，不在本层。

use std::time::Duration;
use thiserror::Error;

// 重新导出 whj-protocol 中的 WhjFrame
pub use whj_protocol::WhjFrame;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub mod socketcan;

#[cfg(all(target_os = "linux", feature = "socketcan"))]
pub use self::socketcan::SocketCanFdAdapter;

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "mock")]
pub use self::mock::{MockAdapter, MockBusHandle};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Bus off")]
    BusOff,
}

impl CanError {
    /// 是否为不可恢复的传输层错误
    ///
    /// 监听循环据此判断是退出（致命）还是继续重试（瞬时）。
    /// 发送缓冲满（ENOBUFS）等瞬时 IO 错误不算致命，
    /// 设备消失/网络下线才是。
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Timeout => false,
            CanError::BusOff => true,
            CanError::Io(e) => {
                // ENODEV(19)/ENETDOWN(100)：接口被移除或下线
                matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound
                        | std::io::ErrorKind::PermissionDenied
                        | std::io::ErrorKind::BrokenPipe
                        | std::io::ErrorKind::NotConnected
                ) || matches!(e.raw_os_error(), Some(19) | Some(100))
            },
            CanError::Device(e) => e.is_fatal(),
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    NotFound,
    NotUp,
    AccessDenied,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NotFound | CanDeviceErrorKind::NotUp | CanDeviceErrorKind::AccessDenied
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 统一的 CANFD 总线接口
///
/// `receive` 以适配器当前的读超时阻塞；超时返回 `CanError::Timeout`，
/// 属正常情况而非故障。
pub trait CanAdapter {
    fn send(&mut self, frame: WhjFrame) -> Result<(), CanError>;
    fn receive(&mut self) -> Result<WhjFrame, CanError>;
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
    fn receive_timeout(&mut self, timeout: Duration) -> Result<WhjFrame, CanError> {
        self.set_receive_timeout(timeout);
        self.receive()
    }
    fn try_receive(&mut self) -> Result<Option<WhjFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_not_fatal() {
        assert!(!CanError::Timeout.is_fatal());
        assert!(CanError::BusOff.is_fatal());
    }

    #[test]
    fn test_device_error_fatality() {
        let e = CanDeviceError::new(CanDeviceErrorKind::NotFound, "no can0");
        assert!(CanError::Device(e).is_fatal());

        let e = CanDeviceError::new(CanDeviceErrorKind::InvalidFrame, "bad dlc");
        assert!(!CanError::Device(e).is_fatal());
    }
}
