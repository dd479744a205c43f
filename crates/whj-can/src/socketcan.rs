//! SocketCAN CANFD 适配器实现
//!
//! 基于 Linux SocketCAN 子系统的 CANFD 后端。
//!
//! ## 依赖
//!
//! - `socketcan` crate (版本 3.5)
//! - 内核 CAN FD 支持，接口已通过系统工具配置：
//!   `sudo ip link set can0 up type can bitrate 1000000 dbitrate 5000000 fd on`
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**：SocketCAN 是 Linux 内核特性
//! - **接口配置**：比特率/FD 模式由 `ip link` 完成，不在应用层设置

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, WhjFrame};
use socketcan::{
    BlockingCan, CanAnyFrame, CanFdFrame, CanFdSocket, EmbeddedFrame, Frame, Socket, StandardId,
};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

/// 默认读超时，与 driver 的 `PipelineConfig::receive_timeout_ms` 一致，
/// 保证 IO 循环能及时察觉退出信号。
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2);

/// SocketCAN CANFD 适配器
///
/// # 示例
///
/// ```no_run
/// use whj_can::{CanAdapter, SocketCanFdAdapter};
/// use whj_protocol::WhjFrame;
///
/// let mut adapter = SocketCanFdAdapter::new("can0").unwrap();
/// adapter.send(WhjFrame::new(0x001, &[0x01, 0x14, 0x00])).unwrap();
/// let frame = adapter.receive().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanFdAdapter {
    socket: CanFdSocket,
    interface: String,
    read_timeout: Duration,
}

impl SocketCanFdAdapter {
    /// 打开 CANFD 接口
    ///
    /// 接口必须已存在且处于 UP 状态；否则返回带修复提示的设备错误。
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanFdSocket::open(&interface).map_err(|e| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::NotFound,
                format!(
                    "Failed to open CANFD interface '{}': {}. Bring it up first:\n  sudo ip link set up {} type can bitrate 1000000 dbitrate 5000000 fd on",
                    interface, e, interface
                ),
            ))
        })?;

        // 关闭 loopback，防止 TX 帧回环到 RX。回环帧与真实应答无法区分，
        // 会被监听器当作指令回读计数。
        let loopback_enabled: libc::c_int = 0;
        let loopback_result = unsafe {
            libc::setsockopt(
                socket.as_raw_fd(),
                libc::SOL_CAN_RAW,
                libc::CAN_RAW_LOOPBACK,
                &loopback_enabled as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if loopback_result < 0 {
            warn!(
                "Failed to disable CAN_RAW_LOOPBACK on '{}': {}",
                interface,
                std::io::Error::last_os_error()
            );
        }

        socket
            .set_read_timeout(DEFAULT_READ_TIMEOUT)
            .map_err(CanError::Io)?;

        Ok(Self {
            socket,
            interface,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// 接口名称
    pub fn interface(&self) -> &str {
        &self.interface
    }

    fn userspace_timestamp_us() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0)
    }
}

impl CanAdapter for SocketCanFdAdapter {
    fn send(&mut self, frame: WhjFrame) -> Result<(), CanError> {
        let id = StandardId::new(frame.id).ok_or_else(|| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::InvalidFrame,
                format!("Invalid standard CAN ID 0x{:X}", frame.id),
            ))
        })?;
        let fd_frame = CanFdFrame::new(id, frame.data_slice()).ok_or_else(|| {
            CanError::Device(CanDeviceError::new(
                CanDeviceErrorKind::InvalidFrame,
                format!("Invalid CANFD payload length {}", frame.len),
            ))
        })?;

        let any_frame: CanAnyFrame = fd_frame.into();
        self.socket.transmit(&any_frame).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "SocketCAN transmit error on '{}': {}",
                self.interface, e
            )))
        })?;

        trace!("Sent CANFD frame: ID=0x{:03X}, len={}", frame.id, frame.len);
        Ok(())
    }

    /// 接收帧（阻塞到有效数据帧或超时）
    ///
    /// 远程帧与错误帧在此过滤，不上抛给监听器。
    fn receive(&mut self) -> Result<WhjFrame, CanError> {
        loop {
            let any_frame = match self.socket.read_frame() {
                Ok(frame) => frame,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) =>
                {
                    return Err(CanError::Timeout);
                },
                Err(e) => return Err(CanError::Io(e)),
            };

            let (raw_id, data): (u32, &[u8]) = match &any_frame {
                CanAnyFrame::Fd(fd) => (fd.raw_id(), fd.data()),
                CanAnyFrame::Normal(classic) => (classic.raw_id(), classic.data()),
                CanAnyFrame::Remote(_) => {
                    trace!("Dropping remote frame");
                    continue;
                },
                CanAnyFrame::Error(error_frame) => {
                    warn!("Dropping error frame: {:?}", error_frame);
                    continue;
                },
            };

            let frame = WhjFrame::new((raw_id & 0x7FF) as u16, data)
                .with_timestamp(Self::userspace_timestamp_us());
            trace!("Received CANFD frame: ID=0x{:03X}, len={}", frame.id, frame.len);
            return Ok(frame);
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        // SO_RCVTIMEO 为 0 表示永久阻塞，最小生效值为 1µs
        let effective = timeout.max(Duration::from_micros(1));
        if effective != self.read_timeout {
            if let Err(e) = self.socket.set_read_timeout(effective) {
                warn!("Failed to set read timeout on '{}': {}", self.interface, e);
                return;
            }
            self.read_timeout = effective;
        }
    }
}
