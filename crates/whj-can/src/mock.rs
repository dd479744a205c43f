//! Mock CANFD 总线（无硬件依赖）
//!
//! 供 driver/sdk 的测试使用：脚本化应答、发送帧捕获、
//! 静默（模拟超时）与传输层丢失注入。

use crate::{CanAdapter, CanError, WhjFrame};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

type Responder = Box<dyn FnMut(&WhjFrame) -> Vec<WhjFrame> + Send>;

struct Shared {
    /// 待投递给主机的帧（电机 → 主机）
    rx_queue: Mutex<VecDeque<WhjFrame>>,
    /// 主机已发送的帧（主机 → 电机）
    sent: Mutex<Vec<WhjFrame>>,
    /// 脚本化应答器：对每个发送帧生成应答帧
    responder: Mutex<Option<Responder>>,
    /// 静默模式：吞掉发送帧、不产生应答（模拟超时）
    silent: AtomicBool,
    /// 传输层丢失：send/receive 返回致命错误
    transport_lost: AtomicBool,
}

/// Mock 适配器（移交给 driver 的 IO 线程）
pub struct MockAdapter {
    shared: Arc<Shared>,
    read_timeout: Duration,
    epoch: Instant,
}

/// 测试侧句柄（与 [`MockAdapter`] 共享同一条总线）
#[derive(Clone)]
pub struct MockBusHandle {
    shared: Arc<Shared>,
}

impl MockAdapter {
    /// 创建一对 (适配器, 测试句柄)
    pub fn new() -> (Self, MockBusHandle) {
        let shared = Arc::new(Shared {
            rx_queue: Mutex::new(VecDeque::new()),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            silent: AtomicBool::new(false),
            transport_lost: AtomicBool::new(false),
        });
        (
            Self {
                shared: shared.clone(),
                read_timeout: Duration::from_millis(2),
                epoch: Instant::now(),
            },
            MockBusHandle { shared },
        )
    }
}

impl CanAdapter for MockAdapter {
    fn send(&mut self, frame: WhjFrame) -> Result<(), CanError> {
        if self.shared.transport_lost.load(Ordering::Acquire) {
            return Err(CanError::BusOff);
        }
        self.shared.sent.lock().push(frame);

        if self.shared.silent.load(Ordering::Acquire) {
            return Ok(());
        }
        if let Some(responder) = self.shared.responder.lock().as_mut() {
            let replies = responder(&frame);
            let mut rx_queue = self.shared.rx_queue.lock();
            for reply in replies {
                rx_queue.push_back(reply);
            }
        }
        Ok(())
    }

    fn receive(&mut self) -> Result<WhjFrame, CanError> {
        let deadline = Instant::now() + self.read_timeout;
        loop {
            if self.shared.transport_lost.load(Ordering::Acquire) {
                return Err(CanError::BusOff);
            }
            if let Some(frame) = self.shared.rx_queue.lock().pop_front() {
                let timestamp_us = self.epoch.elapsed().as_micros() as u64;
                return Ok(frame.with_timestamp(timestamp_us));
            }
            if Instant::now() >= deadline {
                return Err(CanError::Timeout);
            }
            std::thread::sleep(Duration::from_micros(200));
        }
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

impl MockBusHandle {
    /// 注入一帧（电机 → 主机方向）
    pub fn inject(&self, frame: WhjFrame) {
        self.shared.rx_queue.lock().push_back(frame);
    }

    /// 设置脚本化应答器
    pub fn set_responder(&self, responder: impl FnMut(&WhjFrame) -> Vec<WhjFrame> + Send + 'static) {
        *self.shared.responder.lock() = Some(Box::new(responder));
    }

    /// 静默模式：发送帧被吞掉、不产生任何应答
    pub fn set_silent(&self, silent: bool) {
        self.shared.silent.store(silent, Ordering::Release);
    }

    /// 模拟传输层丢失（后续 send/receive 均致命失败）
    pub fn set_transport_lost(&self, lost: bool) {
        self.shared.transport_lost.store(lost, Ordering::Release);
    }

    /// 主机已发送帧的快照
    pub fn sent_frames(&self) -> Vec<WhjFrame> {
        self.shared.sent.lock().clone()
    }

    /// 取走并清空已发送帧
    pub fn take_sent(&self) -> Vec<WhjFrame> {
        std::mem::take(&mut *self.shared.sent.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_responder_roundtrip() {
        let (mut adapter, handle) = MockAdapter::new();
        handle.set_responder(|frame| vec![WhjFrame::new(0x100 | (frame.id & 0xFF), &[0xAA])]);

        adapter.send(WhjFrame::new(0x001, &[0x01])).unwrap();
        let reply = adapter.receive().unwrap();
        assert_eq!(reply.id, 0x101);
        assert_eq!(handle.sent_frames().len(), 1);
    }

    #[test]
    fn test_silent_mode_times_out() {
        let (mut adapter, handle) = MockAdapter::new();
        handle.set_responder(|_| vec![WhjFrame::new(0x101, &[0x00])]);
        handle.set_silent(true);

        adapter.send(WhjFrame::new(0x001, &[0x01])).unwrap();
        adapter.set_receive_timeout(Duration::from_millis(5));
        assert!(matches!(adapter.receive(), Err(CanError::Timeout)));
        // 静默只吞应答，发送帧仍被记录
        assert_eq!(handle.sent_frames().len(), 1);
    }

    #[test]
    fn test_transport_lost_is_fatal() {
        let (mut adapter, handle) = MockAdapter::new();
        handle.set_transport_lost(true);
        let err = adapter.send(WhjFrame::new(0x001, &[])).unwrap_err();
        assert!(err.is_fatal());
    }
}
