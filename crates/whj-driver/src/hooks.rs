//! 帧钩子
//!
//! 在 IO 线程收发帧时触发注册的回调，供总线监视等旁路消费使用。
//! 回调在 IO 线程内同步执行，必须保持非阻塞（建议 `try_send` 转发）。

use parking_lot::RwLock;
use std::sync::Arc;
use whj_protocol::WhjFrame;

/// 帧回调接口
pub trait FrameCallback: Send + Sync {
    /// 收到帧时调用（任何可解析性之前）
    fn on_frame_received(&self, frame: &WhjFrame);

    /// 帧成功写入总线后调用
    ///
    /// 只在发送成功后触发，避免记录未上线的"幽灵帧"。
    fn on_frame_sent(&self, frame: &WhjFrame) {
        let _ = frame;
    }
}

/// 钩子管理器
#[derive(Default)]
pub struct HookManager {
    callbacks: RwLock<Vec<Arc<dyn FrameCallback>>>,
}

impl HookManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_callback(&self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.write().push(callback);
    }

    pub fn clear(&self) {
        self.callbacks.write().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.read().is_empty()
    }

    pub(crate) fn trigger_received(&self, frame: &WhjFrame) {
        for callback in self.callbacks.read().iter() {
            callback.on_frame_received(frame);
        }
    }

    pub(crate) fn trigger_sent(&self, frame: &WhjFrame) {
        for callback in self.callbacks.read().iter() {
            callback.on_frame_sent(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct Counter {
        received: AtomicU64,
        sent: AtomicU64,
    }

    impl FrameCallback for Counter {
        fn on_frame_received(&self, _frame: &WhjFrame) {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
        fn on_frame_sent(&self, _frame: &WhjFrame) {
            self.sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_trigger_all_registered_callbacks() {
        let hooks = HookManager::new();
        let counter = Arc::new(Counter {
            received: AtomicU64::new(0),
            sent: AtomicU64::new(0),
        });
        hooks.add_callback(counter.clone());

        let frame = WhjFrame::new(0x101, &[0x00]);
        hooks.trigger_received(&frame);
        hooks.trigger_received(&frame);
        hooks.trigger_sent(&frame);

        assert_eq!(counter.received.load(Ordering::Relaxed), 2);
        assert_eq!(counter.sent.load(Ordering::Relaxed), 1);

        hooks.clear();
        assert!(hooks.is_empty());
        hooks.trigger_received(&frame);
        assert_eq!(counter.received.load(Ordering::Relaxed), 2);
    }
}
