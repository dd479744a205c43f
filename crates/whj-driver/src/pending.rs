//! 挂起请求表
//!
//! 以 (电机, 序列号) 为键，把异步到达的应答投递给同步等待的调用方。
//! 每项使用容量 1 的 crossbeam 通道做一次性投递：调用方超时后移除
//! 自己的表项，迟到的应答按孤儿帧计数。

use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;
use std::collections::HashMap;
use whj_protocol::{Feedback, MotorId};

pub(crate) type PendingKey = (MotorId, u8);

#[derive(Default)]
pub(crate) struct PendingTable {
    inner: Mutex<HashMap<PendingKey, Sender<Feedback>>>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 注册一个挂起请求，返回等待端
    ///
    /// 单飞约束由会话层保证，同键重复注册视为逻辑错误，旧表项被替换。
    pub(crate) fn register(&self, key: PendingKey) -> Receiver<Feedback> {
        let (tx, rx) = bounded(1);
        if self.inner.lock().insert(key, tx).is_some() {
            tracing::warn!(motor = %key.0, seq = key.1, "Replaced stale pending entry");
        }
        rx
    }

    /// 调用方放弃等待（超时/发送失败），移除表项
    pub(crate) fn remove(&self, key: &PendingKey) {
        self.inner.lock().remove(key);
    }

    /// 投递应答；返回是否命中挂起请求
    pub(crate) fn complete(&self, key: &PendingKey, feedback: Feedback) -> bool {
        let Some(tx) = self.inner.lock().remove(key) else {
            return false;
        };
        // 接收端若已在超时路径上被丢弃，投递失败按未命中处理
        tx.send(feedback).is_ok()
    }

    /// 丢弃所有表项（传输丢失/停机），等待方收到 Disconnected
    pub(crate) fn drain(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.len();
        inner.clear();
        count
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
