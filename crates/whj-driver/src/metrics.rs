//! 总线指标（原子计数器）
//!
//! 监听路径只做 `fetch_add(Relaxed)`，不引入锁。

use std::sync::atomic::{AtomicU64, Ordering};

/// 总线计数器
#[derive(Debug, Default)]
pub struct BusMetrics {
    /// 收到的帧总数（含无法解析的帧）
    pub rx_frames_total: AtomicU64,
    /// 发出的帧总数
    pub tx_frames_total: AtomicU64,
    /// 接收超时次数（空闲总线上的正常情况）
    pub rx_timeouts: AtomicU64,
    /// 解析失败被丢弃的帧数
    pub decode_errors: AtomicU64,
    /// 未命中任何挂起请求的可关联应答（孤儿帧）
    pub orphan_frames: AtomicU64,
    /// 非请求遥测帧数
    pub telemetry_frames: AtomicU64,
    /// 请求级超时次数
    pub request_timeouts: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 一致性要求不高的展示用快照
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            orphan_frames: self.orphan_frames.load(Ordering::Relaxed),
            telemetry_frames: self.telemetry_frames.load(Ordering::Relaxed),
            request_timeouts: self.request_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照（展示/断言用）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub tx_frames_total: u64,
    pub rx_timeouts: u64,
    pub decode_errors: u64,
    pub orphan_frames: u64,
    pub telemetry_frames: u64,
    pub request_timeouts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = BusMetrics::new();
        metrics.rx_frames_total.fetch_add(3, Ordering::Relaxed);
        metrics.orphan_frames.fetch_add(1, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_frames_total, 3);
        assert_eq!(snapshot.orphan_frames, 1);
        assert_eq!(snapshot.decode_errors, 0);
    }
}
