//! 时间戳工具
//!
//! 日志记录同时携带单调时间与墙钟时间：单调时间用于排序与时延分析
//! （不受 NTP 回拨影响），墙钟时间用于与外部系统对时。

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// 单条记录的时间戳
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 自会话时钟创建起的单调微秒数
    pub monotonic_us: u64,
    /// Unix 纪元起的墙钟微秒数
    pub wall_us: u64,
}

/// 会话时钟
///
/// 墙钟只在创建时采样一次，之后由单调时钟推进，
/// 保证同一会话内墙钟时间戳也单调。
#[derive(Debug, Clone)]
pub struct SessionClock {
    start: Instant,
    wall_start_us: u64,
}

impl SessionClock {
    pub fn new() -> Self {
        let wall_start_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            start: Instant::now(),
            wall_start_us,
        }
    }

    /// 自创建起的单调微秒数
    pub fn monotonic_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// 当前时间戳（单调 + 墙钟）
    pub fn stamp(&self) -> Timestamp {
        let monotonic_us = self.monotonic_us();
        Timestamp {
            monotonic_us,
            wall_us: self.wall_start_us + monotonic_us,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}
