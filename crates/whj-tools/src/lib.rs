//! # WHJ Tools
//!
//! 会话日志格式、时间戳与流量统计，driver 与 CLI 共用。

pub mod logging;
pub mod statistics;
pub mod timestamp;

pub use logging::{LOG_HEADER, LogRecord, LogSummary, Outcome, SessionLog};
pub use statistics::{MotorTraffic, TrafficStats};
pub use timestamp::{SessionClock, Timestamp};
