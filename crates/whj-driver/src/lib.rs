//! # WHJ Driver
//!
//! WHJ 伺服总线的 IO 管理与指令调度层。
//!
//! ## 架构
//!
//! ```text
//! 调用方线程                      IO 线程
//! WhjBus::get/set/...   ──帧──►  io_loop (发送 + 接收 + 解析)
//!        ▲                          │
//!        └── 挂起请求表 (电机,序列号) ◄┘
//! ```
//!
//! 指令路径对调用方同步：发帧后阻塞等待匹配应答或超时。
//! 接收路径独立运行，解析失败与孤儿帧只计数丢弃，永不阻塞。

pub mod bus;
mod context;
pub mod error;
pub mod hooks;
mod logging;
pub mod metrics;
mod pending;
pub mod pipeline;
pub mod session;

pub use bus::{ParamReading, WhjBus};
pub use error::DriverError;
pub use hooks::{FrameCallback, HookManager};
pub use metrics::{BusMetrics, MetricsSnapshot};
pub use pipeline::PipelineConfig;
pub use session::{RetryPolicy, SessionState};
