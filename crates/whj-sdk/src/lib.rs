//! # WHJ SDK
//!
//! WHJ 伺服执行器 CANFD 总线 SDK 的统一入口。
//!
//! ## 分层
//!
//! - [`protocol`]: 寄存器目录与帧编解码（无硬件依赖）
//! - [`can`]: CANFD 适配层（SocketCAN / mock）
//! - [`driver`]: IO 线程、会话状态机与指令调度
//! - [`tools`]: 会话日志、时间戳与流量统计
//!
//! ## 快速上手
//!
//! ```no_run
//! use whj_sdk::driver::WhjBus;
//! use whj_sdk::protocol::MotorId;
//!
//! # #[cfg(all(target_os = "linux", feature = "socketcan"))]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = whj_sdk::can::SocketCanFdAdapter::new("can0")?;
//! let bus = WhjBus::new(adapter, None)?;
//!
//! let motor = MotorId::new(1)?;
//! bus.online(motor)?;
//! let reading = bus.get(motor, "CUR_POSITION")?;
//! println!("position = {} deg", reading.engineering);
//! # Ok(())
//! # }
//! # #[cfg(not(all(target_os = "linux", feature = "socketcan")))]
//! # fn main() {}
//! ```

pub use whj_can as can;
pub use whj_driver as driver;
pub use whj_protocol as protocol;
pub use whj_tools as tools;

// 顶层便捷导出
pub use whj_driver::{DriverError, ParamReading, PipelineConfig, RetryPolicy, SessionState, WhjBus};
pub use whj_protocol::{Command, Feedback, MotorId, Parameter, StateReport, WhjFrame};
