//! 总线调度器（对外 API）
//!
//! `WhjBus` 封装 IO 线程、每电机会话与请求关联：
//!
//! - 会话表按电机惰性创建，运行期间不销毁
//! - 同一电机同一时刻至多一个未决请求（Busy 拒绝，不排队）
//! - 不同电机的请求可并发在途，线上发送顺序由物理仲裁决定
//! - 日志作用域打开时，每条已派发指令的终结结果按完成序追加

use crate::context::BusContext;
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::logging::LogScope;
use crate::metrics::MetricsSnapshot;
use crate::pipeline::{PipelineConfig, io_loop};
use crate::session::{MotorSession, RetryPolicy, SessionState};
use crossbeam_channel::{RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, warn};
use whj_can::{CanAdapter, CanError};
use whj_protocol::{
    Command, Feedback, FrameBuffer, MotorId, Parameter, ResponseErrorKind, ServoTelemetry,
    StateReport, registry,
};
use whj_tools::{LogRecord, LogSummary, Outcome, SessionClock, TrafficStats};

/// 读取结果：原始值与工程值成对返回
#[derive(Debug, Clone, Copy)]
pub struct ParamReading {
    pub parameter: &'static Parameter,
    pub raw: i64,
    pub engineering: f64,
}

/// 请求等待结果（内部）
enum Wait {
    Completed(Feedback),
    TimedOut,
    Lost,
}

/// WHJ 伺服总线调度器
pub struct WhjBus {
    /// 命令发送通道（调用方线程 → IO 线程）
    ///
    /// Drop 时必须在 join IO 线程之前**提前关闭通道**，
    /// 否则 `io_loop` 可能收不到 `Disconnected` 而卡住退出。
    cmd_tx: ManuallyDrop<Sender<whj_protocol::WhjFrame>>,
    /// 共享上下文（挂起表/遥测/指标/钩子）
    ctx: Arc<BusContext>,
    /// 会话表（MotorId → 会话槽位）
    sessions: Mutex<HashMap<MotorId, MotorSession>>,
    /// 超时/重试策略
    policy: RetryPolicy,
    /// 会话时钟（日志时间戳）
    clock: SessionClock,
    /// 日志作用域
    log: LogScope,
    /// 流量统计
    traffic: Mutex<TrafficStats>,
    /// IO 线程句柄（Drop 时 join）
    io_thread: Option<JoinHandle<()>>,
    /// 停机信号
    is_running: Arc<AtomicBool>,
}

impl WhjBus {
    /// 创建总线调度器并启动 IO 线程
    ///
    /// # 参数
    /// - `can`: CAN 适配器（移入 IO 线程）
    /// - `config`: Pipeline 配置（可选）
    pub fn new(
        can: impl CanAdapter + Send + 'static,
        config: Option<PipelineConfig>,
    ) -> Result<Self, CanError> {
        // 有界队列，容量 10：指令路径是低频人机交互，积压即异常
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(10);

        let ctx = Arc::new(BusContext::new());
        let is_running = Arc::new(AtomicBool::new(true));

        let ctx_clone = ctx.clone();
        let is_running_clone = is_running.clone();
        let io_thread = spawn(move || {
            io_loop(
                can,
                cmd_rx,
                ctx_clone,
                config.unwrap_or_default(),
                is_running_clone,
            );
        });

        Ok(Self {
            cmd_tx: ManuallyDrop::new(cmd_tx),
            ctx,
            sessions: Mutex::new(HashMap::new()),
            policy: RetryPolicy::default(),
            clock: SessionClock::new(),
            log: LogScope::new(),
            traffic: Mutex::new(TrafficStats::new()),
            io_thread: Some(io_thread),
            is_running,
        })
    }

    /// 替换超时/重试策略（构建期调用）
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// 当前策略
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    // ========================================================================
    // 指令表面
    // ========================================================================

    /// 上线握手
    ///
    /// 仅允许从 Offline 发起；Ack 在握手截止时间内到达则进入 Online，
    /// 否则回到 Offline 并返回 Timeout。
    pub fn online(&self, motor: MotorId) -> Result<(), DriverError> {
        let seq = self.with_session(motor, |s| s.reserve_online(motor))?;
        let command = Command::Online { motor };

        let wait = self.issue(motor, seq, &command, self.policy.handshake_timeout)?;
        let result = match wait {
            Wait::Completed(Feedback::Ack { .. }) => {
                self.with_session(motor, |s| s.complete_handshake(true));
                Ok(())
            },
            Wait::Completed(Feedback::Error { kind, .. }) => {
                self.with_session(motor, |s| s.complete_handshake(false));
                Err(map_response_error(kind))
            },
            Wait::Completed(_) => {
                self.with_session(motor, |s| s.complete_handshake(false));
                Err(DriverError::UnexpectedFeedback)
            },
            Wait::TimedOut => {
                self.with_session(motor, |s| s.complete_handshake(false));
                Err(DriverError::Timeout)
            },
            Wait::Lost => {
                self.with_session(motor, |s| s.abort_reservation());
                Err(DriverError::TransportLost)
            },
        };

        self.log_completion(motor, &command, None, None, &result_outcome(&result));
        result
    }

    /// 读寄存器
    pub fn get(&self, motor: MotorId, name: &str) -> Result<ParamReading, DriverError> {
        let parameter =
            registry::lookup(name).ok_or_else(|| DriverError::UnknownParameter(name.to_string()))?;
        let seq = self.with_session(motor, |s| s.reserve_data(motor))?;
        let command = Command::Get { motor, parameter };

        let wait = self.issue(motor, seq, &command, self.policy.request_timeout)?;
        let (result, raw) = match wait {
            Wait::Completed(Feedback::Value {
                parameter: p, raw, ..
            }) => {
                self.with_session(motor, |s| s.complete_ok());
                (
                    Ok(ParamReading {
                        parameter: p,
                        raw,
                        engineering: p.raw_to_engineering(raw),
                    }),
                    Some(raw),
                )
            },
            Wait::Completed(Feedback::Error { kind, .. }) => {
                self.with_session(motor, |s| s.complete_ok());
                (Err(map_response_error(kind)), None)
            },
            Wait::Completed(_) => {
                self.with_session(motor, |s| s.complete_ok());
                (Err(DriverError::UnexpectedFeedback), None)
            },
            Wait::TimedOut => {
                self.note_request_timeout(motor);
                (Err(DriverError::Timeout), None)
            },
            Wait::Lost => {
                self.with_session(motor, |s| s.abort_reservation());
                (Err(DriverError::TransportLost), None)
            },
        };

        let engineering = raw.map(|r| parameter.raw_to_engineering(r));
        let outcome = match &result {
            Ok(_) => Outcome::Ok,
            Err(e) => error_outcome(e),
        };
        self.log_completion(motor, &command, raw, engineering, &outcome);
        result
    }

    /// 写寄存器（工程值按目录标度换算并做范围校验）
    pub fn set(&self, motor: MotorId, name: &str, value: f64) -> Result<(), DriverError> {
        let parameter =
            registry::lookup(name).ok_or_else(|| DriverError::UnknownParameter(name.to_string()))?;
        if !parameter.is_writable() {
            return Err(DriverError::ReadOnlyParameter(parameter.name));
        }
        let raw = parameter
            .engineering_to_raw(value)
            .map_err(|_| DriverError::OutOfRange {
                name: parameter.name,
                value,
            })?;

        let seq = self.with_session(motor, |s| s.reserve_data(motor))?;
        let command = Command::Set {
            motor,
            parameter,
            raw,
        };

        let wait = self.issue(motor, seq, &command, self.policy.request_timeout)?;
        let result = match wait {
            Wait::Completed(Feedback::Ack { .. }) => {
                self.with_session(motor, |s| s.complete_ok());
                Ok(())
            },
            Wait::Completed(Feedback::Error { kind, .. }) => {
                self.with_session(motor, |s| s.complete_ok());
                Err(map_response_error(kind))
            },
            Wait::Completed(_) => {
                self.with_session(motor, |s| s.complete_ok());
                Err(DriverError::UnexpectedFeedback)
            },
            Wait::TimedOut => {
                self.note_request_timeout(motor);
                Err(DriverError::Timeout)
            },
            Wait::Lost => {
                self.with_session(motor, |s| s.abort_reservation());
                Err(DriverError::TransportLost)
            },
        };

        self.log_completion(
            motor,
            &command,
            Some(raw),
            Some(parameter.raw_to_engineering(raw)),
            &result_outcome(&result),
        );
        result
    }

    /// 状态查询（Online 或 Handshaking 合法）
    pub fn state(&self, motor: MotorId) -> Result<StateReport, DriverError> {
        let seq = self.with_session(motor, |s| s.reserve_state(motor))?;
        let command = Command::State { motor };

        let wait = self.issue(motor, seq, &command, self.policy.request_timeout)?;
        let result = match wait {
            Wait::Completed(Feedback::State(report)) => {
                self.with_session(motor, |s| s.complete_ok());
                Ok(report)
            },
            Wait::Completed(Feedback::Error { kind, .. }) => {
                self.with_session(motor, |s| s.complete_ok());
                Err(map_response_error(kind))
            },
            Wait::Completed(_) => {
                self.with_session(motor, |s| s.complete_ok());
                Err(DriverError::UnexpectedFeedback)
            },
            Wait::TimedOut => {
                self.note_request_timeout(motor);
                Err(DriverError::Timeout)
            },
            Wait::Lost => {
                self.with_session(motor, |s| s.abort_reservation());
                Err(DriverError::TransportLost)
            },
        };

        self.log_completion(motor, &command, None, None, &result_outcome(&result));
        result
    }

    /// 参数目录（发现/帮助展示）
    pub fn list_parameters(&self) -> &'static [Parameter] {
        registry::list()
    }

    // ========================================================================
    // 日志作用域
    // ========================================================================

    /// 打开日志作用域
    ///
    /// Sink 由调用方提供（文件打开/目录管理在 CLI 层）。
    pub fn start_log(&self, sink: Box<dyn Write + Send>) -> Result<(), DriverError> {
        self.log.start(sink)
    }

    /// 关闭日志作用域，刷新并返回摘要
    pub fn stop_log(&self) -> Result<LogSummary, DriverError> {
        self.log.stop()
    }

    /// 日志作用域是否打开
    pub fn is_logging(&self) -> bool {
        self.log.is_active()
    }

    // ========================================================================
    // 观测
    // ========================================================================

    /// 会话状态（未引用过的电机为 Offline，不创建槽位）
    pub fn session_state(&self, motor: MotorId) -> SessionState {
        self.sessions
            .lock()
            .get(&motor)
            .map(|s| s.state())
            .unwrap_or_default()
    }

    /// 最近一帧遥测快照
    pub fn latest_telemetry(&self, motor: MotorId) -> Option<Arc<ServoTelemetry>> {
        self.ctx.latest_telemetry(motor)
    }

    /// 指标快照
    pub fn metrics(&self) -> MetricsSnapshot {
        self.ctx.metrics.snapshot()
    }

    /// 流量统计快照
    pub fn traffic(&self) -> TrafficStats {
        self.traffic.lock().clone()
    }

    /// 注册帧钩子（总线监视）
    pub fn add_frame_hook(&self, callback: Arc<dyn FrameCallback>) {
        self.ctx.hooks.add_callback(callback);
    }

    /// 清空帧钩子
    pub fn clear_frame_hooks(&self) {
        self.ctx.hooks.clear();
    }

    /// 传输层是否已丢失
    pub fn is_transport_lost(&self) -> bool {
        self.ctx.is_transport_lost()
    }

    // ========================================================================
    // 内部
    // ========================================================================

    fn with_session<R>(&self, motor: MotorId, f: impl FnOnce(&mut MotorSession) -> R) -> R {
        let mut sessions = self.sessions.lock();
        f(sessions.entry(motor).or_default())
    }

    /// 注册挂起项、发送帧并等待终结
    ///
    /// 发送失败时回滚预约并返回 Err；进入等待后只返回 Ok(Wait)，
    /// 由调用方完成会话终结（保证恰好一个终结结果）。
    fn issue(
        &self,
        motor: MotorId,
        seq: u8,
        command: &Command,
        timeout: Duration,
    ) -> Result<Wait, DriverError> {
        let key = (motor, seq);
        let rx = self.ctx.pending.register(key);
        let frames: FrameBuffer = command.to_frames(seq);

        if let Err(e) = self.transmit(frames) {
            self.ctx.pending.remove(&key);
            self.with_session(motor, |s| s.abort_reservation());
            return Err(e);
        }
        self.traffic.lock().record_command(motor.raw());

        match rx.recv_timeout(timeout) {
            Ok(feedback) => {
                self.traffic.lock().record_response(motor.raw());
                Ok(Wait::Completed(feedback))
            },
            Err(RecvTimeoutError::Timeout) => {
                // 先移除挂起项，迟到应答按孤儿帧计数
                self.ctx.pending.remove(&key);
                self.ctx
                    .metrics
                    .request_timeouts
                    .fetch_add(1, Ordering::Relaxed);
                self.traffic.lock().record_timeout(motor.raw());
                Ok(Wait::TimedOut)
            },
            Err(RecvTimeoutError::Disconnected) => Ok(Wait::Lost),
        }
    }

    fn transmit(&self, frames: FrameBuffer) -> Result<(), DriverError> {
        for frame in frames {
            self.cmd_tx.send(frame).map_err(|_| {
                if self.ctx.is_transport_lost() {
                    DriverError::TransportLost
                } else {
                    DriverError::ChannelClosed
                }
            })?;
        }
        Ok(())
    }

    fn note_request_timeout(&self, motor: MotorId) {
        let forced_offline =
            self.with_session(motor, |s| s.complete_timeout(self.policy.offline_threshold));
        if forced_offline {
            warn!(
                motor = %motor,
                threshold = self.policy.offline_threshold,
                "Consecutive timeouts reached threshold, forcing session offline"
            );
        }
    }

    /// 已派发指令的终结记录（作用域未打开时为空操作）
    fn log_completion(
        &self,
        motor: MotorId,
        command: &Command,
        raw: Option<i64>,
        engineering: Option<f64>,
        outcome: &Outcome,
    ) {
        self.log.append(&LogRecord {
            timestamp: self.clock.stamp(),
            motor_id: motor.raw(),
            command: command.kind_str(),
            parameter: command.parameter().map(|p| p.name),
            raw,
            engineering,
            outcome: *outcome,
        });
    }
}

impl Drop for WhjBus {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::Release);

        // 必须先关闭命令通道再 join：io_loop 靠 Disconnected/停机标志退出
        unsafe {
            ManuallyDrop::drop(&mut self.cmd_tx);
        }

        if let Some(handle) = self.io_thread.take() {
            if handle.join().is_err() {
                error!("IO thread panicked during join");
            }
        }
    }
}

fn map_response_error(kind: ResponseErrorKind) -> DriverError {
    match kind {
        ResponseErrorKind::UnknownParameter { register } => {
            DriverError::UnknownParameter(format!("register 0x{register:02X}"))
        },
        ResponseErrorKind::Rejected { status } => DriverError::Rejected(status),
    }
}

fn result_outcome<T>(result: &Result<T, DriverError>) -> Outcome {
    match result {
        Ok(_) => Outcome::Ok,
        Err(e) => error_outcome(e),
    }
}

fn error_outcome(error: &DriverError) -> Outcome {
    match error {
        DriverError::Timeout => Outcome::Timeout,
        other => Outcome::Error(other.outcome_str()),
    }
}
