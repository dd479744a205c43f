//! IO 循环模块
//!
//! 后台 IO 线程：排空发送队列、接收 CANFD 帧、解析并完成请求关联。
//!
//! 监听路径的铁律：解析失败与孤儿帧只计数丢弃，永不上抛；
//! 只有传输层致命错误才终止循环。

use crate::context::BusContext;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, trace, warn};
use whj_can::{CanAdapter, CanError};
use whj_protocol::{Feedback, WhjFrame, decode};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use whj_driver::PipelineConfig;
///
/// // 默认配置（2ms 接收超时）
/// let config = PipelineConfig::default();
///
/// // 自定义配置
/// let config = PipelineConfig { receive_timeout_ms: 5 };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// CAN 接收超时（毫秒）。决定 IO 线程对停机信号与
    /// 发送队列积压的响应粒度。
    pub receive_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 2,
        }
    }
}

/// IO 线程主循环
///
/// # 参数
/// - `can`: CAN 适配器（移入 IO 线程独占）
/// - `cmd_rx`: 发送队列接收端（调用方线程 → IO 线程）
/// - `ctx`: 共享上下文
/// - `config`: Pipeline 配置
/// - `is_running`: 停机信号
pub(crate) fn io_loop(
    mut can: impl CanAdapter,
    cmd_rx: Receiver<WhjFrame>,
    ctx: Arc<BusContext>,
    config: PipelineConfig,
    is_running: Arc<AtomicBool>,
) {
    #[cfg(feature = "realtime")]
    {
        use thread_priority::*;
        match set_current_thread_priority(ThreadPriority::Max) {
            Ok(_) => tracing::info!("IO thread priority set to MAX (realtime)"),
            Err(e) => warn!(
                "Failed to set IO thread priority: {}. On Linux this needs CAP_SYS_NICE.",
                e
            ),
        }
    }

    can.set_receive_timeout(Duration::from_millis(config.receive_timeout_ms));

    loop {
        // Acquire: 看到 false 时必须同时看到停机方的全部写入
        if !is_running.load(Ordering::Acquire) {
            trace!("IO thread: is_running flag is false, exiting");
            break;
        }

        // ============================================================
        // 1. 排空发送队列（处理积压的指令帧）
        // ============================================================
        match drain_tx_queue(&mut can, &cmd_rx, &ctx) {
            DrainResult::Continue => {},
            DrainResult::Disconnected => break,
            DrainResult::TransportLost => {
                shutdown_on_transport_loss(&ctx);
                break;
            },
        }

        // ============================================================
        // 2. 接收 CANFD 帧（带超时，避免阻塞停机检查）
        // ============================================================
        let frame = match can.receive() {
            Ok(frame) => {
                ctx.metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                frame
            },
            Err(CanError::Timeout) => {
                // 空闲总线上的正常情况
                ctx.metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) if e.is_fatal() => {
                error!("Fatal CAN error, stopping IO thread: {}", e);
                shutdown_on_transport_loss(&ctx);
                break;
            },
            Err(e) => {
                warn!("CAN receive error (retrying): {}", e);
                continue;
            },
        };

        ctx.hooks.trigger_received(&frame);

        // ============================================================
        // 3. 解析并分发
        // ============================================================
        match decode(&frame) {
            Ok(feedback) => dispatch_feedback(&ctx, feedback),
            Err(e) => {
                // 单帧解析失败只影响该帧
                ctx.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping undecodable frame ID=0x{:03X}: {}", frame.id, e);
            },
        }
    }

    // 退出前丢弃残留挂起请求，等待方立刻收到 Disconnected 而非挂死
    let drained = ctx.pending.drain();
    if drained > 0 {
        warn!("IO thread exit: abandoned {} pending request(s)", drained);
    }
    trace!("IO thread exited");
}

/// 应答分发：关联挂起请求 / 遥测快照 / 孤儿计数
fn dispatch_feedback(ctx: &BusContext, feedback: Feedback) {
    match feedback {
        Feedback::Telemetry(telemetry) => {
            ctx.metrics.telemetry_frames.fetch_add(1, Ordering::Relaxed);
            ctx.store_telemetry(telemetry);
        },
        Feedback::Echo(echo) => {
            // loopback 关闭时不应出现；监视诊断才会走到这里
            trace!("Observed host-side command frame on bus: {:?}", echo);
        },
        other => {
            // Ack/Value/State/Error 均可关联
            let Some(key) = other.correlation() else {
                return;
            };
            if !ctx.pending.complete(&key, other) {
                // 迟到应答或他方请求的应答：孤儿事件，不是错误
                ctx.metrics.orphan_frames.fetch_add(1, Ordering::Relaxed);
                trace!(motor = %key.0, seq = key.1, "Orphan response discarded");
            }
        },
    }
}

enum DrainResult {
    Continue,
    Disconnected,
    TransportLost,
}

/// 排空发送队列（带帧数与时间预算）
///
/// 预算避免指令洪峰长时间占用接收路径：单轮最多 32 帧 / 500µs。
fn drain_tx_queue(
    can: &mut impl CanAdapter,
    cmd_rx: &Receiver<WhjFrame>,
    ctx: &BusContext,
) -> DrainResult {
    const MAX_DRAIN_PER_CYCLE: usize = 32;
    const TIME_BUDGET: Duration = Duration::from_micros(500);

    let start = Instant::now();

    for _ in 0..MAX_DRAIN_PER_CYCLE {
        if start.elapsed() > TIME_BUDGET {
            trace!("Drain time budget exhausted, deferred {} frame(s)", cmd_rx.len());
            break;
        }

        match cmd_rx.try_recv() {
            Ok(frame) => match can.send(frame) {
                Ok(()) => {
                    ctx.metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
                    ctx.hooks.trigger_sent(&frame);
                },
                Err(e) if e.is_fatal() => {
                    error!("Fatal CAN error on send: {}", e);
                    return DrainResult::TransportLost;
                },
                Err(e) => {
                    // 瞬时发送失败不中断 drain；对应请求由调用方超时终结
                    error!("Failed to send frame ID=0x{:03X}: {}", frame.id, e);
                },
            },
            Err(crossbeam_channel::TryRecvError::Empty) => break,
            Err(crossbeam_channel::TryRecvError::Disconnected) => return DrainResult::Disconnected,
        }
    }

    DrainResult::Continue
}

fn shutdown_on_transport_loss(ctx: &BusContext) {
    ctx.mark_transport_lost();
    let drained = ctx.pending.drain();
    if drained > 0 {
        warn!("Transport lost: abandoned {} pending request(s)", drained);
    }
}
