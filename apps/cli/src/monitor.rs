//! 总线监视
//!
//! 通过驱动层帧钩子旁路打印总线流量，Ctrl+C 或到时结束。

use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use whj_sdk::WhjBus;
use whj_sdk::driver::FrameCallback;
use whj_sdk::protocol::WhjFrame;

/// Ctrl+C 标志（进程级，handler 只能注册一次）
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// 注册 Ctrl+C handler（重复调用安全）
pub fn init_interrupt_handler() {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Err(e) = ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!("Failed to install Ctrl+C handler: {}", e);
    }
}

/// 打印钩子：在 IO 线程内直接输出帧转储
struct PrintHook;

impl FrameCallback for PrintHook {
    fn on_frame_received(&self, frame: &WhjFrame) {
        println!("RX ID: {:03X} Data: {}", frame.id, hex::encode(frame.data_slice()));
    }

    fn on_frame_sent(&self, frame: &WhjFrame) {
        println!("TX ID: {:03X} Data: {}", frame.id, hex::encode(frame.data_slice()));
    }
}

/// 监视总线流量 duration 秒（Ctrl+C 提前结束）
pub fn run_monitor(bus: &WhjBus, duration: Duration) -> Result<()> {
    println!(
        "Monitoring CAN traffic for {} seconds... (Ctrl+C to stop)",
        duration.as_secs()
    );

    INTERRUPTED.store(false, Ordering::SeqCst);
    bus.add_frame_hook(Arc::new(PrintHook));

    let start = Instant::now();
    while start.elapsed() < duration {
        if INTERRUPTED.swap(false, Ordering::SeqCst) {
            println!("\nMonitoring stopped by user");
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }

    bus.clear_frame_hooks();
    Ok(())
}
