//! 共享总线上下文
//!
//! IO 线程与调用方线程之间共享的全部状态：挂起请求表、遥测快照槽、
//! 指标、钩子与传输丢失标志。除挂起表外均为无锁访问。

use crate::hooks::HookManager;
use crate::metrics::BusMetrics;
use crate::pending::PendingTable;
use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use whj_protocol::{MotorId, ServoTelemetry};

/// 遥测槽位数（按 8-bit 电机地址索引）
const TELEMETRY_SLOTS: usize = 256;

pub(crate) struct BusContext {
    pub(crate) pending: PendingTable,
    /// 每电机最近一帧遥测快照（写侧 IO 线程，读侧任意线程，无锁）
    telemetry: Box<[ArcSwapOption<ServoTelemetry>]>,
    pub(crate) metrics: BusMetrics,
    pub(crate) hooks: HookManager,
    /// 传输层丢失标志（IO 线程置位后不再清除）
    transport_lost: AtomicBool,
}

impl BusContext {
    pub(crate) fn new() -> Self {
        let telemetry: Vec<ArcSwapOption<ServoTelemetry>> =
            (0..TELEMETRY_SLOTS).map(|_| ArcSwapOption::from(None)).collect();
        Self {
            pending: PendingTable::new(),
            telemetry: telemetry.into_boxed_slice(),
            metrics: BusMetrics::new(),
            hooks: HookManager::new(),
            transport_lost: AtomicBool::new(false),
        }
    }

    pub(crate) fn store_telemetry(&self, telemetry: ServoTelemetry) {
        self.telemetry[telemetry.motor.raw() as usize].store(Some(Arc::new(telemetry)));
    }

    pub(crate) fn latest_telemetry(&self, motor: MotorId) -> Option<Arc<ServoTelemetry>> {
        self.telemetry[motor.raw() as usize].load_full()
    }

    pub(crate) fn mark_transport_lost(&self) {
        self.transport_lost.store(true, Ordering::Release);
    }

    pub(crate) fn is_transport_lost(&self) -> bool {
        self.transport_lost.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whj_protocol::{Feedback, WhjFrame, decode};

    #[test]
    fn test_telemetry_snapshot_per_motor() {
        let ctx = BusContext::new();
        let motor = MotorId::new(7).unwrap();
        assert!(ctx.latest_telemetry(motor).is_none());

        let mut payload = [0u8; 16];
        payload[8..12].copy_from_slice(&100i32.to_le_bytes());
        let frame = WhjFrame::new(0x507, &payload);
        let Feedback::Telemetry(telemetry) = decode(&frame).unwrap() else {
            panic!("expected telemetry");
        };
        ctx.store_telemetry(telemetry);

        let snapshot = ctx.latest_telemetry(motor).unwrap();
        assert_eq!(snapshot.position_raw, 100);
        assert!(ctx.latest_telemetry(MotorId::new(8).unwrap()).is_none());
    }

    #[test]
    fn test_transport_lost_latches() {
        let ctx = BusContext::new();
        assert!(!ctx.is_transport_lost());
        ctx.mark_transport_lost();
        assert!(ctx.is_transport_lost());
    }
}
