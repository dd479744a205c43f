//! 流量统计
//!
//! 按电机累计指令发送/应答接收/超时次数，供 `status` 展示。

use std::collections::BTreeMap;

/// 单电机流量计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MotorTraffic {
    pub commands_sent: u64,
    pub responses_received: u64,
    pub timeouts: u64,
}

/// 全总线流量统计（BTreeMap 保证展示顺序按电机 ID 排列）
#[derive(Debug, Clone, Default)]
pub struct TrafficStats {
    per_motor: BTreeMap<u8, MotorTraffic>,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_command(&mut self, motor_id: u8) {
        self.per_motor.entry(motor_id).or_default().commands_sent += 1;
    }

    pub fn record_response(&mut self, motor_id: u8) {
        self.per_motor.entry(motor_id).or_default().responses_received += 1;
    }

    pub fn record_timeout(&mut self, motor_id: u8) {
        self.per_motor.entry(motor_id).or_default().timeouts += 1;
    }

    /// 单电机计数（未出现过的电机返回零值）
    pub fn motor(&self, motor_id: u8) -> MotorTraffic {
        self.per_motor.get(&motor_id).copied().unwrap_or_default()
    }

    /// 按电机 ID 升序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u8, MotorTraffic)> + '_ {
        self.per_motor.iter().map(|(id, traffic)| (*id, *traffic))
    }

    pub fn is_empty(&self) -> bool {
        self.per_motor.is_empty()
    }
}
