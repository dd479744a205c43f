//! 每电机会话状态机
//!
//! 会话管控请求合法性：Offline 时 get/set/state 一律拒绝且不发帧；
//! 同一电机任意时刻至多一个未决请求；Online 下连续超时达到阈值
//! 强制回到 Offline。
//!
//! 会话槽位由调度器惰性创建，进程运行期间不销毁。

use crate::error::DriverError;
use std::time::Duration;
use whj_protocol::MotorId;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// 初始状态，未完成上线握手
    #[default]
    Offline,
    /// Online 指令已发出，等待握手 Ack
    Handshaking,
    /// 握手完成，允许读写
    Online,
}

/// 超时/重试策略
///
/// 连续超时阈值是策略参数而非常量：不同总线负载下合理取值不同。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 单个读写/状态请求的应答截止时间
    pub request_timeout: Duration,
    /// 上线握手的 Ack 截止时间
    pub handshake_timeout: Duration,
    /// Online 下连续超时多少次后强制 Offline
    pub offline_threshold: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(1),
            handshake_timeout: Duration::from_secs(1),
            offline_threshold: 3,
        }
    }
}

/// 会话槽位
#[derive(Debug, Default)]
pub(crate) struct MotorSession {
    state: SessionState,
    /// 下一个请求的序列号（按电机回绕递增）
    seq: u8,
    /// 单飞标记：true 期间同一电机的新请求返回 Busy
    in_flight: bool,
    /// Online 下连续超时计数
    consecutive_timeouts: u32,
}

impl MotorSession {
    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);
        seq
    }

    /// 预约上线握手：仅允许从 Offline 发起
    pub(crate) fn reserve_online(&mut self, motor: MotorId) -> Result<u8, DriverError> {
        match self.state {
            SessionState::Online => return Err(DriverError::AlreadyOnline(motor)),
            SessionState::Handshaking => return Err(DriverError::Busy(motor)),
            SessionState::Offline => {},
        }
        if self.in_flight {
            return Err(DriverError::Busy(motor));
        }
        self.state = SessionState::Handshaking;
        self.in_flight = true;
        Ok(self.next_seq())
    }

    /// 预约读写请求：仅允许 Online
    pub(crate) fn reserve_data(&mut self, motor: MotorId) -> Result<u8, DriverError> {
        if self.state != SessionState::Online {
            return Err(DriverError::MotorOffline(motor));
        }
        if self.in_flight {
            return Err(DriverError::Busy(motor));
        }
        self.in_flight = true;
        Ok(self.next_seq())
    }

    /// 预约状态查询：Online 或 Handshaking 均合法
    ///
    /// Handshaking 期间单飞标记被握手占用，实际会得到 Busy；
    /// 状态合法性与单飞限制分开判定，Offline 永远先报 MotorOffline。
    pub(crate) fn reserve_state(&mut self, motor: MotorId) -> Result<u8, DriverError> {
        if self.state == SessionState::Offline {
            return Err(DriverError::MotorOffline(motor));
        }
        if self.in_flight {
            return Err(DriverError::Busy(motor));
        }
        self.in_flight = true;
        Ok(self.next_seq())
    }

    /// 请求正常终结（成功或应答级错误都算收到应答）
    pub(crate) fn complete_ok(&mut self) {
        self.in_flight = false;
        self.consecutive_timeouts = 0;
    }

    /// 握手终结
    pub(crate) fn complete_handshake(&mut self, success: bool) {
        self.in_flight = false;
        self.consecutive_timeouts = 0;
        self.state = if success {
            SessionState::Online
        } else {
            SessionState::Offline
        };
    }

    /// 请求超时终结；返回是否触发强制 Offline
    pub(crate) fn complete_timeout(&mut self, threshold: u32) -> bool {
        self.in_flight = false;
        if self.state != SessionState::Online {
            return false;
        }
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts >= threshold {
            self.state = SessionState::Offline;
            self.consecutive_timeouts = 0;
            return true;
        }
        false
    }

    /// 撤销预约（帧未能送入发送队列时回滚，不产生终结结果）
    pub(crate) fn abort_reservation(&mut self) {
        self.in_flight = false;
        if self.state == SessionState::Handshaking {
            self.state = SessionState::Offline;
        }
    }

    #[cfg(test)]
    pub(crate) fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motor() -> MotorId {
        MotorId::new(1).unwrap()
    }

    #[test]
    fn test_initial_state_rejects_data_requests() {
        let mut session = MotorSession::default();
        assert_eq!(session.state(), SessionState::Offline);
        assert!(matches!(
            session.reserve_data(motor()),
            Err(DriverError::MotorOffline(_))
        ));
        assert!(matches!(
            session.reserve_state(motor()),
            Err(DriverError::MotorOffline(_))
        ));
    }

    #[test]
    fn test_handshake_flow() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        assert_eq!(session.state(), SessionState::Handshaking);

        // 握手期间重复 online 报 Busy
        assert!(matches!(
            session.reserve_online(motor()),
            Err(DriverError::Busy(_))
        ));

        session.complete_handshake(true);
        assert_eq!(session.state(), SessionState::Online);

        // Online 后重复 online 报 AlreadyOnline
        assert!(matches!(
            session.reserve_online(motor()),
            Err(DriverError::AlreadyOnline(_))
        ));
    }

    #[test]
    fn test_handshake_timeout_returns_offline() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        session.complete_handshake(false);
        assert_eq!(session.state(), SessionState::Offline);
    }

    #[test]
    fn test_single_flight() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        session.complete_handshake(true);

        session.reserve_data(motor()).unwrap();
        assert!(matches!(
            session.reserve_data(motor()),
            Err(DriverError::Busy(_))
        ));
        session.complete_ok();
        session.reserve_data(motor()).unwrap();
    }

    #[test]
    fn test_seq_increments_per_request() {
        let mut session = MotorSession::default();
        let s0 = session.reserve_online(motor()).unwrap();
        session.complete_handshake(true);
        let s1 = session.reserve_data(motor()).unwrap();
        session.complete_ok();
        let s2 = session.reserve_data(motor()).unwrap();
        assert_eq!(s1, s0.wrapping_add(1));
        assert_eq!(s2, s1.wrapping_add(1));
    }

    #[test]
    fn test_timeout_threshold_forces_offline() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        session.complete_handshake(true);

        // 阈值 3：前两次超时仍 Online
        for expected in 1..=2u32 {
            session.reserve_data(motor()).unwrap();
            assert!(!session.complete_timeout(3));
            assert_eq!(session.consecutive_timeouts(), expected);
            assert_eq!(session.state(), SessionState::Online);
        }

        // 第三次触发强制 Offline，计数清零
        session.reserve_data(motor()).unwrap();
        assert!(session.complete_timeout(3));
        assert_eq!(session.state(), SessionState::Offline);
        assert_eq!(session.consecutive_timeouts(), 0);
    }

    #[test]
    fn test_success_resets_timeout_counter() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        session.complete_handshake(true);

        session.reserve_data(motor()).unwrap();
        session.complete_timeout(3);
        session.reserve_data(motor()).unwrap();
        session.complete_ok();
        assert_eq!(session.consecutive_timeouts(), 0);
    }

    #[test]
    fn test_abort_reservation_rolls_back_handshake() {
        let mut session = MotorSession::default();
        session.reserve_online(motor()).unwrap();
        session.abort_reservation();
        assert_eq!(session.state(), SessionState::Offline);
        // 槽位可再次预约
        session.reserve_online(motor()).unwrap();
    }
}
