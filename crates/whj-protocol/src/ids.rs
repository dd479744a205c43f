//! 仲裁 ID 常量定义和报文分类
//!
//! 仲裁 ID 为 11-bit：高 3 位（bit 8-10）是报文类别，低 8 位是电机 ID。
//! 解码器仅凭仲裁 ID 即可对帧分类，无需检查 payload。

use crate::{MotorId, ProtocolError};
use num_enum::TryFromPrimitive;

/// 报文类别掩码（bit 8-10）
pub const CLASS_MASK: u16 = 0x700;

/// 电机 ID 掩码（bit 0-7）
pub const MODULE_ID_MASK: u16 = 0xFF;

// ============================================================================
// 指令帧基址（主机 → 电机）
// ============================================================================

/// 通用寄存器指令（读/写）
pub const ID_COMMON_COMMAND_BASE: u16 = 0x000;

/// 关节状态查询指令
pub const ID_STATE_REQUEST_BASE: u16 = 0x600;

// ============================================================================
// 应答帧基址（电机 → 主机）
// ============================================================================

/// 通用寄存器指令应答
pub const ID_COMMON_RESPONSE_BASE: u16 = 0x100;

/// 伺服高频遥测（非请求广播）
pub const ID_SERVO_TELEMETRY_BASE: u16 = 0x500;

/// 关节状态查询应答
pub const ID_STATE_RESPONSE_BASE: u16 = 0x700;

/// 报文类别
///
/// 枚举值即类别基址，可直接与电机 ID 按位或得到完整仲裁 ID。
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u16)]
pub enum MessageClass {
    /// 通用寄存器指令
    CommonCommand = ID_COMMON_COMMAND_BASE,
    /// 通用寄存器指令应答
    CommonResponse = ID_COMMON_RESPONSE_BASE,
    /// 伺服高频遥测
    ServoTelemetry = ID_SERVO_TELEMETRY_BASE,
    /// 关节状态查询指令
    StateRequest = ID_STATE_REQUEST_BASE,
    /// 关节状态查询应答
    StateResponse = ID_STATE_RESPONSE_BASE,
}

/// 由类别与电机 ID 合成仲裁 ID
pub fn compose_id(class: MessageClass, motor: MotorId) -> u16 {
    (class as u16) | motor.raw() as u16
}

/// 从仲裁 ID 提取电机 ID
pub fn module_id(id: u16) -> Result<MotorId, ProtocolError> {
    MotorId::new((id & MODULE_ID_MASK) as u8)
}

/// 从仲裁 ID 提取报文类别
pub fn classify(id: u16) -> Result<MessageClass, ProtocolError> {
    MessageClass::try_from(id & CLASS_MASK).map_err(|_| ProtocolError::InvalidCanId { id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_and_split() {
        let motor = MotorId::new(0x2A).unwrap();
        let id = compose_id(MessageClass::CommonResponse, motor);
        assert_eq!(id, 0x12A);
        assert_eq!(classify(id).unwrap(), MessageClass::CommonResponse);
        assert_eq!(module_id(id).unwrap(), motor);
    }

    #[test]
    fn test_classify_all_bases() {
        let motor = MotorId::new(1).unwrap();
        for class in [
            MessageClass::CommonCommand,
            MessageClass::CommonResponse,
            MessageClass::ServoTelemetry,
            MessageClass::StateRequest,
            MessageClass::StateResponse,
        ] {
            assert_eq!(classify(compose_id(class, motor)).unwrap(), class);
        }
    }

    #[test]
    fn test_classify_unknown_class() {
        // 0x200 段（旧固件的位置伺服流指令）不在本协议定义内
        assert!(classify(0x201).is_err());
    }

    #[test]
    fn test_module_id_zero_is_invalid() {
        assert!(module_id(0x100).is_err());
    }
}
