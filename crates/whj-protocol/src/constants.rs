//! 协议常量定义

/// 寄存器读操作
pub const OP_READ: u8 = 0x01;

/// 寄存器写操作
pub const OP_WRITE: u8 = 0x02;

/// 应答状态：成功
pub const STATUS_OK: u8 = 0x00;

/// 应答状态：未知寄存器
pub const STATUS_UNKNOWN_REGISTER: u8 = 0x01;

// ============================================================================
// 通用指令/应答 payload 偏移
// ============================================================================

/// 操作码偏移（指令与应答相同）
pub const COMMON_OP_OFFSET: usize = 0;

/// 寄存器地址偏移（指令与应答相同）
pub const COMMON_REGISTER_OFFSET: usize = 1;

/// 序列号偏移（指令与应答相同）
pub const COMMON_SEQ_OFFSET: usize = 2;

/// 指令帧数值区偏移（仅写指令有数值区）
pub const COMMAND_VALUE_OFFSET: usize = 3;

/// 应答帧状态字节偏移
pub const RESPONSE_STATUS_OFFSET: usize = 3;

/// 应答帧数值区偏移（仅读应答有数值区）
pub const RESPONSE_VALUE_OFFSET: usize = 4;

// ============================================================================
// 状态查询应答 payload 布局（17 字节，DLC 量化为 20）
// ============================================================================

/// 状态应答有效字节数
pub const STATE_RESPONSE_LEN: usize = 17;

pub const STATE_SEQ_OFFSET: usize = 0;
pub const STATE_FAULT_OFFSET: usize = 1;
pub const STATE_VOLTAGE_OFFSET: usize = 3;
pub const STATE_TEMP_OFFSET: usize = 5;
pub const STATE_ENABLE_OFFSET: usize = 7;
pub const STATE_BRAKE_OFFSET: usize = 8;
pub const STATE_POSITION_OFFSET: usize = 9;
pub const STATE_CURRENT_OFFSET: usize = 13;

// ============================================================================
// 伺服遥测 payload 布局（16 字节，与固件高频反馈一致）
// ============================================================================

/// 遥测帧有效字节数
pub const TELEMETRY_LEN: usize = 16;

pub const TELEMETRY_CURRENT_OFFSET: usize = 0;
pub const TELEMETRY_VELOCITY_OFFSET: usize = 4;
pub const TELEMETRY_POSITION_OFFSET: usize = 8;
pub const TELEMETRY_FAULT_OFFSET: usize = 14;
