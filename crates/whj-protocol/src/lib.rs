//! # WHJ Protocol
//!
//! WHJ 伺服执行器 CANFD 寄存器协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: 仲裁 ID 常量定义与报文分类
//! - `registry`: 参数寄存器目录（名称/地址/类型/标度/读写权限）
//! - `command`: 指令帧构建
//! - `feedback`: 应答/遥测帧解析
//! - `constants`: 协议常量定义
//!
//! ## 字节序
//!
//! 协议多字节数值使用 Intel (LSB) 低位在前（小端字节序）。
//! 本模块提供了字节序转换工具函数。

pub mod command;
pub mod constants;
pub mod feedback;
pub mod ids;
pub mod registry;

// 重新导出常用类型
pub use command::*;
pub use constants::*;
pub use feedback::*;
pub use ids::*;
pub use registry::*;

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u16 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: String, value: u8 },

    #[error("Invalid motor id: {0} (valid range 1..=254)")]
    InvalidMotorId(u8),

    #[error("Value {value} out of range for parameter {name}")]
    OutOfRange { name: &'static str, value: f64 },
}

/// 电机 ID（总线模块地址）
///
/// 有效范围 1..=254。0 为广播保留地址，0xFF 为固件保留地址，
/// 两者都不允许作为会话目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorId(u8);

impl MotorId {
    /// 创建电机 ID，越界返回 `InvalidMotorId`
    pub fn new(id: u8) -> Result<Self, ProtocolError> {
        if id == 0 || id == 0xFF {
            return Err(ProtocolError::InvalidMotorId(id));
        }
        Ok(Self(id))
    }

    /// 原始 8-bit 地址
    pub fn raw(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for MotorId {
    type Error = ProtocolError;

    fn try_from(id: u8) -> Result<Self, Self::Error> {
        Self::new(id)
    }
}

impl std::fmt::Display for MotorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// CANFD 帧的统一抽象
///
/// `WhjFrame` 是协议层和硬件层之间的中间抽象：协议层通过
/// `to_frames()` 构建、`decode()` 解析，CAN 层负责与 SocketCAN
/// 帧类型互转。
///
/// # 设计特性
///
/// - **Copy trait**：固定 64 字节数据区，栈上传递，无堆分配
/// - **DLC 量化**：`len` 始终为合法 CANFD DLC 长度（见 [`fd_frame_len`]）
/// - **时间戳**：`timestamp_us` 由接收路径填充，0 表示不可用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WhjFrame {
    /// 11-bit 仲裁 ID（报文类别 | 电机 ID）
    pub id: u16,

    /// 帧数据（固定 64 字节，未使用部分为 0）
    pub data: [u8; 64],

    /// 有效数据长度 (0-64，已量化到合法 DLC)
    pub len: u8,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl WhjFrame {
    /// 创建帧，payload 自动补零到最近的合法 CANFD DLC 长度
    pub fn new(id: u16, data: &[u8]) -> Self {
        let mut fixed_data = [0u8; 64];
        let len = data.len().min(64);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: fd_frame_len(len) as u8,
            timestamp_us: 0,
        }
    }

    /// 有效数据切片
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 附带时间戳的副本
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }
}

/// CANFD 合法 DLC 长度表
pub const FD_FRAME_LENGTHS: [usize; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];

/// 将 payload 长度量化到最近的合法 CANFD DLC 长度（向上取整）
pub fn fd_frame_len(len: usize) -> usize {
    for &step in FD_FRAME_LENGTHS.iter() {
        if len <= step {
            return step;
        }
    }
    64
}

/// 字节序转换工具函数
///
/// 协议使用 Intel (LSB) 低位在前（小端字节序），
/// 这些函数用于在协议层进行字节序转换。
/// 小端字节序转 i32
pub fn bytes_to_i32_le(bytes: [u8; 4]) -> i32 {
    i32::from_le_bytes(bytes)
}

/// 小端字节序转 u16
pub fn bytes_to_u16_le(bytes: [u8; 2]) -> u16 {
    u16::from_le_bytes(bytes)
}

/// 小端字节序转 i16
pub fn bytes_to_i16_le(bytes: [u8; 2]) -> i16 {
    i16::from_le_bytes(bytes)
}

/// i32 转小端字节序
pub fn i32_to_bytes_le(value: i32) -> [u8; 4] {
    value.to_le_bytes()
}

/// u16 转小端字节序
pub fn u16_to_bytes_le(value: u16) -> [u8; 2] {
    value.to_le_bytes()
}
