//! 指令帧构建
//!
//! 将结构化指令编码为一个或多个 CANFD 帧。序列号由会话层分配，
//! 编码时嵌入 payload 以便应答按 (电机, 序列号) 关联。

use crate::constants::*;
use crate::ids::{MessageClass, compose_id};
use crate::registry::{Parameter, RegisterAddress};
use crate::{MotorId, WhjFrame};
use smallvec::SmallVec;

/// 帧缓冲区类型
///
/// 当前所有指令都编码为单帧，预留 2 个栈上位置以覆盖未来的
/// 多帧指令（如分段固件下载），不触发堆分配。
pub type FrameBuffer = SmallVec<[WhjFrame; 2]>;

/// 结构化指令
///
/// 由边界层（CLI 解析器）构造，调度器消费。`Get`/`Set` 持有目录
/// 条目引用，构造前必须完成参数名解析。
#[derive(Debug, Clone, Copy)]
pub enum Command {
    /// 上线握手（IAP 标志写入，应答 Ack 即握手完成）
    Online { motor: MotorId },
    /// 关节状态查询
    State { motor: MotorId },
    /// 读寄存器
    Get {
        motor: MotorId,
        parameter: &'static Parameter,
    },
    /// 写寄存器（raw 为已标度校验过的原始值）
    Set {
        motor: MotorId,
        parameter: &'static Parameter,
        raw: i64,
    },
}

impl Command {
    /// 目标电机
    pub fn motor(&self) -> MotorId {
        match *self {
            Command::Online { motor }
            | Command::State { motor }
            | Command::Get { motor, .. }
            | Command::Set { motor, .. } => motor,
        }
    }

    /// 涉及的参数（Online/State 无参数）
    pub fn parameter(&self) -> Option<&'static Parameter> {
        match *self {
            Command::Get { parameter, .. } | Command::Set { parameter, .. } => Some(parameter),
            _ => None,
        }
    }

    /// 指令种类名（日志列）
    pub fn kind_str(&self) -> &'static str {
        match self {
            Command::Online { .. } => "online",
            Command::State { .. } => "state",
            Command::Get { .. } => "get",
            Command::Set { .. } => "set",
        }
    }

    /// 编码为 CANFD 帧序列
    pub fn to_frames(&self, seq: u8) -> FrameBuffer {
        let mut frames = FrameBuffer::new();
        match *self {
            Command::Online { motor } => {
                // 上线即向 IAP 标志寄存器写 0x00，等待写应答作为握手 Ack
                let payload = [OP_WRITE, RegisterAddress::IapFlag as u8, seq, 0x00];
                frames.push(WhjFrame::new(
                    compose_id(MessageClass::CommonCommand, motor),
                    &payload,
                ));
            },
            Command::State { motor } => {
                frames.push(WhjFrame::new(
                    compose_id(MessageClass::StateRequest, motor),
                    &[seq],
                ));
            },
            Command::Get { motor, parameter } => {
                let payload = [OP_READ, parameter.register as u8, seq];
                frames.push(WhjFrame::new(
                    compose_id(MessageClass::CommonCommand, motor),
                    &payload,
                ));
            },
            Command::Set {
                motor,
                parameter,
                raw,
            } => {
                let mut payload = [0u8; 3 + 4];
                payload[COMMON_OP_OFFSET] = OP_WRITE;
                payload[COMMON_REGISTER_OFFSET] = parameter.register as u8;
                payload[COMMON_SEQ_OFFSET] = seq;
                let width = parameter
                    .data_type
                    .encode_raw(raw, &mut payload[COMMAND_VALUE_OFFSET..]);
                frames.push(WhjFrame::new(
                    compose_id(MessageClass::CommonCommand, motor),
                    &payload[..COMMAND_VALUE_OFFSET + width],
                ));
            },
        }
        frames
    }
}
