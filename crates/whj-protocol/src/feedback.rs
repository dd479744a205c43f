//! 应答/遥测帧解析
//!
//! 将收到的 CANFD 帧解析为类型化的应答。解析入口 [`decode`] 按仲裁 ID
//! 分类后分派到各结构体的 `TryFrom<WhjFrame>` 实现。
//!
//! 监听路径的约束：单帧解析失败只影响该帧，未知寄存器地址解析为
//! `Feedback::Error(UnknownParameter)` 而不是整体解析失败。

use crate::constants::*;
use crate::ids::{MessageClass, classify, module_id};
use crate::registry::{self, Parameter, RegisterAddress};
use crate::{MotorId, ProtocolError, WhjFrame, bytes_to_i16_le, bytes_to_i32_le, bytes_to_u16_le};
use bilge::prelude::*;

// ============================================================================
// 故障位域（与固件 16-bit 故障字一致）
// ============================================================================

/// 故障标志位域
///
/// Bit 0 对应 FOC 频率过高，依次到 Bit 15 多圈计数错误。
/// 单字节内位序为 LSB first，与 bilge 默认位序一致。
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct FaultFlags {
    pub foc_rate_too_high: bool,
    pub over_voltage: bool,
    pub under_voltage: bool,
    pub over_temperature: bool,
    pub startup_failed: bool,
    pub encoder_error: bool,
    pub over_current: bool,
    pub software_error: bool,
    pub thermal_sensor_error: bool,
    pub position_limit_exceeded: bool,
    pub joint_id_invalid: bool,
    pub homing_limit_exceeded: bool,
    pub current_detection_error: bool,
    pub brake_engage_failed: bool,
    pub position_step_error: bool,
    pub multi_turn_count_error: bool,
}

impl FaultFlags {
    /// 是否无故障
    pub fn is_clear(self) -> bool {
        u16::from(self) == 0
    }

    /// 当前置位的故障名列表（诊断展示用）
    pub fn active_names(self) -> Vec<&'static str> {
        const NAMES: [&str; 16] = [
            "FOC_RATE_TOO_HIGH",
            "OVER_VOLTAGE",
            "UNDER_VOLTAGE",
            "OVER_TEMPERATURE",
            "STARTUP_FAILED",
            "ENCODER_ERROR",
            "OVER_CURRENT",
            "SOFTWARE_ERROR",
            "THERMAL_SENSOR_ERROR",
            "POSITION_LIMIT_EXCEEDED",
            "JOINT_ID_INVALID",
            "HOMING_LIMIT_EXCEEDED",
            "CURRENT_DETECTION_ERROR",
            "BRAKE_ENGAGE_FAILED",
            "POSITION_STEP_ERROR",
            "MULTI_TURN_COUNT_ERROR",
        ];
        let raw = u16::from(self);
        (0..16usize)
            .filter(|&bit| raw & (1u16 << bit) != 0)
            .map(|bit| NAMES[bit])
            .collect()
    }
}

// ============================================================================
// 状态查询应答 (0x700 | id)
// ============================================================================

/// 关节状态应答
///
/// 原始整数按线上表示保存，工程值经访问方法换算。
#[derive(Debug, Clone, Copy)]
pub struct StateReport {
    pub motor: MotorId,
    pub seq: u8,
    pub fault: FaultFlags,
    pub voltage_raw: u16,
    pub temperature_raw: i16,
    pub enable_state: u8,
    pub brake_state: u8,
    pub position_raw: i32,
    pub current_raw: i32,
}

impl StateReport {
    /// 母线电压 (V)
    pub fn voltage_v(&self) -> f64 {
        self.voltage_raw as f64 * registry::SCALE_VOLTAGE
    }

    /// 驱动器温度 (℃)
    pub fn temperature_c(&self) -> f64 {
        self.temperature_raw as f64 * registry::SCALE_TEMPERATURE
    }

    /// 关节位置 (deg)
    pub fn position_deg(&self) -> f64 {
        self.position_raw as f64 * registry::SCALE_POSITION
    }

    /// 相电流 (mA)
    pub fn current_ma(&self) -> f64 {
        self.current_raw as f64 * registry::SCALE_CURRENT
    }
}

impl TryFrom<WhjFrame> for StateReport {
    type Error = ProtocolError;

    fn try_from(frame: WhjFrame) -> Result<Self, ProtocolError> {
        if classify(frame.id)? != MessageClass::StateResponse {
            return Err(ProtocolError::InvalidCanId { id: frame.id });
        }
        if (frame.len as usize) < STATE_RESPONSE_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: STATE_RESPONSE_LEN,
                actual: frame.len as usize,
            });
        }
        let data = frame.data_slice();
        Ok(Self {
            motor: module_id(frame.id)?,
            seq: data[STATE_SEQ_OFFSET],
            fault: FaultFlags::from(bytes_to_u16_le([
                data[STATE_FAULT_OFFSET],
                data[STATE_FAULT_OFFSET + 1],
            ])),
            voltage_raw: bytes_to_u16_le([data[STATE_VOLTAGE_OFFSET], data[STATE_VOLTAGE_OFFSET + 1]]),
            temperature_raw: bytes_to_i16_le([data[STATE_TEMP_OFFSET], data[STATE_TEMP_OFFSET + 1]]),
            enable_state: data[STATE_ENABLE_OFFSET],
            brake_state: data[STATE_BRAKE_OFFSET],
            position_raw: bytes_to_i32_le([
                data[STATE_POSITION_OFFSET],
                data[STATE_POSITION_OFFSET + 1],
                data[STATE_POSITION_OFFSET + 2],
                data[STATE_POSITION_OFFSET + 3],
            ]),
            current_raw: bytes_to_i32_le([
                data[STATE_CURRENT_OFFSET],
                data[STATE_CURRENT_OFFSET + 1],
                data[STATE_CURRENT_OFFSET + 2],
                data[STATE_CURRENT_OFFSET + 3],
            ]),
        })
    }
}

// ============================================================================
// 伺服高频遥测 (0x500 | id)
// ============================================================================

/// 伺服遥测帧（非请求广播，不参与请求关联）
#[derive(Debug, Clone, Copy)]
pub struct ServoTelemetry {
    pub motor: MotorId,
    pub current_raw: i32,
    pub velocity_raw: i32,
    pub position_raw: i32,
    pub fault: FaultFlags,
    pub timestamp_us: u64,
}

impl ServoTelemetry {
    /// 相电流 (mA)
    pub fn current_ma(&self) -> f64 {
        self.current_raw as f64 * registry::SCALE_CURRENT
    }

    /// 转速 (RPM)
    pub fn velocity_rpm(&self) -> f64 {
        self.velocity_raw as f64 * registry::SCALE_ACTUAL_SPEED
    }

    /// 位置 (deg)
    pub fn position_deg(&self) -> f64 {
        self.position_raw as f64 * registry::SCALE_POSITION
    }
}

impl TryFrom<WhjFrame> for ServoTelemetry {
    type Error = ProtocolError;

    fn try_from(frame: WhjFrame) -> Result<Self, ProtocolError> {
        if classify(frame.id)? != MessageClass::ServoTelemetry {
            return Err(ProtocolError::InvalidCanId { id: frame.id });
        }
        if (frame.len as usize) < TELEMETRY_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: TELEMETRY_LEN,
                actual: frame.len as usize,
            });
        }
        let data = frame.data_slice();
        Ok(Self {
            motor: module_id(frame.id)?,
            current_raw: bytes_to_i32_le([
                data[TELEMETRY_CURRENT_OFFSET],
                data[TELEMETRY_CURRENT_OFFSET + 1],
                data[TELEMETRY_CURRENT_OFFSET + 2],
                data[TELEMETRY_CURRENT_OFFSET + 3],
            ]),
            velocity_raw: bytes_to_i32_le([
                data[TELEMETRY_VELOCITY_OFFSET],
                data[TELEMETRY_VELOCITY_OFFSET + 1],
                data[TELEMETRY_VELOCITY_OFFSET + 2],
                data[TELEMETRY_VELOCITY_OFFSET + 3],
            ]),
            position_raw: bytes_to_i32_le([
                data[TELEMETRY_POSITION_OFFSET],
                data[TELEMETRY_POSITION_OFFSET + 1],
                data[TELEMETRY_POSITION_OFFSET + 2],
                data[TELEMETRY_POSITION_OFFSET + 3],
            ]),
            fault: FaultFlags::from(bytes_to_u16_le([
                data[TELEMETRY_FAULT_OFFSET],
                data[TELEMETRY_FAULT_OFFSET + 1],
            ])),
            timestamp_us: frame.timestamp_us,
        })
    }
}

// ============================================================================
// 统一应答类型
// ============================================================================

/// 应答级错误种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseErrorKind {
    /// 寄存器地址不在目录内
    UnknownParameter { register: u8 },
    /// 电机拒绝指令（状态字节非零）
    Rejected { status: u8 },
}

/// 监视路径观测到的主机侧指令帧
///
/// 正常接收路径（loopback 关闭）不会出现；用于总线监视与
/// 编码自校验。
#[derive(Debug, Clone, Copy)]
pub enum CommandEcho {
    Online { motor: MotorId, seq: u8 },
    State { motor: MotorId, seq: u8 },
    Get {
        motor: MotorId,
        parameter: &'static Parameter,
        seq: u8,
    },
    Set {
        motor: MotorId,
        parameter: &'static Parameter,
        seq: u8,
        raw: i64,
    },
}

/// 解码后的应答/遥测
#[derive(Debug, Clone)]
pub enum Feedback {
    /// 写应答
    Ack {
        motor: MotorId,
        parameter: &'static Parameter,
        seq: u8,
    },
    /// 读应答（raw 为线上原始值，工程值由调用方按目录标度换算）
    Value {
        motor: MotorId,
        parameter: &'static Parameter,
        seq: u8,
        raw: i64,
    },
    /// 状态查询应答
    State(StateReport),
    /// 伺服遥测（无序列号，不参与关联）
    Telemetry(ServoTelemetry),
    /// 应答级错误（可关联到挂起请求）
    Error {
        motor: MotorId,
        seq: u8,
        kind: ResponseErrorKind,
    },
    /// 主机侧指令帧回读
    Echo(CommandEcho),
}

impl Feedback {
    /// 来源电机
    pub fn motor(&self) -> MotorId {
        match self {
            Feedback::Ack { motor, .. }
            | Feedback::Value { motor, .. }
            | Feedback::Error { motor, .. } => *motor,
            Feedback::State(report) => report.motor,
            Feedback::Telemetry(telemetry) => telemetry.motor,
            Feedback::Echo(echo) => match echo {
                CommandEcho::Online { motor, .. }
                | CommandEcho::State { motor, .. }
                | CommandEcho::Get { motor, .. }
                | CommandEcho::Set { motor, .. } => *motor,
            },
        }
    }

    /// 请求关联键 (电机, 序列号)；遥测与指令回读不参与关联
    pub fn correlation(&self) -> Option<(MotorId, u8)> {
        match self {
            Feedback::Ack { motor, seq, .. }
            | Feedback::Value { motor, seq, .. }
            | Feedback::Error { motor, seq, .. } => Some((*motor, *seq)),
            Feedback::State(report) => Some((report.motor, report.seq)),
            Feedback::Telemetry(_) | Feedback::Echo(_) => None,
        }
    }
}

/// 解码入口
///
/// 仲裁 ID 无法分类或 payload 长度非法时返回 `ProtocolError`
/// （监听器丢弃并计数）；寄存器未知/电机拒绝是协议内语义，
/// 解析为 `Feedback::Error` 以便关联到发起请求。
pub fn decode(frame: &WhjFrame) -> Result<Feedback, ProtocolError> {
    match classify(frame.id)? {
        MessageClass::CommonResponse => decode_common_response(frame),
        MessageClass::StateResponse => Ok(Feedback::State(StateReport::try_from(*frame)?)),
        MessageClass::ServoTelemetry => Ok(Feedback::Telemetry(ServoTelemetry::try_from(*frame)?)),
        MessageClass::CommonCommand => decode_common_command(frame),
        MessageClass::StateRequest => {
            if frame.len < 1 {
                return Err(ProtocolError::InvalidLength {
                    expected: 1,
                    actual: 0,
                });
            }
            Ok(Feedback::Echo(CommandEcho::State {
                motor: module_id(frame.id)?,
                seq: frame.data_slice()[0],
            }))
        },
    }
}

fn decode_common_response(frame: &WhjFrame) -> Result<Feedback, ProtocolError> {
    let motor = module_id(frame.id)?;
    let data = frame.data_slice();
    if data.len() <= RESPONSE_STATUS_OFFSET {
        return Err(ProtocolError::InvalidLength {
            expected: RESPONSE_STATUS_OFFSET + 1,
            actual: data.len(),
        });
    }
    let op = data[COMMON_OP_OFFSET];
    let register = data[COMMON_REGISTER_OFFSET];
    let seq = data[COMMON_SEQ_OFFSET];
    let status = data[RESPONSE_STATUS_OFFSET];

    if status != STATUS_OK {
        let kind = if status == STATUS_UNKNOWN_REGISTER {
            ResponseErrorKind::UnknownParameter { register }
        } else {
            ResponseErrorKind::Rejected { status }
        };
        return Ok(Feedback::Error { motor, seq, kind });
    }

    let Some(parameter) = registry::by_register(register) else {
        return Ok(Feedback::Error {
            motor,
            seq,
            kind: ResponseErrorKind::UnknownParameter { register },
        });
    };

    match op {
        OP_WRITE => Ok(Feedback::Ack {
            motor,
            parameter,
            seq,
        }),
        OP_READ => {
            let raw = parameter
                .data_type
                .decode_raw(&data[RESPONSE_VALUE_OFFSET..])?;
            Ok(Feedback::Value {
                motor,
                parameter,
                seq,
                raw,
            })
        },
        other => Err(ProtocolError::InvalidValue {
            field: "op".to_string(),
            value: other,
        }),
    }
}

fn decode_common_command(frame: &WhjFrame) -> Result<Feedback, ProtocolError> {
    let motor = module_id(frame.id)?;
    let data = frame.data_slice();
    if data.len() <= COMMON_SEQ_OFFSET {
        return Err(ProtocolError::InvalidLength {
            expected: COMMON_SEQ_OFFSET + 1,
            actual: data.len(),
        });
    }
    let op = data[COMMON_OP_OFFSET];
    let register = data[COMMON_REGISTER_OFFSET];
    let seq = data[COMMON_SEQ_OFFSET];

    let Some(parameter) = registry::by_register(register) else {
        return Ok(Feedback::Error {
            motor,
            seq,
            kind: ResponseErrorKind::UnknownParameter { register },
        });
    };

    match op {
        OP_READ => Ok(Feedback::Echo(CommandEcho::Get {
            motor,
            parameter,
            seq,
        })),
        OP_WRITE => {
            let raw = parameter
                .data_type
                .decode_raw(&data[COMMAND_VALUE_OFFSET..])?;
            // IAP 标志写 0 即上线握手帧
            if parameter.register == RegisterAddress::IapFlag && raw == 0 {
                return Ok(Feedback::Echo(CommandEcho::Online { motor, seq }));
            }
            Ok(Feedback::Echo(CommandEcho::Set {
                motor,
                parameter,
                seq,
                raw,
            }))
        },
        other => Err(ProtocolError::InvalidValue {
            field: "op".to_string(),
            value: other,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::ids::{ID_COMMON_RESPONSE_BASE, ID_SERVO_TELEMETRY_BASE, ID_STATE_RESPONSE_BASE};
    use crate::registry::lookup;

    fn motor(id: u8) -> MotorId {
        MotorId::new(id).unwrap()
    }

    /// 构造读应答帧
    fn read_response(id: u8, register: u8, seq: u8, value: &[u8]) -> WhjFrame {
        let mut payload = vec![OP_READ, register, seq, STATUS_OK];
        payload.extend_from_slice(value);
        WhjFrame::new(ID_COMMON_RESPONSE_BASE | id as u16, &payload)
    }

    #[test]
    fn test_decode_value_known_fixture() {
        // CUR_POSITION raw 1_234_567 → 123.4567 deg
        let frame = read_response(0x01, 0x14, 5, &1_234_567i32.to_le_bytes());
        match decode(&frame).unwrap() {
            Feedback::Value {
                motor: m,
                parameter,
                seq,
                raw,
            } => {
                assert_eq!(m, motor(1));
                assert_eq!(parameter.name, "CUR_POSITION");
                assert_eq!(seq, 5);
                assert_eq!(raw, 1_234_567);
                assert!((parameter.raw_to_engineering(raw) - 123.4567).abs() < 1e-9);
            },
            other => panic!("expected Value, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_write_ack() {
        let payload = [OP_WRITE, 0x0A, 9, STATUS_OK];
        let frame = WhjFrame::new(ID_COMMON_RESPONSE_BASE | 0x01, &payload);
        match decode(&frame).unwrap() {
            Feedback::Ack {
                parameter, seq, ..
            } => {
                assert_eq!(parameter.name, "SYS_ENABLE_DRIVER");
                assert_eq!(seq, 9);
            },
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_register_is_error_not_failure() {
        let frame = read_response(0x01, 0x7E, 3, &[0x00]);
        match decode(&frame).unwrap() {
            Feedback::Error { seq, kind, .. } => {
                assert_eq!(seq, 3);
                assert_eq!(kind, ResponseErrorKind::UnknownParameter { register: 0x7E });
            },
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_status() {
        let payload = [OP_WRITE, 0x0A, 1, 0x05];
        let frame = WhjFrame::new(ID_COMMON_RESPONSE_BASE | 0x02, &payload);
        match decode(&frame).unwrap() {
            Feedback::Error { kind, .. } => {
                assert_eq!(kind, ResponseErrorKind::Rejected { status: 0x05 });
            },
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_state_report() {
        let mut payload = [0u8; STATE_RESPONSE_LEN];
        payload[STATE_SEQ_OFFSET] = 0x11;
        payload[STATE_FAULT_OFFSET..STATE_FAULT_OFFSET + 2].copy_from_slice(&0x0002u16.to_le_bytes());
        payload[STATE_VOLTAGE_OFFSET..STATE_VOLTAGE_OFFSET + 2].copy_from_slice(&2412u16.to_le_bytes());
        payload[STATE_TEMP_OFFSET..STATE_TEMP_OFFSET + 2].copy_from_slice(&366i16.to_le_bytes());
        payload[STATE_ENABLE_OFFSET] = 1;
        payload[STATE_BRAKE_OFFSET] = 0;
        payload[STATE_POSITION_OFFSET..STATE_POSITION_OFFSET + 4]
            .copy_from_slice(&900_000i32.to_le_bytes());
        payload[STATE_CURRENT_OFFSET..STATE_CURRENT_OFFSET + 4].copy_from_slice(&(-250i32).to_le_bytes());

        let frame = WhjFrame::new(ID_STATE_RESPONSE_BASE | 0x03, &payload);
        // 17 字节量化为 DLC 20
        assert_eq!(frame.len, 20);

        match decode(&frame).unwrap() {
            Feedback::State(report) => {
                assert_eq!(report.motor, motor(3));
                assert_eq!(report.seq, 0x11);
                assert!(report.fault.over_voltage());
                assert!(!report.fault.is_clear());
                assert!((report.voltage_v() - 24.12).abs() < 1e-9);
                assert!((report.temperature_c() - 36.6).abs() < 1e-9);
                assert_eq!(report.enable_state, 1);
                assert!((report.position_deg() - 90.0).abs() < 1e-9);
                assert_eq!(report.current_ma(), -250.0);
            },
            other => panic!("expected State, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_telemetry() {
        let mut payload = [0u8; TELEMETRY_LEN];
        payload[TELEMETRY_CURRENT_OFFSET..TELEMETRY_CURRENT_OFFSET + 4]
            .copy_from_slice(&120i32.to_le_bytes());
        payload[TELEMETRY_VELOCITY_OFFSET..TELEMETRY_VELOCITY_OFFSET + 4]
            .copy_from_slice(&50i32.to_le_bytes());
        payload[TELEMETRY_POSITION_OFFSET..TELEMETRY_POSITION_OFFSET + 4]
            .copy_from_slice(&1_800_000i32.to_le_bytes());
        payload[TELEMETRY_FAULT_OFFSET..TELEMETRY_FAULT_OFFSET + 2]
            .copy_from_slice(&0u16.to_le_bytes());

        let frame = WhjFrame::new(ID_SERVO_TELEMETRY_BASE | 0x07, &payload).with_timestamp(42);
        match decode(&frame).unwrap() {
            Feedback::Telemetry(telemetry) => {
                assert_eq!(telemetry.motor, motor(7));
                assert_eq!(telemetry.current_ma(), 120.0);
                assert!((telemetry.velocity_rpm() - 1.0).abs() < 1e-9);
                assert!((telemetry.position_deg() - 180.0).abs() < 1e-9);
                assert!(telemetry.fault.is_clear());
                assert_eq!(telemetry.timestamp_us, 42);
            },
            other => panic!("expected Telemetry, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_state_frame_rejected() {
        let frame = WhjFrame::new(ID_STATE_RESPONSE_BASE | 0x03, &[0x11, 0x00, 0x00]);
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn test_unclassifiable_id_rejected() {
        let frame = WhjFrame::new(0x201, &[0x00; 4]);
        assert!(decode(&frame).is_err());
    }

    #[test]
    fn test_set_roundtrip_via_echo() {
        // encode(Set) 再 decode 得到同一原始值（编码自校验）
        let parameter = lookup("TAG_SPEED").unwrap();
        let raw = parameter.engineering_to_raw(100.0).unwrap();
        let command = Command::Set {
            motor: motor(1),
            parameter,
            raw,
        };
        let frames = command.to_frames(4);
        match decode(&frames[0]).unwrap() {
            Feedback::Echo(CommandEcho::Set {
                parameter: p,
                seq,
                raw: decoded,
                ..
            }) => {
                assert_eq!(p.name, "TAG_SPEED");
                assert_eq!(seq, 4);
                assert_eq!(decoded, raw);
                // 工程值在一个标度单位内还原
                assert!((p.raw_to_engineering(decoded) - 100.0).abs() <= p.scale);
            },
            other => panic!("expected Echo(Set), got {other:?}"),
        }
    }

    #[test]
    fn test_online_frame_echo() {
        let frames = Command::Online { motor: motor(9) }.to_frames(1);
        match decode(&frames[0]).unwrap() {
            Feedback::Echo(CommandEcho::Online { motor: m, seq }) => {
                assert_eq!(m, motor(9));
                assert_eq!(seq, 1);
            },
            other => panic!("expected Echo(Online), got {other:?}"),
        }
    }

    #[test]
    fn test_fault_flags_names() {
        let flags = FaultFlags::from(0x0009u16); // bit0 + bit3
        let names = flags.active_names();
        assert_eq!(names, vec!["FOC_RATE_TOO_HIGH", "OVER_TEMPERATURE"]);
    }
}
