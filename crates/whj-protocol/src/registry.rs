//! 参数寄存器目录
//!
//! 将人类可读的参数名映射到寄存器地址、数据类型、标度和读写权限。
//! 目录在编译期固定，运行期只读。
//!
//! 32 位宽参数沿用固件寄存器表的低半地址作为唯一地址
//! （如 `CUR_POSITION` = 0x14）。

use crate::ProtocolError;
use num_enum::TryFromPrimitive;

// ============================================================================
// 标度因子（engineering = raw * scale）
// ============================================================================

pub const SCALE_VOLTAGE: f64 = 0.01; // V
pub const SCALE_TEMPERATURE: f64 = 0.1; // ℃
pub const SCALE_POSITION: f64 = 0.0001; // deg
pub const SCALE_TARGET_SPEED: f64 = 0.002; // RPM
pub const SCALE_ACTUAL_SPEED: f64 = 0.02; // RPM
pub const SCALE_CURRENT: f64 = 1.0; // mA
pub const SCALE_UNIT: f64 = 1.0;

/// 寄存器地址
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum RegisterAddress {
    // 系统寄存器
    SysId = 0x01,
    SysFwVersion = 0x03,
    SysError = 0x04,
    SysVoltage = 0x05,
    SysTemp = 0x06,
    SysReduRatio = 0x07,
    // 系统标志寄存器
    SysEnableDriver = 0x0A,
    SysEnableOnPower = 0x0B,
    SysSaveToFlash = 0x0C,
    SysAbsolutePosAutoCalib = 0x0D,
    SysSetZeroPos = 0x0E,
    SysClearError = 0x0F,
    // 当前值寄存器（32 位宽，低半地址）
    CurCurrent = 0x10,
    CurSpeed = 0x12,
    CurPosition = 0x14,
    // 电机型号寄存器
    MotModelId0 = 0x2A,
    MotModelId1 = 0x2B,
    MotModelId2 = 0x2C,
    MotModelId3 = 0x2D,
    MotModelId4 = 0x2E,
    MotModelId5 = 0x2F,
    // 目标值寄存器
    TagWorkMode = 0x30,
    TagCurrent = 0x32,
    TagSpeed = 0x34,
    TagPosition = 0x36,
    SpeedFeedForwardSwitch = 0x39,
    // 限幅寄存器
    LitMaxCurrent = 0x40,
    LitMaxSpeed = 0x41,
    LitMaxAcc = 0x42,
    LitMaxDec = 0x43,
    LitMinPosition = 0x44,
    LitMaxPosition = 0x46,
    // IAP 寄存器
    IapFlag = 0x49,
    // 伺服环路增益寄存器
    SevCurrentP = 0x51,
    SevCurrentI = 0x52,
    SevCurrentD = 0x53,
    SevSpeedP = 0x54,
    SevSpeedI = 0x55,
    SevSpeedD = 0x56,
    SevSpeedDs = 0x57,
    SevPositionP = 0x58,
    SevPositionI = 0x59,
    SevPositionD = 0x5A,
    SevPositionDs = 0x5B,
    // 故障寄存器
    Error = 0x78,
}

/// 寄存器数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    U8,
    U16,
    I16,
    U32,
    I32,
}

impl DataType {
    /// 线上表示宽度（字节）
    pub fn width(self) -> usize {
        match self {
            DataType::U8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 => 4,
        }
    }

    /// 可表示的原始值范围
    pub fn range(self) -> (i64, i64) {
        match self {
            DataType::U8 => (0, u8::MAX as i64),
            DataType::U16 => (0, u16::MAX as i64),
            DataType::I16 => (i16::MIN as i64, i16::MAX as i64),
            DataType::U32 => (0, u32::MAX as i64),
            DataType::I32 => (i32::MIN as i64, i32::MAX as i64),
        }
    }

    /// 原始值编码为小端字节（调用方保证 raw 已在范围内）
    pub fn encode_raw(self, raw: i64, out: &mut [u8]) -> usize {
        let width = self.width();
        let bytes = (raw as u64).to_le_bytes();
        out[..width].copy_from_slice(&bytes[..width]);
        width
    }

    /// 从小端字节解码原始值（有符号类型做符号扩展）
    pub fn decode_raw(self, bytes: &[u8]) -> Result<i64, ProtocolError> {
        let width = self.width();
        if bytes.len() < width {
            return Err(ProtocolError::InvalidLength {
                expected: width,
                actual: bytes.len(),
            });
        }
        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&bytes[..width]);
        let unsigned = u64::from_le_bytes(buf);
        let value = match self {
            DataType::U8 | DataType::U16 | DataType::U32 => unsigned as i64,
            DataType::I16 => i16::from_le_bytes([bytes[0], bytes[1]]) as i64,
            DataType::I32 => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
        };
        Ok(value)
    }
}

/// 读写权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    ReadWrite,
}

/// 参数目录条目
///
/// 目录构建后不可变，所有字段为 `'static`。
#[derive(Debug, Clone, Copy)]
pub struct Parameter {
    pub name: &'static str,
    pub register: RegisterAddress,
    pub data_type: DataType,
    pub scale: f64,
    pub access: Access,
    pub description: &'static str,
    pub unit: &'static str,
}

impl Parameter {
    const fn new(
        name: &'static str,
        register: RegisterAddress,
        data_type: DataType,
        scale: f64,
        access: Access,
        description: &'static str,
        unit: &'static str,
    ) -> Self {
        Self {
            name,
            register,
            data_type,
            scale,
            access,
            description,
            unit,
        }
    }

    /// 原始值 → 工程值
    pub fn raw_to_engineering(&self, raw: i64) -> f64 {
        raw as f64 * self.scale
    }

    /// 工程值 → 原始值（四舍五入后按类型范围校验）
    pub fn engineering_to_raw(&self, value: f64) -> Result<i64, ProtocolError> {
        let scaled = (value / self.scale).round();
        let (min, max) = self.data_type.range();
        if !scaled.is_finite() || scaled < min as f64 || scaled > max as f64 {
            return Err(ProtocolError::OutOfRange {
                name: self.name,
                value,
            });
        }
        Ok(scaled as i64)
    }

    /// 是否可写
    pub fn is_writable(&self) -> bool {
        self.access == Access::ReadWrite
    }
}

use Access::{ReadOnly as RO, ReadWrite as RW};
use DataType::*;
use RegisterAddress as Reg;

/// 参数目录（固件寄存器表的全集，顺序即 `list()` 的展示顺序）
pub const PARAMETERS: &[Parameter] = &[
    Parameter::new("SYS_ID", Reg::SysId, U16, SCALE_UNIT, RW, "System ID", ""),
    Parameter::new("SYS_FW_VERSION", Reg::SysFwVersion, U16, SCALE_UNIT, RO, "Firmware version", ""),
    Parameter::new("SYS_ERROR", Reg::SysError, U16, SCALE_UNIT, RO, "Error code", ""),
    Parameter::new("SYS_VOLTAGE", Reg::SysVoltage, U16, SCALE_VOLTAGE, RO, "System voltage", "V"),
    Parameter::new("SYS_TEMP", Reg::SysTemp, I16, SCALE_TEMPERATURE, RO, "System temperature", "°C"),
    Parameter::new("SYS_REDU_RATIO", Reg::SysReduRatio, U16, SCALE_UNIT, RO, "Reduction ratio", ""),
    Parameter::new("SYS_ENABLE_DRIVER", Reg::SysEnableDriver, U8, SCALE_UNIT, RW, "Enable driver", ""),
    Parameter::new("SYS_ENABLE_ON_POWER", Reg::SysEnableOnPower, U8, SCALE_UNIT, RW, "Enable on power", ""),
    Parameter::new("SYS_SAVE_TO_FLASH", Reg::SysSaveToFlash, U8, SCALE_UNIT, RW, "Save to flash", ""),
    Parameter::new(
        "SYS_ABSOLUTE_POS_AUTO_CALIB",
        Reg::SysAbsolutePosAutoCalib,
        U8,
        SCALE_UNIT,
        RW,
        "Absolute position auto calibration",
        "",
    ),
    Parameter::new("SYS_SET_ZERO_POS", Reg::SysSetZeroPos, U8, SCALE_UNIT, RW, "Set zero position", ""),
    Parameter::new("SYS_CLEAR_ERROR", Reg::SysClearError, U8, SCALE_UNIT, RW, "Clear error", ""),
    Parameter::new("CUR_CURRENT", Reg::CurCurrent, I32, SCALE_CURRENT, RO, "Present current", "mA"),
    Parameter::new("CUR_SPEED", Reg::CurSpeed, I32, SCALE_ACTUAL_SPEED, RO, "Present speed", "RPM"),
    Parameter::new("CUR_POSITION", Reg::CurPosition, I32, SCALE_POSITION, RO, "Present position", "deg"),
    Parameter::new("MOT_MODEL_ID0", Reg::MotModelId0, U8, SCALE_UNIT, RO, "Motor model ID 0", ""),
    Parameter::new("MOT_MODEL_ID1", Reg::MotModelId1, U8, SCALE_UNIT, RO, "Motor model ID 1", ""),
    Parameter::new("MOT_MODEL_ID2", Reg::MotModelId2, U8, SCALE_UNIT, RO, "Motor model ID 2", ""),
    Parameter::new("MOT_MODEL_ID3", Reg::MotModelId3, U8, SCALE_UNIT, RO, "Motor model ID 3", ""),
    Parameter::new("MOT_MODEL_ID4", Reg::MotModelId4, U8, SCALE_UNIT, RO, "Motor model ID 4", ""),
    Parameter::new("MOT_MODEL_ID5", Reg::MotModelId5, U8, SCALE_UNIT, RO, "Motor model ID 5", ""),
    Parameter::new("TAG_WORK_MODE", Reg::TagWorkMode, U8, SCALE_UNIT, RW, "Target work mode", ""),
    Parameter::new("TAG_CURRENT", Reg::TagCurrent, I32, SCALE_CURRENT, RW, "Target current", "mA"),
    Parameter::new("TAG_SPEED", Reg::TagSpeed, I32, SCALE_TARGET_SPEED, RW, "Target speed", "RPM"),
    Parameter::new("TAG_POSITION", Reg::TagPosition, I32, SCALE_POSITION, RO, "Target position", "deg"),
    Parameter::new(
        "SPEED_FEED_FORWARD_SWITCH",
        Reg::SpeedFeedForwardSwitch,
        U8,
        SCALE_UNIT,
        RO,
        "Speed feed forward switch",
        "",
    ),
    Parameter::new("LIT_MAX_CURRENT", Reg::LitMaxCurrent, U16, SCALE_CURRENT, RO, "Current limit", "mA"),
    Parameter::new("LIT_MAX_SPEED", Reg::LitMaxSpeed, U16, SCALE_UNIT, RO, "Speed limit", "RPM"),
    Parameter::new("LIT_MAX_ACC", Reg::LitMaxAcc, U16, SCALE_UNIT, RO, "Acceleration limit", "RPM/s"),
    Parameter::new("LIT_MAX_DEC", Reg::LitMaxDec, U16, SCALE_UNIT, RO, "Deceleration limit", "RPM/s"),
    Parameter::new(
        "LIT_MIN_POSITION",
        Reg::LitMinPosition,
        I32,
        SCALE_POSITION,
        RO,
        "Minimum position limit",
        "deg",
    ),
    Parameter::new(
        "LIT_MAX_POSITION",
        Reg::LitMaxPosition,
        I32,
        SCALE_POSITION,
        RO,
        "Maximum position limit",
        "deg",
    ),
    Parameter::new("IAP_FLAG", Reg::IapFlag, U8, SCALE_UNIT, RW, "IAP staging flag", ""),
    Parameter::new("SEV_CURRENT_P", Reg::SevCurrentP, U16, SCALE_UNIT, RO, "Current loop P gain", ""),
    Parameter::new("SEV_CURRENT_I", Reg::SevCurrentI, U16, SCALE_UNIT, RO, "Current loop I gain", ""),
    Parameter::new("SEV_CURRENT_D", Reg::SevCurrentD, U16, SCALE_UNIT, RO, "Current loop D gain", ""),
    Parameter::new("SEV_SPEED_P", Reg::SevSpeedP, U16, SCALE_UNIT, RO, "Speed loop P gain", ""),
    Parameter::new("SEV_SPEED_I", Reg::SevSpeedI, U16, SCALE_UNIT, RO, "Speed loop I gain", ""),
    Parameter::new("SEV_SPEED_D", Reg::SevSpeedD, U16, SCALE_UNIT, RO, "Speed loop D gain", ""),
    Parameter::new("SEV_SPEED_DS", Reg::SevSpeedDs, U16, SCALE_UNIT, RO, "Speed loop dead zone", ""),
    Parameter::new("SEV_POSITION_P", Reg::SevPositionP, U16, SCALE_UNIT, RO, "Position loop P gain", ""),
    Parameter::new("SEV_POSITION_I", Reg::SevPositionI, U16, SCALE_UNIT, RO, "Position loop I gain", ""),
    Parameter::new("SEV_POSITION_D", Reg::SevPositionD, U16, SCALE_UNIT, RO, "Position loop D gain", ""),
    Parameter::new("SEV_POSITION_DS", Reg::SevPositionDs, U16, SCALE_UNIT, RO, "Position loop dead zone", ""),
    Parameter::new("ERROR", Reg::Error, U16, SCALE_UNIT, RO, "Fault flags", ""),
];

/// 按名称查找参数
///
/// 目录条目数固定且很小，线性扫描即可。
pub fn lookup(name: &str) -> Option<&'static Parameter> {
    PARAMETERS.iter().find(|p| p.name == name)
}

/// 按寄存器地址查找参数（解码路径使用）
pub fn by_register(register: u8) -> Option<&'static Parameter> {
    let register = RegisterAddress::try_from(register).ok()?;
    PARAMETERS.iter().find(|p| p.register == register)
}

/// 参数目录全表（顺序固定，供发现/帮助展示）
pub fn list() -> &'static [Parameter] {
    PARAMETERS
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lookup_known_names() {
        let p = lookup("CUR_POSITION").unwrap();
        assert_eq!(p.register, RegisterAddress::CurPosition);
        assert_eq!(p.data_type, DataType::I32);
        assert_eq!(p.scale, SCALE_POSITION);
        assert_eq!(p.access, Access::ReadOnly);

        let p = lookup("SYS_ENABLE_DRIVER").unwrap();
        assert_eq!(p.register, RegisterAddress::SysEnableDriver);
        assert!(p.is_writable());
    }

    #[test]
    fn test_lookup_unknown_name() {
        assert!(lookup("NO_SUCH_PARAMETER").is_none());
    }

    #[test]
    fn test_by_register() {
        let p = by_register(0x14).unwrap();
        assert_eq!(p.name, "CUR_POSITION");
        assert!(by_register(0x7E).is_none());
    }

    #[test]
    fn test_names_and_registers_unique() {
        for (i, a) in PARAMETERS.iter().enumerate() {
            for b in PARAMETERS.iter().skip(i + 1) {
                assert_ne!(a.name, b.name);
                assert_ne!(a.register, b.register);
            }
        }
    }

    #[test]
    fn test_engineering_conversion() {
        let p = lookup("SYS_VOLTAGE").unwrap();
        assert!((p.raw_to_engineering(2412) - 24.12).abs() < 1e-9);
        assert_eq!(p.engineering_to_raw(24.12).unwrap(), 2412);
    }

    #[test]
    fn test_engineering_to_raw_rounds() {
        let p = lookup("SYS_TEMP").unwrap();
        assert_eq!(p.engineering_to_raw(36.64).unwrap(), 366);
        assert_eq!(p.engineering_to_raw(-0.26).unwrap(), -3);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let p = lookup("SYS_ENABLE_DRIVER").unwrap();
        assert!(p.engineering_to_raw(256.0).is_err());
        assert!(p.engineering_to_raw(-1.0).is_err());

        let p = lookup("SYS_TEMP").unwrap();
        assert!(p.engineering_to_raw(40000.0).is_err());
    }

    #[test]
    fn test_datatype_decode_sign_extension() {
        assert_eq!(DataType::I16.decode_raw(&[0xFF, 0xFF]).unwrap(), -1);
        assert_eq!(DataType::U16.decode_raw(&[0xFF, 0xFF]).unwrap(), 65535);
        assert_eq!(
            DataType::I32.decode_raw(&[0x00, 0x00, 0x00, 0x80]).unwrap(),
            i32::MIN as i64
        );
    }

    #[test]
    fn test_datatype_encode_width() {
        let mut buf = [0u8; 8];
        assert_eq!(DataType::U8.encode_raw(0x7F, &mut buf), 1);
        assert_eq!(buf[0], 0x7F);
        assert_eq!(DataType::I32.encode_raw(-2, &mut buf), 4);
        assert_eq!(&buf[..4], &[0xFE, 0xFF, 0xFF, 0xFF]);
    }

    proptest! {
        /// 任意参数、范围内的任意原始值：raw → engineering → raw 恒等
        #[test]
        fn prop_scale_roundtrip(index in 0..PARAMETERS.len(), raw in any::<i32>()) {
            let p = &PARAMETERS[index];
            let (min, max) = p.data_type.range();
            let raw = (raw as i64).clamp(min, max);
            let eng = p.raw_to_engineering(raw);
            prop_assert_eq!(p.engineering_to_raw(eng).unwrap(), raw);
        }

        /// 编码后的字节经解码恒等（有符号与无符号均覆盖）
        #[test]
        fn prop_wire_roundtrip(index in 0..PARAMETERS.len(), raw in any::<i32>()) {
            let p = &PARAMETERS[index];
            let (min, max) = p.data_type.range();
            let raw = (raw as i64).clamp(min, max);
            let mut buf = [0u8; 8];
            let width = p.data_type.encode_raw(raw, &mut buf);
            prop_assert_eq!(p.data_type.decode_raw(&buf[..width]).unwrap(), raw);
        }
    }
}
