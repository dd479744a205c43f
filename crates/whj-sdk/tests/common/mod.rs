//! 集成测试公共设施：脚本化 mock 电机

use std::time::Duration;
use whj_can::mock::MockBusHandle;
use whj_driver::RetryPolicy;
use whj_protocol::{
    ID_COMMON_RESPONSE_BASE, ID_STATE_RESPONSE_BASE, MessageClass, MotorId, OP_READ, STATE_RESPONSE_LEN,
    STATUS_OK, WhjFrame, classify,
};

pub fn motor(id: u8) -> MotorId {
    MotorId::new(id).unwrap()
}

pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        request_timeout: Duration::from_millis(60),
        handshake_timeout: Duration::from_millis(60),
        offline_threshold: 3,
    }
}

/// 构造一条成功的通用应答帧（读应答回填 value 小端 4 字节）
pub fn common_response(command: &WhjFrame, value: i32) -> WhjFrame {
    let data = command.data_slice();
    let mut payload = vec![data[0], data[1], data[2], STATUS_OK];
    if data[0] == OP_READ {
        payload.extend_from_slice(&value.to_le_bytes());
    }
    WhjFrame::new(ID_COMMON_RESPONSE_BASE | (command.id & 0xFF), &payload)
}

/// 构造一条状态应答帧
pub fn state_response(command: &WhjFrame, position_raw: i32) -> WhjFrame {
    let seq = command.data_slice()[0];
    let mut payload = [0u8; STATE_RESPONSE_LEN];
    payload[0] = seq;
    // fault = 0
    payload[3..5].copy_from_slice(&2412u16.to_le_bytes()); // 24.12 V
    payload[5..7].copy_from_slice(&366i16.to_le_bytes()); // 36.6 ℃
    payload[7] = 1; // enable
    payload[9..13].copy_from_slice(&position_raw.to_le_bytes());
    payload[13..17].copy_from_slice(&100i32.to_le_bytes());
    WhjFrame::new(ID_STATE_RESPONSE_BASE | (command.id & 0xFF), &payload)
}

/// 即时应答器：通用指令与状态查询都按成功回应
pub fn install_auto_responder(handle: &MockBusHandle, value: i32) {
    handle.set_responder(move |frame| match classify(frame.id) {
        Ok(MessageClass::CommonCommand) => vec![common_response(frame, value)],
        Ok(MessageClass::StateRequest) => vec![state_response(frame, value)],
        _ => vec![],
    });
}

/// 延迟应答器：应答帧由独立线程在 delay 后注入
///
/// 应答器本体立即返回，不阻塞 IO 线程。
pub fn install_delayed_responder(handle: &MockBusHandle, delay: Duration, value: i32) {
    let injector = handle.clone();
    handle.set_responder(move |frame| {
        let reply = match classify(frame.id) {
            Ok(MessageClass::CommonCommand) => common_response(frame, value),
            Ok(MessageClass::StateRequest) => state_response(frame, value),
            _ => return vec![],
        };
        let injector = injector.clone();
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            injector.inject(reply);
        });
        vec![]
    });
}
