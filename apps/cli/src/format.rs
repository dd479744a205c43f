//! 应答的人类可读渲染

use whj_sdk::driver::MetricsSnapshot;
use whj_sdk::protocol::registry;
use whj_sdk::tools::TrafficStats;
use whj_sdk::{ParamReading, StateReport};

/// 读取结果
pub fn format_reading(reading: &ParamReading) -> String {
    let parameter = reading.parameter;
    let unit = if parameter.unit.is_empty() {
        String::new()
    } else {
        format!(" {}", parameter.unit)
    };
    format!(
        "\n=== Motor Response ===\nParameter: {} (0x{:02X})\nRaw: {}\nValue: {}{}\n===================\n",
        parameter.name, parameter.register as u8, reading.raw, reading.engineering, unit
    )
}

/// 状态查询结果
pub fn format_state(report: &StateReport) -> String {
    let faults = if report.fault.is_clear() {
        "none".to_string()
    } else {
        report.fault.active_names().join(", ")
    };
    format!(
        "\n=== Motor State ===\nModule ID: {}\nVoltage: {:.2} V\nTemperature: {:.1} °C\nEnable: {}\nBrake: {}\nPosition: {:.4} deg\nCurrent: {:.1} mA\nFaults: {}\n===================\n",
        report.motor,
        report.voltage_v(),
        report.temperature_c(),
        report.enable_state,
        report.brake_state,
        report.position_deg(),
        report.current_ma(),
        faults
    )
}

/// 参数目录（`params` 指令）
pub fn format_parameter_table() -> String {
    let mut out = String::from("Available parameters:\n");
    for parameter in registry::list() {
        let access = if parameter.is_writable() { "rw" } else { "ro" };
        let unit = if parameter.unit.is_empty() {
            String::new()
        } else {
            format!(" [{}]", parameter.unit)
        };
        out.push_str(&format!(
            "  {:<28} 0x{:02X}  {}  {}{}\n",
            parameter.name, parameter.register as u8, access, parameter.description, unit
        ));
    }
    out
}

/// `status` 指令：指标与流量
pub fn format_status(interface: &str, metrics: &MetricsSnapshot, traffic: &TrafficStats) -> String {
    let mut out = format!(
        "CAN interface: {}\nrx frames: {}  tx frames: {}\ntelemetry: {}  orphans: {}  decode errors: {}  request timeouts: {}\n",
        interface,
        metrics.rx_frames_total,
        metrics.tx_frames_total,
        metrics.telemetry_frames,
        metrics.orphan_frames,
        metrics.decode_errors,
        metrics.request_timeouts
    );
    if !traffic.is_empty() {
        out.push_str("per-motor traffic:\n");
        for (motor_id, counts) in traffic.iter() {
            out.push_str(&format!(
                "  motor 0x{:02X}: sent {}  received {}  timeouts {}\n",
                motor_id, counts.commands_sent, counts.responses_received, counts.timeouts
            ));
        }
    }
    out
}
