//! 交互式控制台（REPL 模式）
//!
//! 自由文本动词在此解析为结构化指令；核心层只消费结构化指令。

use crate::config::CliConfig;
use crate::format;
use crate::monitor;
use anyhow::{Result, bail};
use rustyline::error::ReadlineError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use whj_sdk::protocol::MotorId;
use whj_sdk::WhjBus;

enum ReplFlow {
    Continue,
    Exit,
}

/// 解析电机 ID（十进制或 0x 前缀十六进制）
pub fn parse_motor_id(text: &str) -> Result<MotorId> {
    let raw = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16)?
    } else {
        text.parse::<u8>()?
    };
    Ok(MotorId::new(raw)?)
}

fn show_help() {
    println!("\nAvailable commands:");
    println!("  online <motor_id>                   - Bring motor online (handshake)");
    println!("  state <motor_id>                    - Query joint state");
    println!("  get <motor_id> <parameter>          - Read parameter value");
    println!("  set <motor_id> <parameter> <value>  - Write parameter value");
    println!("  params                              - List known parameters");
    println!("  monitor [duration]                  - Monitor CAN traffic (seconds)");
    println!("  status                              - Show bus counters");
    println!("  log start [file] | log stop         - Session logging scope");
    println!("  help                                - Show this help");
    println!("  exit                                - Exit the console");
    println!("\nExample:");
    println!("  online 1");
    println!("  set 1 TAG_SPEED 100");
    println!("  monitor 30\n");
}

fn dispatch(bus: &WhjBus, config: &CliConfig, parts: &[&str]) -> Result<ReplFlow> {
    match parts[0] {
        "exit" | "quit" => return Ok(ReplFlow::Exit),
        "help" => show_help(),
        "params" => print!("{}", format::format_parameter_table()),
        "status" => print!(
            "{}",
            format::format_status(&config.interface, &bus.metrics(), &bus.traffic())
        ),
        "online" => {
            if parts.len() != 2 {
                bail!("Usage: online <motor_id>");
            }
            let motor = parse_motor_id(parts[1])?;
            bus.online(motor)?;
            println!("Motor {} is online", motor);
        },
        "state" => {
            if parts.len() != 2 {
                bail!("Usage: state <motor_id>");
            }
            let motor = parse_motor_id(parts[1])?;
            let report = bus.state(motor)?;
            print!("{}", format::format_state(&report));
        },
        "get" => {
            if parts.len() != 3 {
                bail!("Usage: get <motor_id> <parameter>");
            }
            let motor = parse_motor_id(parts[1])?;
            let reading = bus.get(motor, parts[2])?;
            print!("{}", format::format_reading(&reading));
        },
        "set" => {
            if parts.len() != 4 {
                bail!("Usage: set <motor_id> <parameter> <value>");
            }
            let motor = parse_motor_id(parts[1])?;
            let value: f64 = parts[3].parse()?;
            bus.set(motor, parts[2], value)?;
            println!("OK");
        },
        "monitor" => {
            let duration_secs: u64 = if parts.len() > 1 { parts[1].parse()? } else { 10 };
            monitor::run_monitor(bus, Duration::from_secs(duration_secs))?;
        },
        "log" => match parts.get(1).copied() {
            Some("start") => {
                let path = match parts.get(2) {
                    Some(p) => p.to_string(),
                    None => {
                        let unix_secs = SystemTime::now()
                            .duration_since(UNIX_EPOCH)
                            .map(|d| d.as_secs())
                            .unwrap_or(0);
                        format!("whj_session_{unix_secs}.csv")
                    },
                };
                // 文件创建在 CLI 层；核心只拿到 Write sink
                let file = std::fs::File::create(&path)?;
                bus.start_log(Box::new(file))?;
                println!("Logging to {path}");
            },
            Some("stop") => {
                let summary = bus.stop_log()?;
                println!("Logging stopped ({} records)", summary.records_written);
            },
            _ => bail!("Usage: log start [file] | log stop"),
        },
        other => {
            println!("Unknown command: {other}");
            println!("Type 'help' for available commands");
        },
    }
    Ok(ReplFlow::Continue)
}

/// 运行交互式控制台
pub fn run_repl(bus: WhjBus, config: &CliConfig) -> Result<()> {
    monitor::init_interrupt_handler();

    println!("\nWHJ Servo Console ({})", config.interface);
    println!("Type 'help' for available commands");

    let mut rl = rustyline::DefaultEditor::new()?;
    loop {
        match rl.readline("whj> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                let parts: Vec<&str> = line.split_whitespace().collect();
                match dispatch(&bus, config, &parts) {
                    Ok(ReplFlow::Continue) => {},
                    Ok(ReplFlow::Exit) => break,
                    Err(e) => println!("Error: {e}"),
                }
            },
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    // 退出时关闭残留日志作用域，保证落盘
    if bus.is_logging() {
        if let Ok(summary) = bus.stop_log() {
            println!("Logging stopped ({} records)", summary.records_written);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_motor_id_decimal_and_hex() {
        assert_eq!(parse_motor_id("1").unwrap().raw(), 1);
        assert_eq!(parse_motor_id("0x2A").unwrap().raw(), 0x2A);
        assert_eq!(parse_motor_id("0X0a").unwrap().raw(), 0x0A);
        assert!(parse_motor_id("0").is_err());
        assert!(parse_motor_id("256").is_err());
        assert!(parse_motor_id("motor").is_err());
    }
}
