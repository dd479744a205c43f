//! # WHJ CLI
//!
//! WHJ 伺服执行器命令行控制台。
//!
//! ## 双模式
//!
//! ### One-shot 模式（脚本/CI）
//!
//! ```bash
//! whj-cli config set --interface can0
//! whj-cli online 1
//! whj-cli get 1 CUR_POSITION
//! whj-cli set 1 TAG_SPEED 100
//! ```
//!
//! ### REPL 模式（调试）
//!
//! ```bash
//! $ whj-cli shell
//! whj> online 1
//! whj> get 1 CUR_POSITION
//! whj> log start
//! whj> set 1 SYS_ENABLE_DRIVER 0
//! whj> log stop
//! whj> exit
//! ```
//!
//! 接口的比特率/FD 模式配置在系统层完成：
//! `sudo ip link set can0 up type can bitrate 1000000 dbitrate 5000000 fd on`

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::time::Duration;
use whj_sdk::WhjBus;

mod config;
mod format;
mod monitor;
mod repl;

use config::CliConfig;

/// WHJ CLI - 伺服执行器命令行工具
#[derive(Parser, Debug)]
#[command(name = "whj-cli")]
#[command(about = "Command-line console for WHJ servo actuators over CANFD", long_about = None)]
#[command(version)]
struct Cli {
    /// CAN 接口名（覆盖配置文件）
    #[arg(short, long, global = true)]
    interface: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动交互式控制台（REPL 模式）
    Shell,

    /// 上线握手
    Online {
        /// 电机 ID（十进制或 0x 前缀十六进制）
        motor: String,
    },

    /// 查询关节状态
    State { motor: String },

    /// 读寄存器
    Get { motor: String, parameter: String },

    /// 写寄存器（工程值）
    Set {
        motor: String,
        parameter: String,
        value: f64,
    },

    /// 列出参数目录
    Params,

    /// 监视总线流量
    Monitor {
        /// 持续时间（秒）
        #[arg(default_value_t = 10)]
        duration: u64,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// 显示当前配置
    Show,
    /// 修改并保存配置
    Set {
        /// 默认 CAN 接口名
        #[arg(long)]
        interface: Option<String>,
        /// 请求超时（毫秒）
        #[arg(long)]
        request_timeout_ms: Option<u64>,
        /// 连续超时强制 Offline 阈值
        #[arg(long)]
        offline_threshold: Option<u32>,
    },
}

/// 打开总线（接口必须已由系统工具启动）
#[cfg(target_os = "linux")]
fn connect(config: &CliConfig) -> Result<WhjBus> {
    let adapter = whj_sdk::can::SocketCanFdAdapter::new(&config.interface)?;
    Ok(WhjBus::new(adapter, None)?.with_policy(config.policy()))
}

#[cfg(not(target_os = "linux"))]
fn connect(_config: &CliConfig) -> Result<WhjBus> {
    anyhow::bail!("The SocketCAN backend requires Linux")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = CliConfig::load()?;
    if let Some(interface) = cli.interface {
        config.interface = interface;
    }

    match cli.command {
        Commands::Shell => {
            let bus = connect(&config)?;
            repl::run_repl(bus, &config)
        },
        Commands::Online { motor } => {
            let bus = connect(&config)?;
            let motor = repl::parse_motor_id(&motor)?;
            bus.online(motor)?;
            println!("Motor {} is online", motor);
            Ok(())
        },
        Commands::State { motor } => {
            let bus = connect(&config)?;
            let motor = repl::parse_motor_id(&motor)?;
            let report = bus.state(motor)?;
            print!("{}", format::format_state(&report));
            Ok(())
        },
        Commands::Get { motor, parameter } => {
            let bus = connect(&config)?;
            let motor = repl::parse_motor_id(&motor)?;
            let reading = bus.get(motor, &parameter)?;
            print!("{}", format::format_reading(&reading));
            Ok(())
        },
        Commands::Set {
            motor,
            parameter,
            value,
        } => {
            let bus = connect(&config)?;
            let motor = repl::parse_motor_id(&motor)?;
            bus.set(motor, &parameter, value)?;
            println!("OK");
            Ok(())
        },
        Commands::Params => {
            print!("{}", format::format_parameter_table());
            Ok(())
        },
        Commands::Monitor { duration } => {
            let bus = connect(&config)?;
            monitor::init_interrupt_handler();
            monitor::run_monitor(&bus, Duration::from_secs(duration))
        },
        Commands::Config(command) => match command {
            ConfigCommand::Show => {
                println!("config file: {}", CliConfig::path()?.display());
                println!("interface = {}", config.interface);
                println!("request_timeout_ms = {}", config.request_timeout_ms);
                println!("handshake_timeout_ms = {}", config.handshake_timeout_ms);
                println!("offline_threshold = {}", config.offline_threshold);
                Ok(())
            },
            ConfigCommand::Set {
                interface,
                request_timeout_ms,
                offline_threshold,
            } => {
                let mut stored = CliConfig::load()?;
                if let Some(interface) = interface {
                    stored.interface = interface;
                }
                if let Some(timeout) = request_timeout_ms {
                    stored.request_timeout_ms = timeout;
                }
                if let Some(threshold) = offline_threshold {
                    stored.offline_threshold = threshold;
                }
                stored.save()?;
                println!("Saved {}", CliConfig::path()?.display());
                Ok(())
            },
        },
    }
}
