//! # 会话日志格式定义
//!
//! 每个日志作用域一个 CSV 文件：首行表头，之后每完成一条指令
//! （成功/超时/错误）追加一行，按完成顺序排列。
//!
//! 行内容一次性写出，不存在半行记录；`finish()` 保证落盘。

use crate::timestamp::Timestamp;
use anyhow::{Context, Result};
use std::io::{BufWriter, Write};

/// CSV 表头
pub const LOG_HEADER: &str =
    "timestamp_us,wall_time_us,motor_id,command,parameter,raw,engineering,outcome";

/// 单条指令的终结结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Ok,
    Timeout,
    Error(&'static str),
}

impl Outcome {
    /// CSV 列值
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "ok",
            Outcome::Timeout => "timeout",
            Outcome::Error(kind) => kind,
        }
    }
}

/// 单条已完成指令的记录
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: Timestamp,
    pub motor_id: u8,
    pub command: &'static str,
    pub parameter: Option<&'static str>,
    pub raw: Option<i64>,
    pub engineering: Option<f64>,
    pub outcome: Outcome,
}

impl LogRecord {
    fn to_csv_row(&self) -> String {
        let parameter = self.parameter.unwrap_or("");
        let raw = self.raw.map(|v| v.to_string()).unwrap_or_default();
        let engineering = self.engineering.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{},{}",
            self.timestamp.monotonic_us,
            self.timestamp.wall_us,
            self.motor_id,
            self.command,
            parameter,
            raw,
            engineering,
            self.outcome.as_str()
        )
    }
}

/// 日志作用域结束时的摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSummary {
    /// 已写出的数据行数（不含表头）
    pub records_written: u64,
}

/// 会话日志写入器
///
/// Sink 由调用方提供（文件打开/路径管理在 CLI 层），
/// 本类型只负责格式与落盘保证。
pub struct SessionLog {
    writer: BufWriter<Box<dyn Write + Send>>,
    records_written: u64,
}

impl SessionLog {
    /// 创建写入器并立即写出表头
    pub fn create(sink: Box<dyn Write + Send>) -> Result<Self> {
        let mut writer = BufWriter::new(sink);
        writeln!(writer, "{}", LOG_HEADER).context("写入日志表头失败")?;
        Ok(Self {
            writer,
            records_written: 0,
        })
    }

    /// 追加一条记录（整行一次写出）
    pub fn append(&mut self, record: &LogRecord) -> Result<()> {
        writeln!(self.writer, "{}", record.to_csv_row()).context("写入日志记录失败")?;
        self.records_written += 1;
        Ok(())
    }

    /// 已写出的记录数
    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// 刷新并结束作用域
    pub fn finish(mut self) -> Result<LogSummary> {
        self.writer.flush().context("刷新日志缓冲区失败")?;
        Ok(LogSummary {
            records_written: self.records_written,
        })
    }
}
