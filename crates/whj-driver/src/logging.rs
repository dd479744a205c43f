//! 日志作用域管理
//!
//! 格式与落盘在 `whj-tools`；本模块负责作用域生命周期：
//! 同一时刻至多一个作用域，完成序追加，stop 时保证已接受的记录落盘。
//!
//! 追加在作用域锁内整行写出，与 stop 串行化：并发在途的应答要么在
//! 关闭前完整写入，要么整条排除，不存在半行记录。

use crate::error::DriverError;
use parking_lot::Mutex;
use std::io::Write;
use tracing::warn;
use whj_tools::{LogRecord, LogSummary, SessionLog};

#[derive(Default)]
pub(crate) struct LogScope {
    inner: Mutex<Option<SessionLog>>,
}

impl LogScope {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 打开作用域并写出表头
    pub(crate) fn start(&self, sink: Box<dyn Write + Send>) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        if inner.is_some() {
            return Err(DriverError::AlreadyLogging);
        }
        let log = SessionLog::create(sink).map_err(|e| DriverError::Logging(e.to_string()))?;
        *inner = Some(log);
        Ok(())
    }

    /// 关闭作用域，刷新并返回摘要
    pub(crate) fn stop(&self) -> Result<LogSummary, DriverError> {
        let log = self.inner.lock().take().ok_or(DriverError::NotLogging)?;
        log.finish().map_err(|e| DriverError::Logging(e.to_string()))
    }

    /// 追加一条完成记录；作用域未打开时为空操作
    ///
    /// 写入失败只告警：日志旁路不得影响指令结果。
    pub(crate) fn append(&self, record: &LogRecord) {
        if let Some(log) = self.inner.lock().as_mut() {
            if let Err(e) = log.append(record) {
                warn!("Session log append failed: {}", e);
            }
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.inner.lock().is_some()
    }
}
