//! CLI 配置文件
//!
//! `~/.config/whj-cli/config.toml`。只记录接口名与超时策略；
//! 接口本身的比特率/FD 模式配置属于系统工具（`ip link`），不在此处。

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use whj_sdk::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// CAN 接口名（如 "can0"）
    pub interface: String,
    /// 读写/状态请求超时（毫秒）
    pub request_timeout_ms: u64,
    /// 上线握手超时（毫秒）
    pub handshake_timeout_ms: u64,
    /// 连续超时强制 Offline 的阈值
    pub offline_threshold: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            request_timeout_ms: 1000,
            handshake_timeout_ms: 1000,
            offline_threshold: 3,
        }
    }
}

impl CliConfig {
    /// 配置文件路径
    pub fn path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("无法确定用户配置目录")?;
        Ok(dir.join("whj-cli").join("config.toml"))
    }

    /// 读取配置；文件不存在时返回默认值
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("解析配置文件失败: {}", path.display()))
    }

    /// 写回配置
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("创建配置目录失败: {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("序列化配置失败")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 转换为驱动层策略
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
            offline_threshold: self.offline_threshold,
        }
    }
}
