//! 配置文件
//!
//! TOML 格式，所有字段都可以省略：
//!
//! ```toml
//! interface = "can0"
//! protocol = "v2"            # auto | v1 | v2
//! detect_timeout_ms = 3000
//!
//! [pipeline]
//! receive_timeout_ms = 2
//! tx_queue_capacity = 16
//!
//! [limits]
//! max_linear_velocity = 1.5
//! ```

use ranger_driver::{MotionLimits, PipelineConfig, ProtocolSelection, RangerBuilder};
use ranger_protocol::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// 配置文件中的协议选项
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolSetting {
    #[default]
    Auto,
    V1,
    V2,
}

impl From<ProtocolSetting> for ProtocolSelection {
    fn from(setting: ProtocolSetting) -> Self {
        match setting {
            ProtocolSetting::Auto => ProtocolSelection::Auto,
            ProtocolSetting::V1 => ProtocolSelection::Fixed(ProtocolVersion::V1),
            ProtocolSetting::V2 => ProtocolSelection::Fixed(ProtocolVersion::V2),
        }
    }
}

/// SDK 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RangerConfig {
    /// SocketCAN 接口名
    pub interface: String,
    pub protocol: ProtocolSetting,
    /// `auto` 模式下的探测超时（毫秒）
    pub detect_timeout_ms: u64,
    pub pipeline: PipelineConfig,
    pub limits: MotionLimits,
}

impl Default for RangerConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            protocol: ProtocolSetting::Auto,
            detect_timeout_ms: 3000,
            pipeline: PipelineConfig::default(),
            limits: MotionLimits::default(),
        }
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive, got {}", field, value)))
    }
}

impl RangerConfig {
    /// 解析并校验 TOML 文本
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: RangerConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并校验配置文件
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn detect_timeout(&self) -> Duration {
        Duration::from_millis(self.detect_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interface.trim().is_empty() {
            return Err(ConfigError::Invalid("interface must not be empty".to_string()));
        }
        if self.detect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("detect_timeout_ms must be positive".to_string()));
        }
        // 0 会让接收循环退化为忙轮询
        if self.pipeline.receive_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.receive_timeout_ms must be positive".to_string(),
            ));
        }
        if self.pipeline.tx_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.tx_queue_capacity must be positive".to_string(),
            ));
        }
        positive("limits.max_linear_velocity", self.limits.max_linear_velocity)?;
        positive("limits.max_angular_velocity", self.limits.max_angular_velocity)?;
        positive("limits.max_steer_angle", self.limits.max_steer_angle)?;
        positive("limits.max_steer_angle_parallel", self.limits.max_steer_angle_parallel)?;
        Ok(())
    }

    /// 按配置生成驱动层 Builder（不含接口名以外的任何运行时状态）
    pub fn builder(&self) -> RangerBuilder {
        RangerBuilder::new()
            .interface(self.interface.clone())
            .protocol(self.protocol.into())
            .pipeline_config(self.pipeline.clone())
            .motion_limits(self.limits.clone())
            .detect_timeout(self.detect_timeout())
    }
}
