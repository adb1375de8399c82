//! Builder 模式实现
//!
//! 提供链式构造 `Ranger` 实例的便捷方式。

use crate::detector::DEFAULT_DETECT_TIMEOUT;
use crate::dispatcher::MotionLimits;
use crate::error::DriverError;
use crate::pipeline::PipelineConfig;
use crate::ranger::Ranger;
#[cfg(target_os = "linux")]
use ranger_can::SocketCanAdapter;
use ranger_can::SplittableAdapter;
#[cfg(not(target_os = "linux"))]
use ranger_can::{CanDeviceError, CanDeviceErrorKind, CanError};
use ranger_protocol::ProtocolVersion;
use std::time::Duration;

/// 协议版本选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolSelection {
    /// 连接时探测（默认）
    #[default]
    Auto,
    /// 预先指定，跳过探测
    Fixed(ProtocolVersion),
}

impl ProtocolSelection {
    /// 按车型标志预选：Mini V1 使用 V1 协议，其余车型使用 V2
    pub fn from_mini_v1_flag(is_mini_v1: bool) -> Self {
        if is_mini_v1 {
            Self::Fixed(ProtocolVersion::V1)
        } else {
            Self::Fixed(ProtocolVersion::V2)
        }
    }

    /// 预选的版本；`Fixed(Unknown)` 等同于 `Auto`
    pub fn fixed(self) -> Option<ProtocolVersion> {
        match self {
            Self::Fixed(version) if version.is_known() => Some(version),
            _ => None,
        }
    }
}

/// Ranger Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use ranger_driver::{ProtocolSelection, RangerBuilder};
/// use ranger_protocol::ProtocolVersion;
///
/// let ranger = RangerBuilder::new()
///     .interface("can0")
///     .protocol(ProtocolSelection::Fixed(ProtocolVersion::V2))
///     .build()
///     .unwrap();
/// ```
pub struct RangerBuilder {
    /// SocketCAN 接口名（如 "can0"）
    interface: Option<String>,
    protocol: ProtocolSelection,
    pipeline_config: Option<PipelineConfig>,
    motion_limits: Option<MotionLimits>,
    /// `Auto` 模式下的探测超时
    detect_timeout: Duration,
}

impl RangerBuilder {
    pub fn new() -> Self {
        Self {
            interface: None,
            protocol: ProtocolSelection::Auto,
            pipeline_config: None,
            motion_limits: None,
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
        }
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn protocol(mut self, protocol: ProtocolSelection) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn pipeline_config(mut self, config: PipelineConfig) -> Self {
        self.pipeline_config = Some(config);
        self
    }

    pub fn motion_limits(mut self, limits: MotionLimits) -> Self {
        self.motion_limits = Some(limits);
        self
    }

    pub fn detect_timeout(mut self, timeout: Duration) -> Self {
        self.detect_timeout = timeout;
        self
    }

    /// 打开 SocketCAN 接口并启动
    ///
    /// # 错误
    /// - `InvalidArgument`: 没有指定接口名
    /// - `Can`: 接口打开失败
    /// - `ProtocolDetectionTimeout`: `Auto` 模式下探测超时
    #[cfg(target_os = "linux")]
    pub fn build(self) -> Result<Ranger, DriverError> {
        let interface = self.require_interface()?;
        let can = SocketCanAdapter::new(interface)?;
        self.build_with(can)
    }

    #[cfg(not(target_os = "linux"))]
    pub fn build(self) -> Result<Ranger, DriverError> {
        let interface = self.require_interface()?;
        Err(DriverError::Can(CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!("SocketCAN is only available on Linux (interface '{}')", interface),
        ))))
    }

    /// 使用调用方提供的适配器启动（测试中传入 mock 适配器）
    pub fn build_with<C>(self, can: C) -> Result<Ranger, DriverError>
    where
        C: SplittableAdapter + Send + 'static,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        Ranger::start(
            can,
            self.protocol,
            self.pipeline_config.unwrap_or_default(),
            self.motion_limits.unwrap_or_default(),
            self.detect_timeout,
        )
    }

    fn require_interface(&self) -> Result<String, DriverError> {
        match self.interface.as_deref() {
            Some(name) if !name.trim().is_empty() => Ok(name.to_string()),
            _ => Err(DriverError::InvalidArgument(
                "CAN interface name is required".to_string(),
            )),
        }
    }
}

impl Default for RangerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
