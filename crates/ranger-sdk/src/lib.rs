//! Ranger SDK - 松灵 Ranger 系列轮式底盘 Rust SDK
//!
//! # 架构设计
//!
//! 分层结构，从底层到高层：
//!
//! - **CAN 层** (`can`): CAN 硬件抽象（SocketCAN、mock）
//! - **协议层** (`protocol`): V1/V2 帧编解码
//! - **驱动层** (`driver`): 收发线程、状态聚合、协议探测、指令分发
//! - **机器人接口** ([`RangerRobot`]): 面向应用的连接、指令与状态读取
//!
//! # 快速开始
//!
//! ```no_run
//! use ranger_sdk::prelude::*;
//!
//! ranger_sdk::init_logger();
//!
//! let mut robot = RangerRobot::new(false);
//! robot.connect("can0")?;
//! robot.enable_commanded_mode()?;
//! robot.set_motion_mode(MotionMode::DualAckermann)?;
//! robot.set_motion_command(0.3, 0.0, 0.0)?;
//! # Ok::<(), DriverError>(())
//! ```

pub mod config;
pub mod logging;
pub mod prelude;
mod robot;

pub use ranger_can as can;
pub use ranger_driver as driver;
pub use ranger_protocol as protocol;

pub use config::{ConfigError, ProtocolSetting, RangerConfig};
pub use logging::{init_logger, init_logger_with_filter};
pub use robot::{DEFAULT_VERSION_TIMEOUT, RangerRobot};

pub use ranger_can::{CanError, RangerFrame};
pub use ranger_driver::{
    ConnectionState, DriverError, MetricsSnapshot, MotionLimits, PipelineConfig, ProtocolSelection,
    RangerActuatorState, RangerCommonSensorState, RangerCoreState, Timestamp,
};
pub use ranger_protocol::{LightMode, MotionMode, ProtocolError, ProtocolVersion, VersionInfo};
