//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use ranger_sdk::prelude::*;
//! ```

pub use crate::RangerRobot;
pub use crate::config::RangerConfig;

// 状态
pub use ranger_driver::{
    ConnectionState, RangerActuatorState, RangerCommonSensorState, RangerCoreState, Timestamp,
};
pub use ranger_protocol::{LightMode, MotionMode, ProtocolVersion, VersionInfo};

// 错误类型
pub use ranger_can::CanError;
pub use ranger_driver::DriverError;
pub use ranger_protocol::ProtocolError;
