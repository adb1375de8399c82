//! 驱动层模块
//!
//! 本模块提供 Ranger 底盘的设备驱动功能，包括：
//! - RX/TX 线程管理（接收循环是状态的唯一写者）
//! - 状态聚合（ArcSwap 无锁快照读取）
//! - 协议版本探测（V1/V2）
//! - 指令分发（参数校验 + 指令模式门控）
//! - 钩子系统：帧收发回调
//!
//! # 使用场景
//!
//! 适用于需要直接访问帧级信息或自定义适配器的场景。
//! 大多数用户应该使用 `ranger-sdk` 提供的 `RangerRobot`。

mod builder;
pub mod command;
pub mod connection;
pub mod detector;
pub mod dispatcher;
mod error;
pub mod hooks;
pub mod metrics;
pub mod pipeline;
mod ranger;
pub mod state;

pub use builder::{ProtocolSelection, RangerBuilder};
pub use command::TxPackage;
pub use connection::{AtomicConnectionState, ConnectionState};
pub use dispatcher::{CommandDispatcher, MotionLimits};
pub use error::DriverError;
pub use hooks::{FrameCallback, HookManager};
pub use metrics::{MetricsSnapshot, RangerMetrics};
pub use pipeline::{PipelineConfig, rx_loop, tx_loop};
pub use ranger::Ranger;
pub use state::*;
