//! # Ranger CAN Adapter Layer
//!
//! CAN 硬件抽象层。驱动层只依赖这里的 trait，不关心底层是
//! SocketCAN 还是测试用的内存总线。

use std::time::Duration;
use thiserror::Error;

// 重新导出 ranger-protocol 中的 RangerFrame
pub use ranger_protocol::RangerFrame;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::{SocketCanAdapter, SocketCanRxAdapter, SocketCanTxAdapter};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBusHandle, MockCanAdapter, MockRxAdapter, MockTxAdapter};

/// CAN 适配层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
}

impl CanError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CanError::Timeout)
    }

    /// 通道已经不可用（设备消失、被关闭、无权限），IO 线程应当退出
    ///
    /// 超时、单帧构造失败和临时 I/O 错误（如发送缓冲区满）不算致命。
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Device(e) => e.is_fatal(),
            CanError::Io(_) | CanError::Timeout => false,
        }
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    NotFound,
    NoDevice,
    AccessDenied,
    InvalidFrame,
    Closed,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NoDevice
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::NotFound
                | CanDeviceErrorKind::Closed
        )
    }
}

/// 双向 CAN 通道
pub trait CanAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError>;
    fn receive(&mut self) -> Result<RangerFrame, CanError>;
    /// 设置 `receive()` 的超时，拆分前调用，两个半边都会继承
    fn set_receive_timeout(&mut self, _timeout: Duration) {}
}

/// 只读半边（RX 线程独占）
pub trait RxAdapter {
    /// 接收一帧；超时返回 `CanError::Timeout`
    fn receive(&mut self) -> Result<RangerFrame, CanError>;
}

/// 只写半边（TX 线程独占）
pub trait TxAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError>;
}

/// 可以拆分为独立 RX/TX 半边的适配器
pub trait SplittableAdapter: CanAdapter {
    type RxAdapter: RxAdapter;
    type TxAdapter: TxAdapter;
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError>;
}
