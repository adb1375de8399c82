//! 连接状态
//!
//! 接收循环遇到传输层错误时把状态置为 `Failed`，
//! 客户端随时可以读取，不需要等待任何线程。

use std::sync::atomic::{AtomicU8, Ordering};

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ConnectionState {
    /// 未连接，或已主动断开
    #[default]
    Disconnected = 0,
    /// RX/TX 线程正在运行
    Connected = 1,
    /// 传输层出错，接收循环已退出
    Failed = 2,
}

impl ConnectionState {
    /// 无效值按 `Disconnected` 处理
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connected,
            2 => Self::Failed,
            _ => Self::Disconnected,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }
}

/// 连接状态（原子版本，用于线程间共享）
#[derive(Debug)]
pub struct AtomicConnectionState {
    inner: AtomicU8,
}

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self, ordering: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.inner.load(ordering))
    }

    pub fn set(&self, state: ConnectionState, ordering: Ordering) {
        self.inner.store(state.as_u8(), ordering);
    }

    /// 只有当前状态等于 `current` 时才切换，返回是否切换成功
    ///
    /// 主动断开和接收循环失败可能同时发生，用它保证先到者生效。
    pub fn transition(&self, current: ConnectionState, new: ConnectionState) -> bool {
        self.inner
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Disconnected)
    }
}
