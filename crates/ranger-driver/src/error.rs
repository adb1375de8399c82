//! 驱动层错误类型定义

use ranger_can::CanError;
use ranger_protocol::{ProtocolError, ProtocolVersion};
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 驱动错误（打开失败、收发失败）
    #[error("CAN driver error: {0}")]
    Can(#[from] CanError),

    /// 协议编解码错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 命令通道已关闭（TX 线程退出）
    #[error("Command channel closed")]
    ChannelClosed,

    /// 命令通道已满
    #[error("Command channel full")]
    ChannelFull,

    /// 操作超时
    #[error("Operation timeout")]
    Timeout,

    /// 超时时间内没有收到可识别版本的帧
    #[error("Protocol version detection timed out after {timeout:?}")]
    ProtocolDetectionTimeout { timeout: Duration },

    /// 探测到的版本与当前会话使用的版本不一致
    #[error("Protocol mismatch: session uses {active}, bus speaks {detected}")]
    ProtocolMismatch {
        active: ProtocolVersion,
        detected: ProtocolVersion,
    },

    /// 参数越界或非法（不会被静默截断）
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// 执行器槽位越界
    #[error("Index {index} out of range (len: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// 尚未使能指令控制模式
    #[error("Commanded mode is not enabled, call enable_commanded_mode() first")]
    CommandedModeDisabled,

    /// 未连接或连接已失效
    #[error("Not connected")]
    NotConnected,

    /// 已经连接
    #[error("Already connected")]
    AlreadyConnected,

    /// 当前协议版本不支持该操作
    #[error("{operation} is not supported by protocol {version}")]
    Unsupported {
        version: ProtocolVersion,
        operation: &'static str,
    },

    /// 锁被毒化（线程 panic）
    #[error("Poisoned lock (thread panic)")]
    PoisonedLock,

    /// IO 线程错误
    #[error("IO thread error: {0}")]
    IoThread(String),
}

impl DriverError {
    /// 协议层的 `Unsupported` 提升为驱动层的同名错误，其余原样包装
    pub(crate) fn from_encode(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Unsupported { version, operation } => {
                DriverError::Unsupported { version, operation }
            },
            other => DriverError::Protocol(other),
        }
    }
}
