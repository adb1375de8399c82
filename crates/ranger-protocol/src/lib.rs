//! # Ranger Protocol
//!
//! Ranger 底盘 CAN 总线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `ids`: V1/V2 两个协议版本的 CAN ID 常量
//! - `version`: 协议版本枚举与版本特征识别
//! - `messages`: 反馈帧对应的类型化消息（SI 单位）
//! - `commands`: 控制指令定义
//! - `codec`: V1/V2 编解码器（唯一知道字节偏移和缩放系数的地方）
//!
//! ## 字节序
//!
//! 协议使用 Motorola (MSB) 高位在前（大端字节序）。

pub mod codec;
pub mod commands;
pub mod ids;
pub mod messages;
pub mod version;

pub use codec::{FrameBuffer, FrameCodec, V1Codec, V2Codec, codec_for, detect_version};
pub use commands::*;
pub use messages::*;
pub use version::ProtocolVersion;

/// CAN 2.0 标准帧的统一抽象
///
/// `RangerFrame` 是协议层和硬件层之间的中间抽象：
///
/// ```text
/// Protocol Layer (ranger-protocol)
///     ↓ FrameCodec::decode / FrameCodec::encode
/// RangerFrame (此类型)
///     ↓ 转换逻辑在 CAN 层实现
/// CAN Layer (ranger-can)
///     ↓ SocketCAN / Mock 适配器
/// Bus
/// ```
///
/// - **Copy**：固定 8 字节数据，无堆分配
/// - **时间戳**：`timestamp_us` 由适配器填写，仅用于诊断，状态聚合使用本地单调时钟
///
/// ```rust
/// use ranger_protocol::RangerFrame;
///
/// let frame = RangerFrame::new_standard(0x221, &[1, 2, 3, 4]);
/// assert_eq!(frame.id(), 0x221);
/// assert_eq!(frame.data_slice(), &[1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangerFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl RangerFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 附加接收时间戳（适配器使用）
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }
}

use thiserror::Error;

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length for ID 0x{id:03X}: expected {expected}, got {actual}")]
    InvalidLength {
        id: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid CAN ID: 0x{id:X}")]
    InvalidCanId { id: u32 },

    #[error("Invalid value for field {field}: {value}")]
    InvalidValue { field: &'static str, value: u8 },

    #[error("Checksum mismatch for ID 0x{id:03X}: expected 0x{expected:02X}, got 0x{actual:02X}")]
    ChecksumMismatch { id: u32, expected: u8, actual: u8 },

    #[error("Value {value} for field {field} does not fit the wire encoding")]
    ValueOverflow { field: &'static str, value: f64 },

    #[error("{operation} is not supported by protocol {version}")]
    Unsupported {
        version: ProtocolVersion,
        operation: &'static str,
    },
}

/// 大端字节序转 i32
pub fn bytes_to_i32_be(bytes: [u8; 4]) -> i32 {
    i32::from_be_bytes(bytes)
}

/// 大端字节序转 i16
pub fn bytes_to_i16_be(bytes: [u8; 2]) -> i16 {
    i16::from_be_bytes(bytes)
}

/// 大端字节序转 u16
pub fn bytes_to_u16_be(bytes: [u8; 2]) -> u16 {
    u16::from_be_bytes(bytes)
}

/// i16 转大端字节序
pub fn i16_to_bytes_be(value: i16) -> [u8; 2] {
    value.to_be_bytes()
}
