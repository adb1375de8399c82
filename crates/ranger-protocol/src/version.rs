//! 协议版本定义

use std::fmt;

/// CAN 协议版本
///
/// 在连接时确定一次，此后在整个会话内不可变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
#[repr(u8)]
pub enum ProtocolVersion {
    /// 尚未确定
    #[default]
    Unknown = 0,
    /// 旧版协议（Ranger Mini V1，帧尾带校验和）
    V1 = 1,
    /// 当前协议
    V2 = 2,
}

impl ProtocolVersion {
    /// 是否已确定为具体版本
    pub fn is_known(self) -> bool {
        !matches!(self, ProtocolVersion::Unknown)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolVersion::Unknown => write!(f, "UNKNOWN"),
            ProtocolVersion::V1 => write!(f, "AGX_V1"),
            ProtocolVersion::V2 => write!(f, "AGX_V2"),
        }
    }
}
