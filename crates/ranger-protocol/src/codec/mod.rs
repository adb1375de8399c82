//! V1/V2 编解码器
//!
//! 编解码器是唯一知道字节偏移、缩放系数和校验规则的地方。
//! 版本选择只发生一次（[`codec_for`]），之后上层只通过 [`FrameCodec`]
//! trait 对象与具体版本交互，不再出现按版本分支的代码。

mod v1;
mod v2;

pub use v1::{V1Codec, v1_checksum};
pub use v2::V2Codec;

use crate::commands::{Command, MotionCommand};
use crate::messages::RangerMessage;
use crate::version::ProtocolVersion;
use crate::{ProtocolError, RangerFrame, ids};
use smallvec::SmallVec;

/// 单条指令编码后的帧序列
///
/// 目前最长的指令是 V1 运动控制（0x132 + 0x130，共 2 帧），
/// 全部放在栈上。
pub type FrameBuffer = SmallVec<[RangerFrame; 2]>;

/// 协议编解码器
///
/// - `decode` 对未知 ID 返回 `Ok(None)`：总线上出现无关流量是正常的
/// - 长度或校验错误返回 `Err`，调用方丢弃该帧，不做任何部分更新
/// - `encode` 在数值越界时返回 `Err`，不会静默截断
pub trait FrameCodec: Send + Sync {
    /// 此编解码器对应的协议版本
    fn version(&self) -> ProtocolVersion;

    /// 解析一帧反馈数据
    fn decode(&self, frame: &RangerFrame) -> Result<Option<RangerMessage>, ProtocolError>;

    /// 把指令编码为一帧或多帧，调用方需按返回顺序发送
    fn encode(&self, command: &Command) -> Result<FrameBuffer, ProtocolError>;

    /// 从 `encode` 生成的帧序列中还原运动指令（用于回环校验与测试）
    fn decode_motion_command(&self, frames: &[RangerFrame]) -> Result<MotionCommand, ProtocolError>;
}

/// 根据协议版本选择编解码器
///
/// `ProtocolVersion::Unknown` 没有对应的编解码器。
pub fn codec_for(version: ProtocolVersion) -> Option<Box<dyn FrameCodec>> {
    match version {
        ProtocolVersion::V1 => Some(Box::new(V1Codec::new())),
        ProtocolVersion::V2 => Some(Box::new(V2Codec::new())),
        ProtocolVersion::Unknown => None,
    }
}

/// 根据单帧特征判断协议版本
///
/// - V2：ID 为 0x211 / 0x221 / 0x4A2 且长度为 8
/// - V1：ID 为 0x151 / 0x131，长度为 8 且校验和正确
///
/// 无法判断时返回 `None`。
pub fn detect_version(frame: &RangerFrame) -> Option<ProtocolVersion> {
    if frame.len != 8 || frame.is_extended {
        return None;
    }

    match frame.id {
        ids::V2_ID_SYSTEM_STATE | ids::V2_ID_MOTION_STATE | ids::V2_ID_VERSION_RESPONSE => {
            Some(ProtocolVersion::V2)
        },
        ids::V1_ID_SYSTEM_STATE | ids::V1_ID_MOTION_STATE => {
            (v1_checksum(frame.id, &frame.data[..7]) == frame.data[7]).then_some(ProtocolVersion::V1)
        },
        _ => None,
    }
}

// ============================================================================
// 编解码辅助函数
// ============================================================================

/// 校验数据长度（必须完全相等）
pub(crate) fn check_len(frame: &RangerFrame, expected: usize) -> Result<(), ProtocolError> {
    if frame.len as usize != expected {
        return Err(ProtocolError::InvalidLength {
            id: frame.id,
            expected,
            actual: frame.len as usize,
        });
    }
    Ok(())
}

/// 物理量按系数量化为 i16
///
/// 非有限值或超出 i16 范围时返回 `ValueOverflow`。
pub(crate) fn quantize_i16(
    field: &'static str,
    value: f64,
    scale: f64,
) -> Result<i16, ProtocolError> {
    let raw = (value * scale).round();
    if !raw.is_finite() || raw < i16::MIN as f64 || raw > i16::MAX as f64 {
        return Err(ProtocolError::ValueOverflow { field, value });
    }
    Ok(raw as i16)
}

/// 枚举字节转换，未定义的取值映射为 `InvalidValue`
pub(crate) fn decode_enum<T: TryFrom<u8>>(field: &'static str, value: u8) -> Result<T, ProtocolError> {
    T::try_from(value).map_err(|_| ProtocolError::InvalidValue { field, value })
}
