//! 发送队列中的指令包
//!
//! 一条指令编码后可能是多帧（V1 运动控制是 0x132 + 0x130），
//! 打包成一个 `TxPackage` 入队，TX 线程按顺序连续发送，不会和其他指令交错。

use ranger_protocol::{FrameBuffer, RangerFrame};

/// 指令包
#[derive(Debug, Clone)]
pub struct TxPackage {
    /// 指令名称（用于日志）
    name: &'static str,
    frames: FrameBuffer,
}

impl TxPackage {
    pub fn new(name: &'static str, frames: FrameBuffer) -> Self {
        Self { name, frames }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &RangerFrame> {
        self.frames.iter()
    }
}
