//! 钩子系统（Hook System）
//!
//! 在 CAN 帧接收/发送时触发自定义回调。协议探测器也是通过这里
//! 旁听总线的，不需要额外的接收路径。
//!
//! # 使用示例
//!
//! ```rust
//! use ranger_driver::hooks::{FrameCallback, HookManager};
//! use ranger_protocol::RangerFrame;
//! use std::sync::Arc;
//!
//! struct Counter;
//!
//! impl FrameCallback for Counter {
//!     fn on_frame_received(&self, _frame: &RangerFrame) {}
//! }
//!
//! let mut hooks = HookManager::new();
//! hooks.add_callback(Arc::new(Counter));
//! hooks.trigger_all(&RangerFrame::new_standard(0x221, &[0; 8]));
//! ```

use ranger_protocol::RangerFrame;
use std::sync::Arc;

/// 帧回调 Trait
///
/// 回调在 RX/TX 线程上同步执行，实现必须非阻塞：
/// 禁止 I/O 和长时间持锁，需要进一步处理时用 `try_send` 转发到 channel。
pub trait FrameCallback: Send + Sync {
    /// 当接收到 CAN 帧时调用（解码之前）
    fn on_frame_received(&self, frame: &RangerFrame);

    /// 当发送 CAN 帧成功后调用
    ///
    /// 只在 `tx.send()` 成功后触发，默认为空操作。
    fn on_frame_sent(&self, frame: &RangerFrame) {
        let _ = frame;
    }
}

/// 钩子管理器
///
/// 回调列表本身不是线程安全的，由 `RangerContext` 用 `RwLock` 包裹；
/// RX/TX 线程使用 `try_read`，永远不会因为回调注册而阻塞。
#[derive(Default)]
pub struct HookManager {
    callbacks: Vec<Arc<dyn FrameCallback>>,
}

impl HookManager {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            callbacks: Vec::new(),
        }
    }

    pub fn add_callback(&mut self, callback: Arc<dyn FrameCallback>) {
        self.callbacks.push(callback);
    }

    /// 按指针移除回调，返回是否找到
    pub fn remove_callback(&mut self, callback: &Arc<dyn FrameCallback>) -> bool {
        let before = self.callbacks.len();
        self.callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        self.callbacks.len() != before
    }

    pub fn trigger_all(&self, frame: &RangerFrame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_received(frame);
        }
    }

    pub fn trigger_all_sent(&self, frame: &RangerFrame) {
        for callback in self.callbacks.iter() {
            callback.on_frame_sent(frame);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }
}
