//! 协议版本探测
//!
//! 两个入口：
//! - [`detect_on_adapter`]：连接时、RX/TX 线程启动之前，直接读适配器
//! - [`detect_with_hooks`]：连接之后，通过帧钩子旁听接收循环
//!
//! 探测只看帧特征（见 [`ranger_protocol::detect_version`]），
//! 不会修改当前会话使用的协议版本。

use crate::DriverError;
use crate::hooks::FrameCallback;
use crate::state::RangerContext;
use crossbeam_channel::Sender;
use ranger_can::{CanError, RxAdapter, TxAdapter};
use ranger_protocol::{Command, FrameCodec, ProtocolVersion, RangerFrame, V2Codec, detect_version};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 默认探测超时
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(3);

/// 在适配器上阻塞探测协议版本
///
/// 先发送一次 V2 版本查询（V2 底盘回复 0x4A2，V1 底盘忽略该 ID），
/// 然后被动监听，直到收到带版本特征的帧或超时。
///
/// # 错误
/// - `ProtocolDetectionTimeout`: 超时时间内没有可识别的帧
/// - `Can`: 接收端出现超时以外的错误
pub fn detect_on_adapter(
    rx: &mut impl RxAdapter,
    tx: &mut impl TxAdapter,
    timeout: Duration,
) -> Result<ProtocolVersion, DriverError> {
    match V2Codec::new().encode(&Command::VersionRequest) {
        Ok(frames) => {
            for frame in frames {
                if let Err(e) = tx.send(frame) {
                    // 发不出去也不要紧，还可以被动监听周期性反馈
                    warn!("Failed to send version probe: {}", e);
                    break;
                }
            }
        },
        Err(e) => warn!("Failed to encode version probe: {}", e),
    }

    let start = Instant::now();
    let mut frames_seen = 0u64;

    while start.elapsed() < timeout {
        match rx.receive() {
            Ok(frame) => {
                frames_seen += 1;
                if let Some(version) = detect_version(&frame) {
                    info!(
                        "Detected protocol {} from ID 0x{:03X} after {:?}",
                        version,
                        frame.id,
                        start.elapsed()
                    );
                    return Ok(version);
                }
            },
            Err(CanError::Timeout) => continue,
            Err(e) => return Err(e.into()),
        }
    }

    warn!(
        "Protocol detection timed out after {:?} ({} frames seen, none identifiable)",
        timeout, frames_seen
    );
    Err(DriverError::ProtocolDetectionTimeout { timeout })
}

/// 旁听接收循环的探测回调
struct VersionProbe {
    tx: Sender<ProtocolVersion>,
}

impl FrameCallback for VersionProbe {
    fn on_frame_received(&self, frame: &RangerFrame) {
        if let Some(version) = detect_version(frame) {
            let _ = self.tx.try_send(version);
        }
    }
}

/// 连接后确认总线协议版本
///
/// 在 `ctx.hooks` 中临时注册一个回调，等待第一帧带版本特征的帧。
/// 检测结果与 `active` 不一致时返回 `ProtocolMismatch`，当前会话的版本保持不变。
pub fn detect_with_hooks(
    ctx: &RangerContext,
    active: ProtocolVersion,
    timeout: Duration,
) -> Result<ProtocolVersion, DriverError> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    let probe: Arc<dyn FrameCallback> = Arc::new(VersionProbe { tx });

    ctx.hooks
        .write()
        .map_err(|_| DriverError::PoisonedLock)?
        .add_callback(probe.clone());

    let result = rx.recv_timeout(timeout);

    if let Ok(mut hooks) = ctx.hooks.write() {
        hooks.remove_callback(&probe);
    }

    match result {
        Ok(detected) if detected == active => {
            debug!("Bus protocol confirmed as {}", detected);
            Ok(detected)
        },
        Ok(detected) => {
            warn!("Protocol mismatch: session uses {}, bus speaks {}", active, detected);
            Err(DriverError::ProtocolMismatch { active, detected })
        },
        Err(_) => Err(DriverError::ProtocolDetectionTimeout { timeout }),
    }
}
