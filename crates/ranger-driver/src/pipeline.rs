//! Pipeline IO 循环模块
//!
//! - `rx_loop`：从适配器读帧 → 触发钩子 → 解码 → 合并进 `RangerContext`
//! - `tx_loop`：从指令队列取 `TxPackage` → 按顺序发送
//!
//! 单帧错误（长度、校验、未知 ID、索引越界）只计数和记日志，不会让循环退出；
//! 只有传输层错误才会结束循环并把连接标记为 `Failed`。

use crate::command::TxPackage;
use crate::connection::{AtomicConnectionState, ConnectionState};
use crate::metrics::RangerMetrics;
use crate::state::RangerContext;
use crossbeam_channel::{Receiver, TryRecvError};
use ranger_can::{CanError, RxAdapter, TxAdapter};
use ranger_protocol::{FrameCodec, RangerFrame};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// Pipeline 配置
///
/// # Example
///
/// ```
/// use ranger_driver::PipelineConfig;
///
/// let config = PipelineConfig {
///     receive_timeout_ms: 5,
///     ..Default::default()
/// };
/// assert_eq!(config.tx_queue_capacity, 16);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PipelineConfig {
    /// CAN 接收超时（毫秒），决定 RX 线程检查退出标志的周期
    pub receive_timeout_ms: u64,
    /// 指令队列容量，满时新指令返回 `ChannelFull`
    pub tx_queue_capacity: usize,
    /// 指令队列为空时 TX 线程的休眠时间（微秒）
    pub tx_idle_sleep_us: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 2,
            tx_queue_capacity: 16,
            tx_idle_sleep_us: 100,
        }
    }
}

impl PipelineConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn tx_idle_sleep(&self) -> Duration {
        Duration::from_micros(self.tx_idle_sleep_us)
    }
}

/// 处理一帧：钩子 → 解码 → 合并
///
/// 解码失败或合并失败时状态保持不变。
pub(crate) fn process_frame(
    frame: &RangerFrame,
    codec: &dyn FrameCodec,
    ctx: &RangerContext,
    metrics: &RangerMetrics,
) {
    // try_read：注册回调期间宁可漏触发，也不阻塞接收
    if let Ok(hooks) = ctx.hooks.try_read() {
        hooks.trigger_all(frame);
    }

    match codec.decode(frame) {
        Ok(Some(message)) => match ctx.merge(&message) {
            Ok(()) => {
                metrics.rx_frames_decoded.fetch_add(1, Ordering::Relaxed);
            },
            Err(e) => {
                metrics.rx_anomalies.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping {} from ID 0x{:03X}: {}", message.kind(), frame.id, e);
            },
        },
        Ok(None) => {
            metrics.rx_unknown_ids.fetch_add(1, Ordering::Relaxed);
            trace!("Ignoring frame with unknown ID 0x{:X}", frame.id);
        },
        Err(e) => {
            metrics.rx_decode_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Failed to decode frame: {}", e);
        },
    }
}

/// 接收循环（RX 线程入口）
///
/// 是 `RangerContext` 的唯一写者。
///
/// # 退出条件
///
/// - `is_running` 被置为 false（主动断开）
/// - 适配器返回超时以外的任何错误：连接状态置为 `Failed`，同时通知 TX 线程退出
pub fn rx_loop(
    mut rx: impl RxAdapter,
    codec: Arc<dyn FrameCodec>,
    ctx: Arc<RangerContext>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RangerMetrics>,
    connection: Arc<AtomicConnectionState>,
) {
    loop {
        // Acquire: 看到 false 时，断开流程之前的写入都已可见
        if !is_running.load(Ordering::Acquire) {
            trace!("RX thread: is_running flag is false, exiting");
            break;
        }

        let frame = match rx.receive() {
            Ok(frame) => {
                metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
                frame
            },
            Err(CanError::Timeout) => {
                // 总线安静是正常情况，状态只是停止更新
                metrics.rx_timeouts.fetch_add(1, Ordering::Relaxed);
                continue;
            },
            Err(e) => {
                error!("RX thread: transport error, stopping receive loop: {}", e);
                if connection.transition(ConnectionState::Connected, ConnectionState::Failed) {
                    info!("Connection marked as failed");
                }
                // Release: 连接状态的写入对看到 false 的线程可见
                is_running.store(false, Ordering::Release);
                break;
            },
        };

        process_frame(&frame, codec.as_ref(), &ctx, &metrics);
    }

    trace!("RX thread: loop exited");
}

/// 发送循环（TX 线程入口）
///
/// 队列为空时用 `spin_sleep` 短暂休眠，避免忙等又保持低延迟。
/// 一个 `TxPackage` 中的帧连续发送；其中一帧失败时放弃该包剩余的帧，
/// 避免 V1 运动指令只发出半条。
pub fn tx_loop(
    mut tx: impl TxAdapter,
    cmd_rx: Receiver<TxPackage>,
    config: PipelineConfig,
    ctx: Arc<RangerContext>,
    is_running: Arc<AtomicBool>,
    metrics: Arc<RangerMetrics>,
    connection: Arc<AtomicConnectionState>,
) {
    let idle_sleep = config.tx_idle_sleep();

    'outer: loop {
        if !is_running.load(Ordering::Acquire) {
            trace!("TX thread: is_running flag is false, exiting");
            break;
        }

        let package = match cmd_rx.try_recv() {
            Ok(package) => package,
            Err(TryRecvError::Empty) => {
                spin_sleep::sleep(idle_sleep);
                continue;
            },
            Err(TryRecvError::Disconnected) => {
                trace!("TX thread: command channel disconnected");
                break;
            },
        };

        for frame in package.iter() {
            match tx.send(*frame) {
                Ok(()) => {
                    if let Ok(hooks) = ctx.hooks.try_read() {
                        hooks.trigger_all_sent(frame);
                    }
                    metrics.tx_frames_total.fetch_add(1, Ordering::Relaxed);
                },
                Err(e) => {
                    error!("TX thread: failed to send {}: {}", package.name(), e);
                    metrics.tx_errors.fetch_add(1, Ordering::Relaxed);

                    if e.is_fatal() {
                        error!("TX thread: fatal error detected, stopping IO threads");
                        connection.transition(ConnectionState::Connected, ConnectionState::Failed);
                        is_running.store(false, Ordering::Release);
                        break 'outer;
                    }
                    break;
                },
            }
        }
    }

    trace!("TX thread: loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_can::{MockCanAdapter, SplittableAdapter};
    use ranger_protocol::{Command, MotionCommand, ProtocolVersion, codec_for};
    use std::thread;
    use std::time::Instant;

    fn v2_codec() -> Arc<dyn FrameCodec> {
        Arc::from(codec_for(ProtocolVersion::V2).unwrap())
    }

    fn motion_state_frame(linear_mm: i16, angular_mrad: i16) -> RangerFrame {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&linear_mm.to_be_bytes());
        data[2..4].copy_from_slice(&angular_mrad.to_be_bytes());
        RangerFrame::new_standard(0x221, &data)
    }

    fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    #[test]
    fn test_process_frame_counts_each_outcome() {
        let codec = v2_codec();
        let ctx = RangerContext::new();
        let metrics = RangerMetrics::new();

        process_frame(&motion_state_frame(500, 100), codec.as_ref(), &ctx, &metrics);
        process_frame(&RangerFrame::new_standard(0x7FF, &[0; 8]), codec.as_ref(), &ctx, &metrics);
        process_frame(&RangerFrame::new_standard(0x221, &[0; 4]), codec.as_ref(), &ctx, &metrics);
        // 0x258 是第 8 路高速反馈，超出 4 个轮子
        process_frame(&RangerFrame::new_standard(0x258, &[0; 8]), codec.as_ref(), &ctx, &metrics);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.rx_frames_decoded, 1);
        assert_eq!(snapshot.rx_unknown_ids, 1);
        assert_eq!(snapshot.rx_decode_errors, 1);
        assert_eq!(snapshot.rx_anomalies, 1);
        assert_eq!(ctx.core_state().motion_state.linear_velocity, 0.5);
    }

    #[test]
    fn test_truncated_frame_leaves_state_unchanged() {
        let codec = v2_codec();
        let ctx = RangerContext::new();
        let metrics = RangerMetrics::new();

        process_frame(&motion_state_frame(300, -200), codec.as_ref(), &ctx, &metrics);
        let before = ctx.core_state();

        let mut truncated = motion_state_frame(900, 900);
        truncated.len = 7;
        process_frame(&truncated, codec.as_ref(), &ctx, &metrics);

        assert_eq!(ctx.core_state(), before);
    }

    #[test]
    fn test_rx_loop_merges_and_stops_on_flag() {
        let (adapter, bus) = MockCanAdapter::new();
        let (rx, _tx) = adapter.split().unwrap();
        let ctx = Arc::new(RangerContext::new());
        let metrics = Arc::new(RangerMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let connection = Arc::new(AtomicConnectionState::new(ConnectionState::Connected));

        let handle = {
            let (ctx, metrics, is_running, connection) =
                (ctx.clone(), metrics.clone(), is_running.clone(), connection.clone());
            thread::spawn(move || rx_loop(rx, v2_codec(), ctx, is_running, metrics, connection))
        };

        bus.inject(motion_state_frame(100, 0));
        bus.inject(motion_state_frame(250, 0));
        assert!(wait_until(Duration::from_secs(1), || {
            ctx.core_state().motion_state.linear_velocity == 0.25
        }));

        is_running.store(false, Ordering::Release);
        handle.join().unwrap();
        assert_eq!(connection.get(Ordering::Acquire), ConnectionState::Connected);
        assert_eq!(metrics.snapshot().rx_frames_decoded, 2);
    }

    #[test]
    fn test_rx_loop_marks_connection_failed_on_transport_error() {
        let (adapter, bus) = MockCanAdapter::new();
        let (rx, _tx) = adapter.split().unwrap();
        let ctx = Arc::new(RangerContext::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let connection = Arc::new(AtomicConnectionState::new(ConnectionState::Connected));

        bus.inject(motion_state_frame(400, 0));
        bus.close();

        rx_loop(
            rx,
            v2_codec(),
            ctx.clone(),
            is_running.clone(),
            Arc::new(RangerMetrics::new()),
            connection.clone(),
        );

        // 关闭前注入的帧仍然被处理
        assert_eq!(ctx.core_state().motion_state.linear_velocity, 0.4);
        assert_eq!(connection.get(Ordering::Acquire), ConnectionState::Failed);
        assert!(!is_running.load(Ordering::Acquire));
    }

    #[test]
    fn test_tx_loop_sends_package_in_order() {
        let (adapter, bus) = MockCanAdapter::new();
        let (_rx, tx) = adapter.split().unwrap();
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(4);
        let metrics = Arc::new(RangerMetrics::new());

        let codec = codec_for(ProtocolVersion::V1).unwrap();
        let frames = codec
            .encode(&Command::Motion(MotionCommand::new(0.5, 0.1, 0.0)))
            .unwrap();
        cmd_tx.send(TxPackage::new("motion command", frames)).unwrap();
        drop(cmd_tx);

        // 发送端已关闭：队列清空后循环自行退出
        tx_loop(
            tx,
            cmd_rx,
            PipelineConfig::default(),
            Arc::new(RangerContext::new()),
            Arc::new(AtomicBool::new(true)),
            metrics.clone(),
            Arc::new(AtomicConnectionState::new(ConnectionState::Connected)),
        );

        let ids: Vec<u32> = bus.take_sent().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x132, 0x130]);
        assert_eq!(metrics.snapshot().tx_frames_total, 2);
    }

    #[test]
    fn test_tx_loop_stops_on_fatal_send_error() {
        let (adapter, bus) = MockCanAdapter::new();
        let (_rx, tx) = adapter.split().unwrap();
        drop(bus);

        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(4);
        let frames = codec_for(ProtocolVersion::V1)
            .unwrap()
            .encode(&Command::Motion(MotionCommand::new(0.5, 0.1, 0.0)))
            .unwrap();
        cmd_tx.send(TxPackage::new("motion command", frames)).unwrap();

        let metrics = Arc::new(RangerMetrics::new());
        let is_running = Arc::new(AtomicBool::new(true));
        let connection = Arc::new(AtomicConnectionState::new(ConnectionState::Connected));

        // 发送端仍然存活：只有致命错误能让循环退出
        tx_loop(
            tx,
            cmd_rx,
            PipelineConfig::default(),
            Arc::new(RangerContext::new()),
            is_running.clone(),
            metrics.clone(),
            connection.clone(),
        );

        assert_eq!(connection.get(Ordering::Acquire), ConnectionState::Failed);
        assert!(!is_running.load(Ordering::Acquire));
        // 第一帧失败后整包放弃
        assert_eq!(metrics.snapshot().tx_errors, 1);
        assert_eq!(metrics.snapshot().tx_frames_total, 0);
        drop(cmd_tx);
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.receive_timeout(), Duration::from_millis(2));
        assert_eq!(config.tx_idle_sleep(), Duration::from_micros(100));
    }
}
