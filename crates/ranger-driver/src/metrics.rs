//! 性能指标模块
//!
//! 原子计数器，监控 RX/TX 链路的健康状况。任何线程都可以读取，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// Ranger 驱动实时指标
///
/// ```rust
/// use ranger_driver::RangerMetrics;
/// use std::sync::atomic::Ordering;
///
/// let metrics = RangerMetrics::new();
/// metrics.rx_frames_total.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(metrics.snapshot().rx_frames_total, 1);
/// ```
#[derive(Debug, Default)]
pub struct RangerMetrics {
    /// RX 接收的总帧数
    pub rx_frames_total: AtomicU64,
    /// 成功解码并合并的帧数
    pub rx_frames_decoded: AtomicU64,
    /// 当前协议不认识的帧（正常现象，总线上可能有其他设备）
    pub rx_unknown_ids: AtomicU64,
    /// 长度/校验/枚举值错误的帧
    pub rx_decode_errors: AtomicU64,
    /// 解码成功但无法合并的帧（如执行器索引越界）
    pub rx_anomalies: AtomicU64,
    /// RX 超时次数（无数据时会超时）
    pub rx_timeouts: AtomicU64,
    /// TX 发送成功的帧数
    pub tx_frames_total: AtomicU64,
    /// TX 发送失败次数
    pub tx_errors: AtomicU64,
    /// 指令队列满导致的丢弃次数
    pub tx_queue_drops: AtomicU64,
}

impl RangerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取所有计数器的快照（各计数器之间可能有微小的时间差）
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rx_frames_total: self.rx_frames_total.load(Ordering::Relaxed),
            rx_frames_decoded: self.rx_frames_decoded.load(Ordering::Relaxed),
            rx_unknown_ids: self.rx_unknown_ids.load(Ordering::Relaxed),
            rx_decode_errors: self.rx_decode_errors.load(Ordering::Relaxed),
            rx_anomalies: self.rx_anomalies.load(Ordering::Relaxed),
            rx_timeouts: self.rx_timeouts.load(Ordering::Relaxed),
            tx_frames_total: self.tx_frames_total.load(Ordering::Relaxed),
            tx_errors: self.tx_errors.load(Ordering::Relaxed),
            tx_queue_drops: self.tx_queue_drops.load(Ordering::Relaxed),
        }
    }
}

/// 指标快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub rx_frames_total: u64,
    pub rx_frames_decoded: u64,
    pub rx_unknown_ids: u64,
    pub rx_decode_errors: u64,
    pub rx_anomalies: u64,
    pub rx_timeouts: u64,
    pub tx_frames_total: u64,
    pub tx_errors: u64,
    pub tx_queue_drops: u64,
}
