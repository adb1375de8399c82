//! Ranger 驱动主体（对外 API）
//!
//! 一个 `Ranger` 实例就是一次连接会话：
//! - 构造时确定协议版本（预选或探测），之后不再改变
//! - RX 线程解码并合并状态，TX 线程按顺序发送指令
//! - `disconnect()`（或 Drop）先停止接收循环，再释放通道

use crate::builder::ProtocolSelection;
use crate::connection::{AtomicConnectionState, ConnectionState};
use crate::detector::{detect_on_adapter, detect_with_hooks};
use crate::dispatcher::{CommandDispatcher, MotionLimits};
use crate::error::DriverError;
use crate::hooks::FrameCallback;
use crate::metrics::{MetricsSnapshot, RangerMetrics};
use crate::pipeline::{PipelineConfig, rx_loop, tx_loop};
use crate::state::{RangerActuatorState, RangerCommonSensorState, RangerContext, RangerCoreState, Timestamp};
use ranger_can::SplittableAdapter;
use ranger_protocol::{FrameCodec, LightMode, MotionMode, ProtocolVersion, VersionInfo, codec_for};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle, spawn};
use std::time::{Duration, Instant};
use tracing::{error, info};

/// 为 `JoinHandle` 提供带超时的 join
trait JoinTimeout {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()>;
}

impl<T: Send + 'static> JoinTimeout for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> thread::Result<()> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程负责真正的 join
        spawn(move || {
            let result = self.join();
            let _ = tx.send(result);
        });

        match rx.recv_timeout(timeout) {
            Ok(join_result) => join_result.map(|_| ()),
            Err(mpsc::RecvTimeoutError::Timeout) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "Thread join timeout",
            ))),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(Box::new(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "Thread panicked during join",
            ))),
        }
    }
}

/// TX 线程可能卡在阻塞写上，最多等待这么久
const TX_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Ranger 底盘驱动
pub struct Ranger {
    ctx: Arc<RangerContext>,
    metrics: Arc<RangerMetrics>,
    connection: Arc<AtomicConnectionState>,
    is_running: Arc<AtomicBool>,
    version: ProtocolVersion,
    /// 断开时置为 None，之后的指令一律 `NotConnected`
    dispatcher: Option<CommandDispatcher>,
    rx_thread: Option<JoinHandle<()>>,
    tx_thread: Option<JoinHandle<()>>,
}

impl Ranger {
    pub(crate) fn start<C>(
        mut can: C,
        selection: ProtocolSelection,
        config: PipelineConfig,
        limits: MotionLimits,
        detect_timeout: Duration,
    ) -> Result<Self, DriverError>
    where
        C: SplittableAdapter + Send + 'static,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        can.set_receive_timeout(config.receive_timeout());
        let (mut rx, mut tx) = can.split()?;

        let version = match selection.fixed() {
            Some(version) => {
                info!("Using pre-selected protocol {}", version);
                version
            },
            None => detect_on_adapter(&mut rx, &mut tx, detect_timeout)?,
        };
        let codec: Arc<dyn FrameCodec> = match codec_for(version) {
            Some(codec) => Arc::from(codec),
            None => {
                return Err(DriverError::InvalidArgument(format!(
                    "no codec for protocol {}",
                    version
                )));
            },
        };

        let ctx = Arc::new(RangerContext::new());
        let metrics = Arc::new(RangerMetrics::new());
        let connection = Arc::new(AtomicConnectionState::new(ConnectionState::Connected));
        let is_running = Arc::new(AtomicBool::new(true));
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded(config.tx_queue_capacity.max(1));

        let rx_thread = {
            let codec = codec.clone();
            let ctx = ctx.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            let connection = connection.clone();
            thread::Builder::new()
                .name("ranger-rx".into())
                .spawn(move || rx_loop(rx, codec, ctx, is_running, metrics, connection))
                .map_err(|e| DriverError::IoThread(format!("failed to spawn RX thread: {}", e)))?
        };

        let tx_spawn = {
            let ctx = ctx.clone();
            let is_running = is_running.clone();
            let metrics = metrics.clone();
            let connection = connection.clone();
            let config = config.clone();
            thread::Builder::new().name("ranger-tx".into()).spawn(move || {
                tx_loop(tx, cmd_rx, config, ctx, is_running, metrics, connection)
            })
        };
        let tx_thread = match tx_spawn {
            Ok(handle) => handle,
            Err(e) => {
                is_running.store(false, Ordering::Release);
                let _ = rx_thread.join();
                return Err(DriverError::IoThread(format!("failed to spawn TX thread: {}", e)));
            },
        };

        let dispatcher = CommandDispatcher::new(codec, limits, cmd_tx, metrics.clone());
        info!("Ranger connected (protocol {})", version);

        Ok(Self {
            ctx,
            metrics,
            connection,
            is_running,
            version,
            dispatcher: Some(dispatcher),
            rx_thread: Some(rx_thread),
            tx_thread: Some(tx_thread),
        })
    }

    // ========================================================================
    // 会话信息
    // ========================================================================

    /// 本次会话使用的协议版本
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.get(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn context(&self) -> &Arc<RangerContext> {
        &self.ctx
    }

    // ========================================================================
    // 状态读取（无锁快照）
    // ========================================================================

    pub fn core_state(&self) -> RangerCoreState {
        self.ctx.core_state()
    }

    pub fn actuator_state(&self) -> RangerActuatorState {
        self.ctx.actuator_state()
    }

    pub fn common_sensor_state(&self) -> RangerCommonSensorState {
        self.ctx.sensor_state()
    }

    /// 最近一次收到的固件版本
    pub fn version_info(&self) -> Option<VersionInfo> {
        self.ctx.version_info()
    }

    /// 等待第一帧核心状态反馈
    pub fn wait_for_feedback(&self, timeout: Duration) -> Result<(), DriverError> {
        let start = Instant::now();
        loop {
            if self.ctx.core_state().time_stamp > Timestamp::epoch() {
                return Ok(());
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    // ========================================================================
    // 帧回调
    // ========================================================================

    pub fn add_frame_callback(&self, callback: Arc<dyn FrameCallback>) -> Result<(), DriverError> {
        self.ctx
            .hooks
            .write()
            .map_err(|_| DriverError::PoisonedLock)?
            .add_callback(callback);
        Ok(())
    }

    pub fn remove_frame_callback(
        &self,
        callback: &Arc<dyn FrameCallback>,
    ) -> Result<bool, DriverError> {
        Ok(self
            .ctx
            .hooks
            .write()
            .map_err(|_| DriverError::PoisonedLock)?
            .remove_callback(callback))
    }

    // ========================================================================
    // 指令
    // ========================================================================

    fn dispatcher(&self) -> Result<&CommandDispatcher, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }
        self.dispatcher.as_ref().ok_or(DriverError::NotConnected)
    }

    pub fn is_commanded_mode_enabled(&self) -> bool {
        self.dispatcher
            .as_ref()
            .is_some_and(CommandDispatcher::is_commanded_mode_enabled)
    }

    pub fn enable_commanded_mode(&self) -> Result<(), DriverError> {
        self.dispatcher()?.enable_commanded_mode()
    }

    pub fn set_motion_command(
        &self,
        linear_velocity: f64,
        steering_angle: f64,
        angular_velocity: f64,
    ) -> Result<(), DriverError> {
        self.dispatcher()?
            .set_motion_command(linear_velocity, steering_angle, angular_velocity)
    }

    pub fn set_light_command(
        &self,
        front_mode: LightMode,
        front_value: u8,
        rear_mode: LightMode,
        rear_value: u8,
    ) -> Result<(), DriverError> {
        self.dispatcher()?
            .set_light_command(front_mode, front_value, rear_mode, rear_value)
    }

    pub fn disable_light_control(&self) -> Result<(), DriverError> {
        self.dispatcher()?.disable_light_control()
    }

    /// 切换运动模式（V1 下转向角同时归零，见 [`CommandDispatcher::set_motion_mode`]）
    pub fn set_motion_mode(&self, mode: MotionMode) -> Result<(), DriverError> {
        self.dispatcher()?.set_motion_mode(mode)
    }

    pub fn reset_robot_state(&self) -> Result<(), DriverError> {
        self.dispatcher()?.reset_robot_state()
    }

    /// 查询固件版本并等待应答
    ///
    /// 先清空上一次的结果，超时返回 `DriverError::Timeout`；V1 返回 `Unsupported`。
    pub fn request_version(&self, timeout: Duration) -> Result<VersionInfo, DriverError> {
        let dispatcher = self.dispatcher()?;
        self.ctx.clear_version_info()?;
        dispatcher.request_version()?;

        let start = Instant::now();
        loop {
            if let Some(info) = self.ctx.version_info() {
                return Ok(info);
            }
            if start.elapsed() >= timeout {
                return Err(DriverError::Timeout);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    /// 旁听总线，确认对端的协议版本与本次会话一致
    pub fn detect_protocol_version(&self, timeout: Duration) -> Result<ProtocolVersion, DriverError> {
        if !self.is_connected() {
            return Err(DriverError::NotConnected);
        }
        detect_with_hooks(&self.ctx, self.version, timeout)
    }

    // ========================================================================
    // 生命周期
    // ========================================================================

    /// 断开连接
    ///
    /// 返回之后不会再有任何状态合并，也不再接受指令。重复调用无副作用。
    pub fn disconnect(&mut self) {
        if self.rx_thread.is_none() && self.tx_thread.is_none() {
            return;
        }

        self.connection.set(ConnectionState::Disconnected, Ordering::Release);
        // 先丢掉 Sender，TX 线程看到 Disconnected 后也会退出
        self.dispatcher.take();
        // Release: 之前的写入对看到 false 的线程可见
        self.is_running.store(false, Ordering::Release);

        // RX 线程的退出受接收超时约束，必须等到它真正结束
        if let Some(handle) = self.rx_thread.take()
            && handle.join().is_err()
        {
            error!("RX thread panicked");
        }

        if let Some(handle) = self.tx_thread.take()
            && let Err(_e) = handle.join_timeout(TX_JOIN_TIMEOUT)
        {
            error!(
                "TX thread panicked or failed to shut down within {:?}",
                TX_JOIN_TIMEOUT
            );
        }

        info!("Ranger disconnected");
    }
}

impl Drop for Ranger {
    fn drop(&mut self) {
        self.disconnect();
    }
}
