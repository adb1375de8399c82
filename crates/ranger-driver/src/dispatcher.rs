//! 指令分发
//!
//! 校验参数 → 编码 → 放入 TX 队列。调用方线程上同步完成，不等待总线应答：
//! 返回 `Ok` 只表示指令已交给发送线程，是否生效要看后续的状态反馈。
//!
//! 运动、灯光和运动模式指令要求先调用 [`CommandDispatcher::enable_commanded_mode`]，
//! 否则直接返回 `CommandedModeDisabled`，不会发出任何帧。

use crate::DriverError;
use crate::command::TxPackage;
use crate::metrics::RangerMetrics;
use crossbeam_channel::{Sender, TrySendError};
use ranger_protocol::{
    Command, FrameCodec, LightCommand, LightMode, MotionCommand, MotionMode, ProtocolVersion,
};
use std::f64::consts::FRAC_PI_2;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, trace, warn};

/// 指令参数的物理范围
///
/// 越界的参数直接拒绝（`InvalidArgument`），不做截断。
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MotionLimits {
    /// 最大线速度（m/s）
    pub max_linear_velocity: f64,
    /// 最大角速度（rad/s）
    pub max_angular_velocity: f64,
    /// 非平行模式下的最大转向角（rad），对应机械限位 40°
    pub max_steer_angle: f64,
    /// 平行模式下的最大转向角（rad）
    pub max_steer_angle_parallel: f64,
    /// 灯光自定义亮度上限
    pub max_light_value: u8,
}

impl Default for MotionLimits {
    fn default() -> Self {
        Self {
            max_linear_velocity: 1.5,
            max_angular_velocity: 1.0,
            max_steer_angle: 0.6981,
            max_steer_angle_parallel: FRAC_PI_2,
            max_light_value: 100,
        }
    }
}

fn check_range(field: &str, value: f64, limit: f64) -> Result<(), DriverError> {
    if !value.is_finite() {
        return Err(DriverError::InvalidArgument(format!(
            "{} must be finite, got {}",
            field, value
        )));
    }
    if value.abs() > limit {
        return Err(DriverError::InvalidArgument(format!(
            "{} {} out of range [-{}, {}]",
            field, value, limit, limit
        )));
    }
    Ok(())
}

impl MotionLimits {
    pub fn max_steer_angle_for(&self, mode: MotionMode) -> f64 {
        match mode {
            MotionMode::Parallel => self.max_steer_angle_parallel,
            _ => self.max_steer_angle,
        }
    }

    pub fn validate_motion(
        &self,
        linear_velocity: f64,
        steering_angle: f64,
        angular_velocity: f64,
        mode: MotionMode,
    ) -> Result<(), DriverError> {
        check_range("linear_velocity", linear_velocity, self.max_linear_velocity)?;
        check_range("steering_angle", steering_angle, self.max_steer_angle_for(mode))?;
        check_range("angular_velocity", angular_velocity, self.max_angular_velocity)
    }

    pub fn validate_light_value(&self, field: &str, value: u8) -> Result<(), DriverError> {
        if value > self.max_light_value {
            return Err(DriverError::InvalidArgument(format!(
                "{} {} out of range [0, {}]",
                field, value, self.max_light_value
            )));
        }
        Ok(())
    }
}

/// 指令分发器
///
/// 一个会话一个实例；断开连接时随会话一起销毁，
/// 指令模式标志因此不会跨会话残留。
pub struct CommandDispatcher {
    codec: Arc<dyn FrameCodec>,
    limits: MotionLimits,
    cmd_tx: Sender<TxPackage>,
    metrics: Arc<RangerMetrics>,
    /// 只在使能帧入队之后置位，其他线程的指令不会排到使能帧前面
    commanded: AtomicBool,
    /// 串行化使能流程
    enable_lock: Mutex<()>,
    /// 最近一次下发的运动模式（V1 运动帧需要携带）
    motion_mode: AtomicU8,
}

impl CommandDispatcher {
    pub fn new(
        codec: Arc<dyn FrameCodec>,
        limits: MotionLimits,
        cmd_tx: Sender<TxPackage>,
        metrics: Arc<RangerMetrics>,
    ) -> Self {
        Self {
            codec,
            limits,
            cmd_tx,
            metrics,
            commanded: AtomicBool::new(false),
            enable_lock: Mutex::new(()),
            motion_mode: AtomicU8::new(MotionMode::default() as u8),
        }
    }

    pub fn version(&self) -> ProtocolVersion {
        self.codec.version()
    }

    pub fn limits(&self) -> &MotionLimits {
        &self.limits
    }

    pub fn is_commanded_mode_enabled(&self) -> bool {
        self.commanded.load(Ordering::Acquire)
    }

    pub fn motion_mode(&self) -> MotionMode {
        MotionMode::try_from(self.motion_mode.load(Ordering::Acquire)).unwrap_or_default()
    }

    /// 使能指令控制模式
    ///
    /// 每个会话只发送一次，之后的调用直接返回 `Ok`。
    /// 入队失败时标志保持未置位，可以重试。
    pub fn enable_commanded_mode(&self) -> Result<(), DriverError> {
        let _guard = self.enable_lock.lock().map_err(|_| DriverError::PoisonedLock)?;
        if self.is_commanded_mode_enabled() {
            debug!("Commanded mode already enabled, skipping");
            return Ok(());
        }

        self.dispatch(&Command::EnableCommandedMode)?;
        self.commanded.store(true, Ordering::Release);
        info!("Commanded mode enabled ({})", self.version());
        Ok(())
    }

    /// 运动控制
    ///
    /// 转向角范围取决于当前运动模式（平行模式允许 ±π/2）。
    pub fn set_motion_command(
        &self,
        linear_velocity: f64,
        steering_angle: f64,
        angular_velocity: f64,
    ) -> Result<(), DriverError> {
        self.require_commanded()?;
        let mode = self.motion_mode();
        self.limits.validate_motion(linear_velocity, steering_angle, angular_velocity, mode)?;

        let cmd = MotionCommand::new(linear_velocity, steering_angle, angular_velocity)
            .with_motion_mode(mode);
        self.dispatch(&Command::Motion(cmd))
    }

    pub fn set_light_command(
        &self,
        front_mode: LightMode,
        front_value: u8,
        rear_mode: LightMode,
        rear_value: u8,
    ) -> Result<(), DriverError> {
        self.require_commanded()?;
        self.limits.validate_light_value("front_value", front_value)?;
        self.limits.validate_light_value("rear_value", rear_value)?;

        let cmd = LightCommand::new(front_mode, front_value, rear_mode, rear_value);
        self.dispatch(&Command::Light(cmd))
    }

    /// 交还灯光控制权，不要求指令模式
    pub fn disable_light_control(&self) -> Result<(), DriverError> {
        self.dispatch(&Command::DisableLightControl)
    }

    /// 切换运动模式
    ///
    /// V1 没有独立的模式帧，模式随 0x132 转向帧下发，转向角同时被置为 0。
    pub fn set_motion_mode(&self, mode: MotionMode) -> Result<(), DriverError> {
        self.require_commanded()?;
        self.dispatch(&Command::SetMotionMode(mode))?;
        self.motion_mode.store(mode as u8, Ordering::Release);
        debug!("Motion mode set to {:?}", mode);
        Ok(())
    }

    /// 清除底盘故障状态，不要求指令模式
    pub fn reset_robot_state(&self) -> Result<(), DriverError> {
        self.dispatch(&Command::ResetState)
    }

    /// 发送固件版本查询（V1 不支持）
    pub fn request_version(&self) -> Result<(), DriverError> {
        self.dispatch(&Command::VersionRequest)
    }

    fn require_commanded(&self) -> Result<(), DriverError> {
        if self.is_commanded_mode_enabled() {
            Ok(())
        } else {
            Err(DriverError::CommandedModeDisabled)
        }
    }

    fn dispatch(&self, command: &Command) -> Result<(), DriverError> {
        let frames = self.codec.encode(command).map_err(DriverError::from_encode)?;
        let package = TxPackage::new(command.name(), frames);

        match self.cmd_tx.try_send(package) {
            Ok(()) => {
                trace!("Queued {}", command.name());
                Ok(())
            },
            Err(TrySendError::Full(_)) => {
                self.metrics.tx_queue_drops.fetch_add(1, Ordering::Relaxed);
                warn!("TX queue full, dropping {}", command.name());
                Err(DriverError::ChannelFull)
            },
            Err(TrySendError::Disconnected(_)) => Err(DriverError::ChannelClosed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, bounded};
    use ranger_protocol::codec_for;

    fn dispatcher(version: ProtocolVersion, capacity: usize) -> (CommandDispatcher, Receiver<TxPackage>) {
        let (tx, rx) = bounded(capacity);
        let codec: Arc<dyn FrameCodec> = Arc::from(codec_for(version).unwrap());
        (
            CommandDispatcher::new(codec, MotionLimits::default(), tx, Arc::new(RangerMetrics::new())),
            rx,
        )
    }

    fn ids(package: &TxPackage) -> Vec<u32> {
        package.iter().map(|f| f.id).collect()
    }

    #[test]
    fn test_commands_rejected_before_enable() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 8);
        assert!(matches!(
            d.set_motion_command(0.5, 0.0, 0.0),
            Err(DriverError::CommandedModeDisabled)
        ));
        assert!(matches!(
            d.set_light_command(LightMode::ConstOn, 0, LightMode::ConstOff, 0),
            Err(DriverError::CommandedModeDisabled)
        ));
        assert!(matches!(
            d.set_motion_mode(MotionMode::Spinning),
            Err(DriverError::CommandedModeDisabled)
        ));
        assert!(rx.try_recv().is_err());

        // 复位和交还灯光控制不受限制
        d.reset_robot_state().unwrap();
        d.disable_light_control().unwrap();
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_enable_sent_once_per_session() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 8);
        d.enable_commanded_mode().unwrap();
        d.enable_commanded_mode().unwrap();
        d.set_motion_command(0.3, 0.0, 0.0).unwrap();
        d.set_motion_command(0.4, 0.0, 0.0).unwrap();

        let packages: Vec<TxPackage> = rx.try_iter().collect();
        let enables = packages.iter().filter(|p| ids(p) == vec![0x421]).count();
        assert_eq!(enables, 1);
        assert_eq!(packages.len(), 3);
        assert!(d.is_commanded_mode_enabled());
    }

    #[test]
    fn test_concurrent_motion_never_queued_ahead_of_enable() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 64);
        let d = Arc::new(d);

        let sender = {
            let d = d.clone();
            std::thread::spawn(move || {
                // 一直尝试，直到通过使能检查
                while d.set_motion_command(0.1, 0.0, 0.0).is_err() {
                    std::thread::yield_now();
                }
            })
        };
        d.enable_commanded_mode().unwrap();
        sender.join().unwrap();

        let packages: Vec<TxPackage> = rx.try_iter().collect();
        assert_eq!(ids(&packages[0]), vec![0x421]);
        assert_eq!(ids(packages.last().unwrap()), vec![0x111]);
        assert_eq!(packages.len(), 2);
    }

    #[test]
    fn test_v1_motion_mode_change_zeroes_steering() {
        let (d, rx) = dispatcher(ProtocolVersion::V1, 8);
        d.enable_commanded_mode().unwrap();
        d.set_motion_command(0.2, 0.3, 0.0).unwrap();
        d.set_motion_mode(MotionMode::Parallel).unwrap();

        let packages: Vec<TxPackage> = rx.try_iter().collect();
        let mode_change = packages.last().unwrap();
        assert_eq!(ids(mode_change), vec![0x132]);
        let frame = mode_change.iter().next().unwrap();
        assert_eq!(&frame.data[..3], &[0x00, 0x00, MotionMode::Parallel as u8]);
    }

    #[test]
    fn test_motion_command_validated_before_encoding() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 8);
        d.enable_commanded_mode().unwrap();
        let _ = rx.try_recv();

        d.set_motion_command(1.0, 0.2, 0.0).unwrap();
        assert_eq!(ids(&rx.try_recv().unwrap()), vec![0x111]);

        assert!(matches!(
            d.set_motion_command(1.0, 99.0, 0.0),
            Err(DriverError::InvalidArgument(msg)) if msg.contains("steering_angle")
        ));
        assert!(d.set_motion_command(2.0, 0.0, 0.0).is_err());
        assert!(d.set_motion_command(0.0, 0.0, -1.2).is_err());
        assert!(d.set_motion_command(f64::NAN, 0.0, 0.0).is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_parallel_mode_widens_steering_range() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 8);
        d.enable_commanded_mode().unwrap();

        assert!(d.set_motion_command(0.2, 1.2, 0.0).is_err());
        d.set_motion_mode(MotionMode::Parallel).unwrap();
        assert_eq!(d.motion_mode(), MotionMode::Parallel);
        d.set_motion_command(0.2, 1.2, 0.0).unwrap();

        let packages: Vec<TxPackage> = rx.try_iter().collect();
        assert_eq!(ids(packages.last().unwrap()), vec![0x111]);
    }

    #[test]
    fn test_v1_motion_carries_mode_and_two_frames() {
        let (d, rx) = dispatcher(ProtocolVersion::V1, 8);
        d.enable_commanded_mode().unwrap();
        d.set_motion_mode(MotionMode::Spinning).unwrap();
        d.set_motion_command(0.0, 0.0, 0.5).unwrap();

        let packages: Vec<TxPackage> = rx.try_iter().collect();
        let motion = packages.last().unwrap();
        assert_eq!(ids(motion), vec![0x132, 0x130]);

        let frames: Vec<_> = motion.iter().copied().collect();
        let decoded = codec_for(ProtocolVersion::V1)
            .unwrap()
            .decode_motion_command(&frames)
            .unwrap();
        assert_eq!(decoded.motion_mode, MotionMode::Spinning);
        assert!((decoded.angular_velocity - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_light_value_range() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 8);
        d.enable_commanded_mode().unwrap();
        d.set_light_command(LightMode::Custom, 100, LightMode::Breath, 0).unwrap();
        assert!(matches!(
            d.set_light_command(LightMode::Custom, 101, LightMode::ConstOff, 0),
            Err(DriverError::InvalidArgument(_))
        ));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn test_version_request_unsupported_on_v1() {
        let (d, rx) = dispatcher(ProtocolVersion::V1, 8);
        assert!(matches!(
            d.request_version(),
            Err(DriverError::Unsupported {
                version: ProtocolVersion::V1,
                ..
            })
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_queue_full_and_closed() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 1);
        d.reset_robot_state().unwrap();
        assert!(matches!(d.reset_robot_state(), Err(DriverError::ChannelFull)));
        assert_eq!(d.metrics.snapshot().tx_queue_drops, 1);

        drop(rx);
        assert!(matches!(d.reset_robot_state(), Err(DriverError::ChannelClosed)));
    }

    #[test]
    fn test_failed_enable_can_be_retried() {
        let (d, rx) = dispatcher(ProtocolVersion::V2, 1);
        d.reset_robot_state().unwrap();
        assert!(d.enable_commanded_mode().is_err());
        assert!(!d.is_commanded_mode_enabled());

        let _ = rx.try_recv();
        d.enable_commanded_mode().unwrap();
        assert!(d.is_commanded_mode_enabled());
    }
}
