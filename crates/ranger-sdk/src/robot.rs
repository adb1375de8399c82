//! 面向应用的机器人接口
//!
//! `RangerRobot` 对驱动层 [`Ranger`] 做了一层薄封装：
//! - 构造时只记录选项，`connect()` 时才打开总线
//! - 未连接时读取状态返回默认值（时间戳为纪元），不报错
//! - 指令在未连接时返回 `DriverError::NotConnected`

use crate::config::RangerConfig;
use ranger_can::SplittableAdapter;
use ranger_driver::{
    ConnectionState, DriverError, MetricsSnapshot, MotionLimits, PipelineConfig, ProtocolSelection,
    Ranger, RangerActuatorState, RangerBuilder, RangerCommonSensorState, RangerCoreState,
};
use ranger_protocol::{LightMode, MotionMode, ProtocolVersion, VersionInfo};
use std::time::Duration;
use tracing::{info, warn};

/// `request_version` 的默认等待时间
pub const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(3);

/// Ranger 机器人
///
/// # Example
///
/// ```no_run
/// use ranger_sdk::RangerRobot;
///
/// let mut robot = RangerRobot::new(false);
/// robot.connect("can0").unwrap();
/// robot.enable_commanded_mode().unwrap();
/// robot.set_motion_command(0.5, 0.1, 0.0).unwrap();
///
/// let state = robot.get_robot_state();
/// println!("linear = {:.3} m/s", state.motion_state.linear_velocity);
/// ```
pub struct RangerRobot {
    protocol: ProtocolSelection,
    pipeline_config: PipelineConfig,
    limits: MotionLimits,
    detect_timeout: Duration,
    driver: Option<Ranger>,
}

impl RangerRobot {
    /// 按车型标志构造：`true` 为 Ranger Mini V1（V1 协议），否则使用 V2
    pub fn new(is_mini_v1: bool) -> Self {
        Self::with_protocol(ProtocolSelection::from_mini_v1_flag(is_mini_v1))
    }

    /// 指定协议选择方式（`Auto` 表示连接时探测）
    pub fn with_protocol(protocol: ProtocolSelection) -> Self {
        Self {
            protocol,
            pipeline_config: PipelineConfig::default(),
            limits: MotionLimits::default(),
            detect_timeout: ranger_driver::detector::DEFAULT_DETECT_TIMEOUT,
            driver: None,
        }
    }

    pub fn from_config(config: &RangerConfig) -> Self {
        Self {
            protocol: config.protocol.into(),
            pipeline_config: config.pipeline.clone(),
            limits: config.limits.clone(),
            detect_timeout: config.detect_timeout(),
            driver: None,
        }
    }

    // ========================================================================
    // 连接管理
    // ========================================================================

    /// 打开 SocketCAN 接口并启动收发线程
    ///
    /// # 错误
    /// - `AlreadyConnected`: 当前会话仍然在线
    /// - `Can`: 接口打开失败
    /// - `ProtocolDetectionTimeout`: 自动探测超时
    pub fn connect(&mut self, can_name: &str) -> Result<(), DriverError> {
        self.release_stale_session()?;
        let ranger = self.builder().interface(can_name).build()?;
        self.install(ranger);
        Ok(())
    }

    /// 使用调用方提供的适配器连接
    pub fn connect_with<C>(&mut self, can: C) -> Result<(), DriverError>
    where
        C: SplittableAdapter + Send + 'static,
        C::RxAdapter: Send + 'static,
        C::TxAdapter: Send + 'static,
    {
        self.release_stale_session()?;
        let ranger = self.builder().build_with(can)?;
        self.install(ranger);
        Ok(())
    }

    /// 断开连接；返回后不再有状态更新
    pub fn disconnect(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.disconnect();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.driver.as_ref().is_some_and(Ranger::is_connected)
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.driver
            .as_ref()
            .map_or(ConnectionState::Disconnected, Ranger::connection_state)
    }

    fn builder(&self) -> RangerBuilder {
        RangerBuilder::new()
            .protocol(self.protocol)
            .pipeline_config(self.pipeline_config.clone())
            .motion_limits(self.limits.clone())
            .detect_timeout(self.detect_timeout)
    }

    /// 在线会话拒绝重连；已失败的会话先回收
    fn release_stale_session(&mut self) -> Result<(), DriverError> {
        match self.driver.as_ref().map(Ranger::connection_state) {
            Some(ConnectionState::Connected) => Err(DriverError::AlreadyConnected),
            Some(state) => {
                warn!("Releasing previous session in state {:?}", state);
                self.disconnect();
                Ok(())
            },
            None => Ok(()),
        }
    }

    fn install(&mut self, ranger: Ranger) {
        info!("Robot connected using protocol {}", ranger.protocol_version());
        self.driver = Some(ranger);
    }

    fn driver_ref(&self) -> Result<&Ranger, DriverError> {
        self.driver.as_ref().ok_or(DriverError::NotConnected)
    }

    // ========================================================================
    // 指令
    // ========================================================================

    pub fn enable_commanded_mode(&self) -> Result<(), DriverError> {
        self.driver_ref()?.enable_commanded_mode()
    }

    /// 查询固件版本，最多等待 `timeout`
    pub fn request_version(&self, timeout: Duration) -> Result<VersionInfo, DriverError> {
        self.driver_ref()?.request_version(timeout)
    }

    pub fn reset_robot_state(&self) -> Result<(), DriverError> {
        self.driver_ref()?.reset_robot_state()
    }

    pub fn disable_light_control(&self) -> Result<(), DriverError> {
        self.driver_ref()?.disable_light_control()
    }

    /// 切换运动模式
    ///
    /// Ranger Mini V1 的模式随转向帧下发，切换时转向角会被同时置为 0，
    /// 需要保持转向的调用方应在之后重新发送运动指令。
    pub fn set_motion_mode(&self, mode: MotionMode) -> Result<(), DriverError> {
        self.driver_ref()?.set_motion_mode(mode)
    }

    /// 运动指令（m/s, rad, rad/s），越界参数返回 `InvalidArgument`
    pub fn set_motion_command(
        &self,
        linear_velocity: f64,
        steering_angle: f64,
        angular_velocity: f64,
    ) -> Result<(), DriverError> {
        self.driver_ref()?
            .set_motion_command(linear_velocity, steering_angle, angular_velocity)
    }

    pub fn set_light_command(
        &self,
        front_mode: LightMode,
        front_value: u8,
        rear_mode: LightMode,
        rear_value: u8,
    ) -> Result<(), DriverError> {
        self.driver_ref()?
            .set_light_command(front_mode, front_value, rear_mode, rear_value)
    }

    // ========================================================================
    // 状态读取
    // ========================================================================

    /// 当前解析使用的协议版本
    ///
    /// 连接后为会话版本；未连接时为预选版本，自动探测模式下为 `Unknown`。
    pub fn get_parser_protocol_version(&self) -> ProtocolVersion {
        match &self.driver {
            Some(driver) => driver.protocol_version(),
            None => self.protocol.fixed().unwrap_or(ProtocolVersion::Unknown),
        }
    }

    pub fn get_robot_state(&self) -> RangerCoreState {
        self.driver
            .as_ref()
            .map(Ranger::core_state)
            .unwrap_or_default()
    }

    pub fn get_actuator_state(&self) -> RangerActuatorState {
        self.driver
            .as_ref()
            .map(Ranger::actuator_state)
            .unwrap_or_default()
    }

    pub fn get_common_sensor_state(&self) -> RangerCommonSensorState {
        self.driver
            .as_ref()
            .map(Ranger::common_sensor_state)
            .unwrap_or_default()
    }

    /// 旁听总线确认协议版本，不一致时返回 `ProtocolMismatch`
    pub fn detect_protocol_version(&self, timeout: Duration) -> Result<ProtocolVersion, DriverError> {
        self.driver_ref()?.detect_protocol_version(timeout)
    }

    pub fn metrics(&self) -> Option<MetricsSnapshot> {
        self.driver.as_ref().map(Ranger::metrics)
    }

    /// 底层驱动（帧回调等高级用法）
    pub fn driver(&self) -> Option<&Ranger> {
        self.driver.as_ref()
    }
}

impl Default for RangerRobot {
    fn default() -> Self {
        Self::new(false)
    }
}
