//! 反馈消息定义
//!
//! 编解码器把原始帧解析成这里的类型化消息。所有物理量都已经换算为
//! SI 单位（m/s、rad、rad/s、V、A、°C），上层不需要再关心缩放系数。

use bilge::prelude::*;

// ============================================================================
// 枚举类型定义
// ============================================================================

/// 车辆状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum VehicleState {
    /// 正常
    #[default]
    Normal = 0x00,
    /// 急停
    EStop = 0x01,
    /// 异常
    Exception = 0x02,
}

/// 控制模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ControlMode {
    /// 待机
    #[default]
    Standby = 0x00,
    /// CAN 指令控制
    CanCommand = 0x01,
    /// 串口控制
    Uart = 0x02,
    /// 遥控器控制
    RemoteControl = 0x03,
}

/// 灯光模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum LightMode {
    /// 常灭
    #[default]
    ConstOff = 0x00,
    /// 常亮
    ConstOn = 0x01,
    /// 呼吸
    Breath = 0x02,
    /// 自定义亮度（使用 custom_value）
    Custom = 0x03,
}

/// 遥控器拨杆位置
///
/// 遥控器断开时接收机会上报未定义的编码，这类值归为 `Invalid`
/// 而不是让整帧解析失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum RcSwitchState {
    Up = 0x00,
    Middle = 0x01,
    Down = 0x02,
    #[num_enum(default)]
    Invalid = 0x03,
}

// 不能 derive：num_enum 把 `#[default]` 也当作 FromPrimitive 的兜底变体，
// 会和 `Invalid` 冲突，未知编码也会被误判为 `Up`
impl Default for RcSwitchState {
    fn default() -> Self {
        RcSwitchState::Up
    }
}

/// 运动模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, num_enum::TryFromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum MotionMode {
    /// 双阿克曼（前后轮反向转向）
    #[default]
    DualAckermann = 0x00,
    /// 斜移（四轮同向转向）
    Parallel = 0x01,
    /// 原地自旋
    Spinning = 0x02,
    /// 驻车
    Park = 0x03,
    /// 侧移
    SideSlip = 0x04,
}

// ============================================================================
// 位域定义
// ============================================================================

/// 系统故障码位域（0x211 Byte 4-5）
#[bitsize(16)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct SystemErrorCode {
    pub battery_undervoltage_fault: bool, // Bit 0: 电池欠压故障
    pub battery_undervoltage_alarm: bool, // Bit 1: 电池欠压告警
    pub rc_signal_lost: bool,             // Bit 2: 遥控器信号丢失
    pub motor1_comm_error: bool,          // Bit 3: 1号电机通信异常
    pub motor2_comm_error: bool,          // Bit 4: 2号电机通信异常
    pub motor3_comm_error: bool,          // Bit 5: 3号电机通信异常
    pub motor4_comm_error: bool,          // Bit 6: 4号电机通信异常
    pub reserved: u9,                     // Bit 7-15: 保留
}

/// 遥控器拨杆位域（0x241 Byte 0），每个拨杆 2 bit
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct RcSwitches {
    pub swa: u2, // Bit 0-1
    pub swb: u2, // Bit 2-3
    pub swc: u2, // Bit 4-5
    pub swd: u2, // Bit 6-7
}

/// 驱动器状态位域（0x261~0x268 Byte 5）
#[bitsize(8)]
#[derive(FromBits, DebugBits, Clone, Copy, Default)]
pub struct DriverStatus {
    pub input_voltage_low: bool, // Bit 0: 电源电压过低
    pub motor_overheat: bool,    // Bit 1: 电机过温
    pub driver_overload: bool,   // Bit 2: 驱动器过流
    pub driver_overheat: bool,   // Bit 3: 驱动器过温
    pub sensor_fault: bool,      // Bit 4: 传感器异常
    pub driver_error: bool,      // Bit 5: 驱动器错误
    pub driver_enabled: bool,    // Bit 6: 驱动器使能
    pub driver_reset: bool,      // Bit 7: 驱动器复位
}

// ============================================================================
// 核心状态消息
// ============================================================================

/// 系统状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemStateMessage {
    pub vehicle_state: VehicleState,
    pub control_mode: ControlMode,
    /// 电池电压（V）
    pub battery_voltage: f64,
    /// 故障码原始值，使用 [`SystemStateMessage::error_flags`] 解析
    pub error_code: u16,
}

impl SystemStateMessage {
    /// 解析故障码位域
    pub fn error_flags(&self) -> SystemErrorCode {
        SystemErrorCode::from(u16::new(self.error_code))
    }
}

/// 运动状态
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionStateMessage {
    /// 线速度（m/s）
    pub linear_velocity: f64,
    /// 角速度（rad/s）
    pub angular_velocity: f64,
    /// 横向速度（m/s），V1 恒为 0
    pub lateral_velocity: f64,
    /// 转向角（rad）
    pub steering_angle: f64,
}

/// 单个灯的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightState {
    pub mode: LightMode,
    /// 自定义亮度（0~100），仅 `LightMode::Custom` 时有效
    pub custom_value: u8,
}

/// 灯光状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LightStateMessage {
    /// 灯光是否由 CAN 指令控制
    pub enable_cmd_ctrl: bool,
    pub front_light: LightState,
    pub rear_light: LightState,
}

/// 遥控器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RcStateMessage {
    pub swa: RcSwitchState,
    pub swb: RcSwitchState,
    pub swc: RcSwitchState,
    pub swd: RcSwitchState,
    pub stick_right_h: i8,
    pub stick_right_v: i8,
    pub stick_left_h: i8,
    pub stick_left_v: i8,
    pub var_a: i8,
}

/// 运动模式状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotionModeStateMessage {
    pub motion_mode: MotionMode,
    /// 模式切换中
    pub mode_changing: bool,
}

/// 里程计（累计行驶距离）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OdometryMessage {
    /// 左轮里程（m）
    pub left_wheel: f64,
    /// 右轮里程（m）
    pub right_wheel: f64,
}

// ============================================================================
// 驱动器消息
// ============================================================================

/// 驱动器高速反馈
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorHSStateMessage {
    /// 电机序号（0 起），由编解码器从 ID 或数据区提取
    pub motor_id: u8,
    /// 转速（RPM）
    pub rpm: i16,
    /// 电流（A）
    pub current: f64,
    /// 编码器累计脉冲数
    pub pulse_count: i32,
}

/// 驱动器低速反馈
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorLSStateMessage {
    pub motor_id: u8,
    /// 驱动器电压（V）
    pub driver_voltage: f64,
    /// 驱动器温度（°C）
    pub driver_temp: f64,
    /// 电机温度（°C）
    pub motor_temp: f64,
    /// 驱动器状态原始值，使用 [`ActuatorLSStateMessage::status`] 解析
    pub driver_state: u8,
}

impl ActuatorLSStateMessage {
    pub fn status(&self) -> DriverStatus {
        DriverStatus::from(u8::new(self.driver_state))
    }
}

/// V1 驱动器反馈（高速和低速字段合并在一帧内）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ActuatorV1StateMessage {
    pub motor_id: u8,
    pub rpm: i16,
    /// 电流（A）
    pub current: f64,
    /// 驱动器温度（°C）
    pub driver_temp: f64,
    /// 电机温度（°C）
    pub motor_temp: f64,
}

/// 四个转向电机角度（rad）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorAngleMessage {
    pub angles: [f64; 4],
}

/// 四个轮速（m/s）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MotorSpeedMessage {
    pub speeds: [f64; 4],
}

// ============================================================================
// 传感器与版本消息
// ============================================================================

/// BMS 基础信息
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BmsBasicMessage {
    /// 剩余电量（%）
    pub battery_soc: u8,
    /// 健康度（%）
    pub battery_soh: u8,
    /// 电压（V）
    pub voltage: f64,
    /// 电流（A），放电为负
    pub current: f64,
    /// 温度（°C）
    pub temperature: f64,
}

/// BMS 扩展信息（告警/警告位，原样保留）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BmsExtendedMessage {
    pub alarm_status_1: u8,
    pub alarm_status_2: u8,
    pub warning_status_1: u8,
    pub warning_status_2: u8,
}

/// 固件版本信息（0x4A2）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VersionInfo {
    pub control_hw_version: u16,
    pub driver_hw_version: u16,
    pub control_sw_version: u16,
    pub driver_sw_version: u16,
}

/// 解码后的类型化消息
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangerMessage {
    SystemState(SystemStateMessage),
    MotionState(MotionStateMessage),
    LightState(LightStateMessage),
    RcState(RcStateMessage),
    ActuatorHS(ActuatorHSStateMessage),
    ActuatorLS(ActuatorLSStateMessage),
    ActuatorV1(ActuatorV1StateMessage),
    MotorAngle(MotorAngleMessage),
    MotorSpeed(MotorSpeedMessage),
    MotionModeState(MotionModeStateMessage),
    Odometry(OdometryMessage),
    BmsBasic(BmsBasicMessage),
    BmsExtended(BmsExtendedMessage),
    Version(VersionInfo),
}

impl RangerMessage {
    /// 消息名称（用于日志）
    pub fn kind(&self) -> &'static str {
        match self {
            RangerMessage::SystemState(_) => "SystemState",
            RangerMessage::MotionState(_) => "MotionState",
            RangerMessage::LightState(_) => "LightState",
            RangerMessage::RcState(_) => "RcState",
            RangerMessage::ActuatorHS(_) => "ActuatorHS",
            RangerMessage::ActuatorLS(_) => "ActuatorLS",
            RangerMessage::ActuatorV1(_) => "ActuatorV1",
            RangerMessage::MotorAngle(_) => "MotorAngle",
            RangerMessage::MotorSpeed(_) => "MotorSpeed",
            RangerMessage::MotionModeState(_) => "MotionModeState",
            RangerMessage::Odometry(_) => "Odometry",
            RangerMessage::BmsBasic(_) => "BmsBasic",
            RangerMessage::BmsExtended(_) => "BmsExtended",
            RangerMessage::Version(_) => "Version",
        }
    }
}
