//! 控制指令定义
//!
//! 指令只描述“要做什么”，具体的帧布局由各版本编解码器决定。

use crate::messages::{LightMode, LightState, MotionMode};

/// 运动控制指令
///
/// `motion_mode` 仅被 V1 使用（V1 的转向帧 0x132 同时携带运动模式），
/// V2 通过独立的 0x141 指令切换模式。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionCommand {
    /// 线速度（m/s）
    pub linear_velocity: f64,
    /// 转向角（rad）
    pub steering_angle: f64,
    /// 角速度（rad/s）
    pub angular_velocity: f64,
    pub motion_mode: MotionMode,
}

impl MotionCommand {
    pub fn new(linear_velocity: f64, steering_angle: f64, angular_velocity: f64) -> Self {
        Self {
            linear_velocity,
            steering_angle,
            angular_velocity,
            motion_mode: MotionMode::default(),
        }
    }

    pub fn with_motion_mode(mut self, motion_mode: MotionMode) -> Self {
        self.motion_mode = motion_mode;
        self
    }
}

/// 灯光控制指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightCommand {
    pub front_light: LightState,
    pub rear_light: LightState,
}

impl LightCommand {
    pub fn new(front_mode: LightMode, front_value: u8, rear_mode: LightMode, rear_value: u8) -> Self {
        Self {
            front_light: LightState {
                mode: front_mode,
                custom_value: front_value,
            },
            rear_light: LightState {
                mode: rear_mode,
                custom_value: rear_value,
            },
        }
    }
}

/// 可编码的指令集合
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// 运动控制
    Motion(MotionCommand),
    /// 灯光控制（同时打开 CAN 灯光控制）
    Light(LightCommand),
    /// 关闭 CAN 灯光控制，交还给底盘默认逻辑
    DisableLightControl,
    /// 切换运动模式
    SetMotionMode(MotionMode),
    /// 使能 CAN 指令控制模式
    EnableCommandedMode,
    /// 清除故障状态
    ResetState,
    /// 查询固件版本
    VersionRequest,
}

impl Command {
    /// 指令名称（用于日志和错误信息）
    pub fn name(&self) -> &'static str {
        match self {
            Command::Motion(_) => "motion command",
            Command::Light(_) => "light command",
            Command::DisableLightControl => "disable light control",
            Command::SetMotionMode(_) => "motion mode command",
            Command::EnableCommandedMode => "enable commanded mode",
            Command::ResetState => "state reset",
            Command::VersionRequest => "version request",
        }
    }
}
