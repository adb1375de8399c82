//! V1 协议编解码（Ranger Mini V1）
//!
//! V1 帧的 Byte 7 为校验和，驱动器序号放在数据区 Byte 6。
//! 发送帧的 Byte 6 为滚动计数器。

use super::{FrameBuffer, FrameCodec, check_len, decode_enum, quantize_i16};
use crate::commands::{Command, LightCommand, MotionCommand};
use crate::ids::*;
use crate::messages::*;
use crate::version::ProtocolVersion;
use crate::{ProtocolError, RangerFrame, bytes_to_i16_be, bytes_to_u16_be, i16_to_bytes_be};
use smallvec::smallvec;
use std::sync::atomic::{AtomicU8, Ordering};

/// V1 校验和：`(id & 0xFF) + (id >> 8) + 8 + Σ data[0..7]`，取低 8 位
pub fn v1_checksum(id: u32, payload: &[u8]) -> u8 {
    let seed = (id & 0xFF) as u8;
    payload
        .iter()
        .fold(seed.wrapping_add((id >> 8) as u8).wrapping_add(8), |acc, b| acc.wrapping_add(*b))
}

/// V1 编解码器
///
/// 持有发送方向的滚动计数器，每次编码一帧自增 1。
#[derive(Debug, Default)]
pub struct V1Codec {
    counter: AtomicU8,
}

impl V1Codec {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_count(&self) -> u8 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    /// 填写计数器和校验和，生成完整的 8 字节帧
    fn seal(&self, id: u32, mut data: [u8; 8]) -> RangerFrame {
        data[6] = self.next_count();
        data[7] = v1_checksum(id, &data[..7]);
        RangerFrame::new_standard(id as u16, &data)
    }

    fn verify(frame: &RangerFrame) -> Result<(), ProtocolError> {
        check_len(frame, 8)?;
        let expected = v1_checksum(frame.id, &frame.data[..7]);
        if frame.data[7] != expected {
            return Err(ProtocolError::ChecksumMismatch {
                id: frame.id,
                expected,
                actual: frame.data[7],
            });
        }
        Ok(())
    }

    fn velocity_frame(&self, control_mode: u8, fault_clear: bool, linear: i16, angular: i16) -> RangerFrame {
        let mut data = [0u8; 8];
        data[0] = control_mode;
        data[1] = fault_clear as u8;
        data[2..4].copy_from_slice(&i16_to_bytes_be(linear));
        data[4..6].copy_from_slice(&i16_to_bytes_be(angular));
        self.seal(V1_ID_MOTION_COMMAND, data)
    }

    fn steering_frame(&self, steering: i16, mode: MotionMode) -> RangerFrame {
        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&i16_to_bytes_be(steering));
        data[2] = mode as u8;
        self.seal(V1_ID_STEERING_COMMAND, data)
    }

    fn light_frame(&self, enable: bool, cmd: &LightCommand) -> RangerFrame {
        let data = [
            enable as u8,
            cmd.front_light.mode as u8,
            cmd.front_light.custom_value,
            cmd.rear_light.mode as u8,
            cmd.rear_light.custom_value,
            0,
            0,
            0,
        ];
        self.seal(V1_ID_LIGHT_COMMAND, data)
    }
}

impl FrameCodec for V1Codec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V1
    }

    fn decode(&self, frame: &RangerFrame) -> Result<Option<RangerMessage>, ProtocolError> {
        if frame.is_extended
            || !matches!(
                frame.id,
                V1_ID_SYSTEM_STATE | V1_ID_MOTION_STATE | V1_ID_LIGHT_STATE | V1_ID_ACTUATOR_STATE
            )
        {
            return Ok(None);
        }

        Self::verify(frame)?;
        let d = &frame.data;

        let message = match frame.id {
            V1_ID_SYSTEM_STATE => RangerMessage::SystemState(SystemStateMessage {
                vehicle_state: decode_enum("vehicle_state", d[0])?,
                control_mode: decode_enum("control_mode", d[1])?,
                battery_voltage: bytes_to_u16_be([d[2], d[3]]) as f64 * 0.1,
                error_code: bytes_to_u16_be([d[4], d[5]]),
            }),
            V1_ID_MOTION_STATE => RangerMessage::MotionState(MotionStateMessage {
                linear_velocity: bytes_to_i16_be([d[0], d[1]]) as f64 / 1000.0,
                angular_velocity: bytes_to_i16_be([d[2], d[3]]) as f64 / 1000.0,
                lateral_velocity: 0.0,
                steering_angle: bytes_to_i16_be([d[4], d[5]]) as f64 / 1000.0,
            }),
            V1_ID_LIGHT_STATE => RangerMessage::LightState(LightStateMessage {
                enable_cmd_ctrl: d[0] != 0,
                front_light: LightState {
                    mode: decode_enum("front_light_mode", d[1])?,
                    custom_value: d[2],
                },
                rear_light: LightState {
                    mode: decode_enum("rear_light_mode", d[3])?,
                    custom_value: d[4],
                },
            }),
            V1_ID_ACTUATOR_STATE => RangerMessage::ActuatorV1(ActuatorV1StateMessage {
                motor_id: d[6],
                current: bytes_to_u16_be([d[0], d[1]]) as f64 * 0.1,
                rpm: bytes_to_i16_be([d[2], d[3]]),
                driver_temp: d[4] as i8 as f64,
                motor_temp: d[5] as i8 as f64,
            }),
            _ => return Ok(None),
        };

        Ok(Some(message))
    }

    fn encode(&self, command: &Command) -> Result<FrameBuffer, ProtocolError> {
        let can_mode = ControlMode::CanCommand as u8;
        let frames: FrameBuffer = match command {
            Command::Motion(cmd) => {
                let linear = quantize_i16("linear_velocity", cmd.linear_velocity, 1000.0)?;
                let angular = quantize_i16("angular_velocity", cmd.angular_velocity, 1000.0)?;
                let steering = quantize_i16("steering_angle", cmd.steering_angle, 1000.0)?;
                // 先转向后速度
                smallvec![
                    self.steering_frame(steering, cmd.motion_mode),
                    self.velocity_frame(can_mode, false, linear, angular),
                ]
            },
            Command::Light(cmd) => smallvec![self.light_frame(true, cmd)],
            Command::DisableLightControl => {
                smallvec![self.light_frame(false, &LightCommand::default())]
            },
            // V1 没有独立的模式帧，模式随转向帧下发，转角同时归零
            Command::SetMotionMode(mode) => smallvec![self.steering_frame(0, *mode)],
            Command::EnableCommandedMode => smallvec![self.velocity_frame(can_mode, false, 0, 0)],
            Command::ResetState => smallvec![self.velocity_frame(can_mode, true, 0, 0)],
            Command::VersionRequest => {
                return Err(ProtocolError::Unsupported {
                    version: ProtocolVersion::V1,
                    operation: command.name(),
                });
            },
        };
        Ok(frames)
    }

    fn decode_motion_command(&self, frames: &[RangerFrame]) -> Result<MotionCommand, ProtocolError> {
        let find = |id: u32| {
            frames
                .iter()
                .find(|f| f.id == id)
                .ok_or(ProtocolError::InvalidCanId { id })
        };
        let steering = find(V1_ID_STEERING_COMMAND)?;
        let velocity = find(V1_ID_MOTION_COMMAND)?;
        Self::verify(steering)?;
        Self::verify(velocity)?;

        let s = &steering.data;
        let v = &velocity.data;
        Ok(MotionCommand::new(
            bytes_to_i16_be([v[2], v[3]]) as f64 / 1000.0,
            bytes_to_i16_be([s[0], s[1]]) as f64 / 1000.0,
            bytes_to_i16_be([v[4], v[5]]) as f64 / 1000.0,
        )
        .with_motion_mode(decode_enum("motion_mode", s[2])?))
    }
}
