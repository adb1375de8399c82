//! V2 协议编解码
//!
//! 所有反馈帧长度固定为 8 字节，驱动器序号编码在 CAN ID 中。

use super::{FrameBuffer, FrameCodec, check_len, decode_enum, quantize_i16};
use crate::commands::{Command, LightCommand, MotionCommand};
use crate::ids::*;
use crate::messages::*;
use crate::version::ProtocolVersion;
use crate::{ProtocolError, RangerFrame, bytes_to_i16_be, bytes_to_i32_be, bytes_to_u16_be, i16_to_bytes_be};
use bilge::prelude::*;
use smallvec::smallvec;

/// 0.01° → rad
const CENTIDEG_TO_RAD: f64 = std::f64::consts::PI / 18000.0;

/// V2 编解码器（无状态）
#[derive(Debug, Default, Clone, Copy)]
pub struct V2Codec;

impl V2Codec {
    pub fn new() -> Self {
        Self
    }

    fn decode_system_state(frame: &RangerFrame) -> Result<RangerMessage, ProtocolError> {
        let d = &frame.data;
        Ok(RangerMessage::SystemState(SystemStateMessage {
            vehicle_state: decode_enum("vehicle_state", d[0])?,
            control_mode: decode_enum("control_mode", d[1])?,
            battery_voltage: bytes_to_u16_be([d[2], d[3]]) as f64 * 0.1,
            error_code: bytes_to_u16_be([d[4], d[5]]),
        }))
    }

    fn decode_motion_state(frame: &RangerFrame) -> RangerMessage {
        let d = &frame.data;
        RangerMessage::MotionState(MotionStateMessage {
            linear_velocity: bytes_to_i16_be([d[0], d[1]]) as f64 / 1000.0,
            angular_velocity: bytes_to_i16_be([d[2], d[3]]) as f64 / 1000.0,
            lateral_velocity: bytes_to_i16_be([d[4], d[5]]) as f64 / 1000.0,
            steering_angle: bytes_to_i16_be([d[6], d[7]]) as f64 / 1000.0,
        })
    }

    fn decode_light_state(frame: &RangerFrame) -> Result<RangerMessage, ProtocolError> {
        let d = &frame.data;
        Ok(RangerMessage::LightState(LightStateMessage {
            enable_cmd_ctrl: d[0] != 0,
            front_light: LightState {
                mode: decode_enum("front_light_mode", d[1])?,
                custom_value: d[2],
            },
            rear_light: LightState {
                mode: decode_enum("rear_light_mode", d[3])?,
                custom_value: d[4],
            },
        }))
    }

    fn decode_rc_state(frame: &RangerFrame) -> RangerMessage {
        let d = &frame.data;
        let switches = RcSwitches::from(u8::new(d[0]));
        RangerMessage::RcState(RcStateMessage {
            swa: RcSwitchState::from(switches.swa().value()),
            swb: RcSwitchState::from(switches.swb().value()),
            swc: RcSwitchState::from(switches.swc().value()),
            swd: RcSwitchState::from(switches.swd().value()),
            stick_right_h: d[1] as i8,
            stick_right_v: d[2] as i8,
            stick_left_v: d[3] as i8,
            stick_left_h: d[4] as i8,
            var_a: d[5] as i8,
        })
    }

    fn decode_actuator_hs(frame: &RangerFrame, motor_id: u8) -> RangerMessage {
        let d = &frame.data;
        RangerMessage::ActuatorHS(ActuatorHSStateMessage {
            motor_id,
            rpm: bytes_to_i16_be([d[0], d[1]]),
            current: bytes_to_i16_be([d[2], d[3]]) as f64 * 0.1,
            pulse_count: bytes_to_i32_be([d[4], d[5], d[6], d[7]]),
        })
    }

    fn decode_actuator_ls(frame: &RangerFrame, motor_id: u8) -> RangerMessage {
        let d = &frame.data;
        RangerMessage::ActuatorLS(ActuatorLSStateMessage {
            motor_id,
            driver_voltage: bytes_to_u16_be([d[0], d[1]]) as f64 * 0.1,
            driver_temp: bytes_to_i16_be([d[2], d[3]]) as f64,
            motor_temp: d[4] as i8 as f64,
            driver_state: d[5],
        })
    }

    fn decode_i16_quad(frame: &RangerFrame, scale: f64) -> [f64; 4] {
        let d = &frame.data;
        std::array::from_fn(|i| bytes_to_i16_be([d[i * 2], d[i * 2 + 1]]) as f64 * scale)
    }

    fn decode_bms_basic(frame: &RangerFrame) -> RangerMessage {
        let d = &frame.data;
        RangerMessage::BmsBasic(BmsBasicMessage {
            battery_soc: d[0],
            battery_soh: d[1],
            voltage: bytes_to_u16_be([d[2], d[3]]) as f64 * 0.01,
            current: bytes_to_i16_be([d[4], d[5]]) as f64 * 0.1,
            temperature: bytes_to_i16_be([d[6], d[7]]) as f64 * 0.1,
        })
    }

    fn decode_version(frame: &RangerFrame) -> RangerMessage {
        let d = &frame.data;
        RangerMessage::Version(VersionInfo {
            control_hw_version: bytes_to_u16_be([d[0], d[1]]),
            driver_hw_version: bytes_to_u16_be([d[2], d[3]]),
            control_sw_version: bytes_to_u16_be([d[4], d[5]]),
            driver_sw_version: bytes_to_u16_be([d[6], d[7]]),
        })
    }

    fn encode_motion(cmd: &MotionCommand) -> Result<RangerFrame, ProtocolError> {
        let linear = quantize_i16("linear_velocity", cmd.linear_velocity, 1000.0)?;
        let angular = quantize_i16("angular_velocity", cmd.angular_velocity, 1000.0)?;
        let steering = quantize_i16("steering_angle", cmd.steering_angle, 1000.0)?;

        let mut data = [0u8; 8];
        data[0..2].copy_from_slice(&i16_to_bytes_be(linear));
        data[2..4].copy_from_slice(&i16_to_bytes_be(angular));
        // Byte 4-5: 横向速度，Ranger 不使用
        data[6..8].copy_from_slice(&i16_to_bytes_be(steering));
        Ok(RangerFrame::new_standard(V2_ID_MOTION_COMMAND as u16, &data))
    }

    fn encode_light(enable: bool, cmd: &LightCommand) -> RangerFrame {
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
        RangerFrame::new_standard(V2_ID_LIGHT_COMMAND as u16, &data)
    }

    fn single_byte(id: u32, value: u8) -> RangerFrame {
        let mut data = [0u8; 8];
        data[0] = value;
        RangerFrame::new_standard(id as u16, &data)
    }
}

impl FrameCodec for V2Codec {
    fn version(&self) -> ProtocolVersion {
        ProtocolVersion::V2
    }

    fn decode(&self, frame: &RangerFrame) -> Result<Option<RangerMessage>, ProtocolError> {
        if frame.is_extended {
            return Ok(None);
        }

        let id = frame.id;
        let known = matches!(
            id,
            V2_ID_SYSTEM_STATE
                | V2_ID_MOTION_STATE
                | V2_ID_LIGHT_STATE
                | V2_ID_RC_STATE
                | V2_ID_MOTOR_ANGLE
                | V2_ID_MOTOR_SPEED
                | V2_ID_MOTION_MODE_STATE
                | V2_ID_ODOMETRY
                | V2_ID_BMS_BASIC
                | V2_ID_BMS_EXTENDED
                | V2_ID_VERSION_RESPONSE
        ) || v2_hs_motor_index(id).is_some()
            || v2_ls_motor_index(id).is_some();
        if !known {
            return Ok(None);
        }

        check_len(frame, 8)?;
        let d = &frame.data;

        let message = match id {
            V2_ID_SYSTEM_STATE => Self::decode_system_state(frame)?,
            V2_ID_MOTION_STATE => Self::decode_motion_state(frame),
            V2_ID_LIGHT_STATE => Self::decode_light_state(frame)?,
            V2_ID_RC_STATE => Self::decode_rc_state(frame),
            V2_ID_MOTOR_ANGLE => RangerMessage::MotorAngle(MotorAngleMessage {
                angles: Self::decode_i16_quad(frame, CENTIDEG_TO_RAD),
            }),
            V2_ID_MOTOR_SPEED => RangerMessage::MotorSpeed(MotorSpeedMessage {
                speeds: Self::decode_i16_quad(frame, 0.001),
            }),
            V2_ID_MOTION_MODE_STATE => RangerMessage::MotionModeState(MotionModeStateMessage {
                motion_mode: decode_enum("motion_mode", d[0])?,
                mode_changing: d[1] != 0,
            }),
            V2_ID_ODOMETRY => RangerMessage::Odometry(OdometryMessage {
                left_wheel: bytes_to_i32_be([d[0], d[1], d[2], d[3]]) as f64 / 1000.0,
                right_wheel: bytes_to_i32_be([d[4], d[5], d[6], d[7]]) as f64 / 1000.0,
            }),
            V2_ID_BMS_BASIC => Self::decode_bms_basic(frame),
            V2_ID_BMS_EXTENDED => RangerMessage::BmsExtended(BmsExtendedMessage {
                alarm_status_1: d[0],
                alarm_status_2: d[1],
                warning_status_1: d[2],
                warning_status_2: d[3],
            }),
            V2_ID_VERSION_RESPONSE => Self::decode_version(frame),
            _ => {
                if let Some(motor_id) = v2_hs_motor_index(id) {
                    Self::decode_actuator_hs(frame, motor_id)
                } else if let Some(motor_id) = v2_ls_motor_index(id) {
                    Self::decode_actuator_ls(frame, motor_id)
                } else {
                    return Ok(None);
                }
            },
        };

        Ok(Some(message))
    }

    fn encode(&self, command: &Command) -> Result<FrameBuffer, ProtocolError> {
        let frame = match command {
            Command::Motion(cmd) => Self::encode_motion(cmd)?,
            Command::Light(cmd) => Self::encode_light(true, cmd),
            Command::DisableLightControl => Self::encode_light(false, &LightCommand::default()),
            Command::SetMotionMode(mode) => Self::single_byte(V2_ID_MOTION_MODE_COMMAND, *mode as u8),
            Command::EnableCommandedMode => {
                Self::single_byte(V2_ID_CONTROL_MODE_CONFIG, ControlMode::CanCommand as u8)
            },
            Command::ResetState => Self::single_byte(V2_ID_STATE_RESET, 0x00),
            Command::VersionRequest => Self::single_byte(V2_ID_VERSION_REQUEST, 0x01),
        };
        Ok(smallvec![frame])
    }

    fn decode_motion_command(&self, frames: &[RangerFrame]) -> Result<MotionCommand, ProtocolError> {
        let frame = frames
            .iter()
            .find(|f| f.id == V2_ID_MOTION_COMMAND)
            .ok_or(ProtocolError::InvalidCanId {
                id: frames.first().map(|f| f.id).unwrap_or_default(),
            })?;
        check_len(frame, 8)?;
        let d = &frame.data;
        Ok(MotionCommand::new(
            bytes_to_i16_be([d[0], d[1]]) as f64 / 1000.0,
            bytes_to_i16_be([d[6], d[7]]) as f64 / 1000.0,
            bytes_to_i16_be([d[2], d[3]]) as f64 / 1000.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u32, data: [u8; 8]) -> RangerFrame {
        RangerFrame::new_standard(id as u16, &data)
    }

    #[test]
    fn test_decode_system_state() {
        // 急停, CAN 控制, 26.4V, 故障码 0x0004
        let msg = V2Codec
            .decode(&frame(0x211, [0x01, 0x01, 0x01, 0x08, 0x00, 0x04, 0x00, 0x07]))
            .unwrap()
            .unwrap();
        let RangerMessage::SystemState(state) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert_eq!(state.vehicle_state, VehicleState::EStop);
        assert_eq!(state.control_mode, ControlMode::CanCommand);
        assert!((state.battery_voltage - 26.4).abs() < 1e-9);
        assert!(state.error_flags().rc_signal_lost());
    }

    #[test]
    fn test_decode_motion_state_negative_values() {
        // -0.2 m/s, 0.5 rad/s, 0, -0.3 rad
        let msg = V2Codec
            .decode(&frame(0x221, [0xFF, 0x38, 0x01, 0xF4, 0x00, 0x00, 0xFE, 0xD4]))
            .unwrap()
            .unwrap();
        let RangerMessage::MotionState(motion) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert!((motion.linear_velocity + 0.2).abs() < 1e-9);
        assert!((motion.angular_velocity - 0.5).abs() < 1e-9);
        assert_eq!(motion.lateral_velocity, 0.0);
        assert!((motion.steering_angle + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_decode_actuator_hs_index_from_id() {
        // 2号电机: 1500 rpm, 2.5 A, 脉冲 -1
        let msg = V2Codec
            .decode(&frame(0x253, [0x05, 0xDC, 0x00, 0x19, 0xFF, 0xFF, 0xFF, 0xFF]))
            .unwrap()
            .unwrap();
        let RangerMessage::ActuatorHS(hs) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert_eq!(hs.motor_id, 2);
        assert_eq!(hs.rpm, 1500);
        assert!((hs.current - 2.5).abs() < 1e-9);
        assert_eq!(hs.pulse_count, -1);
    }

    #[test]
    fn test_decode_actuator_ls() {
        let msg = V2Codec
            .decode(&frame(0x262, [0x01, 0x04, 0x00, 0x23, 0xF6, 0x40, 0x00, 0x00]))
            .unwrap()
            .unwrap();
        let RangerMessage::ActuatorLS(ls) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert_eq!(ls.motor_id, 1);
        assert!((ls.driver_voltage - 26.0).abs() < 1e-9);
        assert_eq!(ls.driver_temp, 35.0);
        assert_eq!(ls.motor_temp, -10.0);
        assert!(ls.status().driver_enabled());
    }

    #[test]
    fn test_decode_rc_state() {
        let msg = V2Codec
            .decode(&frame(0x241, [0b00_10_01_00, 100, 0x9C, 0, 1, 50, 0, 0]))
            .unwrap()
            .unwrap();
        let RangerMessage::RcState(rc) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert_eq!(rc.swa, RcSwitchState::Up);
        assert_eq!(rc.swb, RcSwitchState::Middle);
        assert_eq!(rc.swc, RcSwitchState::Down);
        assert_eq!(rc.stick_right_h, 100);
        assert_eq!(rc.stick_right_v, -100);
        assert_eq!(rc.stick_left_h, 1);
        assert_eq!(rc.var_a, 50);
    }

    #[test]
    fn test_decode_motor_angles_to_radians() {
        // 9000 × 0.01° = 90°
        let msg = V2Codec
            .decode(&frame(0x271, [0x23, 0x28, 0, 0, 0xDC, 0xD8, 0, 0]))
            .unwrap()
            .unwrap();
        let RangerMessage::MotorAngle(angles) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert!((angles.angles[0] - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
        assert!((angles.angles[2] + std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_decode_odometry_and_bms() {
        let msg = V2Codec
            .decode(&frame(0x311, [0, 0, 0x03, 0xE8, 0xFF, 0xFF, 0xFC, 0x18]))
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            RangerMessage::Odometry(OdometryMessage {
                left_wheel: 1.0,
                right_wheel: -1.0
            })
        );

        let msg = V2Codec
            .decode(&frame(0x361, [87, 98, 0x0A, 0x28, 0xFF, 0xF6, 0x00, 0xFA]))
            .unwrap()
            .unwrap();
        let RangerMessage::BmsBasic(bms) = msg else {
            panic!("unexpected message {msg:?}");
        };
        assert_eq!(bms.battery_soc, 87);
        assert_eq!(bms.battery_soh, 98);
        assert!((bms.voltage - 26.0).abs() < 1e-9);
        assert!((bms.current + 1.0).abs() < 1e-9);
        assert!((bms.temperature - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_version_response() {
        let msg = V2Codec
            .decode(&frame(0x4A2, [0, 1, 0, 2, 0x01, 0x03, 0, 4]))
            .unwrap()
            .unwrap();
        assert_eq!(
            msg,
            RangerMessage::Version(VersionInfo {
                control_hw_version: 1,
                driver_hw_version: 2,
                control_sw_version: 0x0103,
                driver_sw_version: 4,
            })
        );
    }

    #[test]
    fn test_truncated_frame_is_error() {
        let short = RangerFrame::new_standard(0x221, &[0x00, 0x10, 0x00]);
        let err = V2Codec.decode(&short).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InvalidLength {
                id: 0x221,
                expected: 8,
                actual: 3
            }
        );
    }

    #[test]
    fn test_invalid_enum_value_is_error() {
        let err = V2Codec
            .decode(&frame(0x291, [0x09, 0, 0, 0, 0, 0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidValue { field: "motion_mode", value: 9 }));
    }

    #[test]
    fn test_unknown_id_is_ignored() {
        assert_eq!(V2Codec.decode(&frame(0x7FF, [0; 8])), Ok(None));
        // V1 ID 在 V2 下没有意义
        assert_eq!(V2Codec.decode(&frame(0x151, [0; 8])), Ok(None));
        // 未知 ID 即使长度不对也不是错误
        assert_eq!(V2Codec.decode(&RangerFrame::new_standard(0x700, &[1])), Ok(None));
    }

    #[test]
    fn test_encode_motion_command() {
        let frames = V2Codec
            .encode(&Command::Motion(MotionCommand::new(1.0, 0.2, -0.1)))
            .unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 0x111);
        assert_eq!(frames[0].data, [0x03, 0xE8, 0xFF, 0x9C, 0x00, 0x00, 0x00, 0xC8]);
    }

    #[test]
    fn test_encode_motion_overflow_is_error() {
        let err = V2Codec
            .encode(&Command::Motion(MotionCommand::new(100.0, 0.0, 0.0)))
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ValueOverflow { field: "linear_velocity", .. }));
    }

    #[test]
    fn test_encode_light_and_disable() {
        let cmd = LightCommand::new(LightMode::Custom, 80, LightMode::Breath, 0);
        let frames = V2Codec.encode(&Command::Light(cmd)).unwrap();
        assert_eq!(frames[0].id, 0x121);
        assert_eq!(&frames[0].data[..5], &[1, 3, 80, 2, 0]);

        let frames = V2Codec.encode(&Command::DisableLightControl).unwrap();
        assert_eq!(&frames[0].data[..5], &[0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_encode_control_frames() {
        let enable = V2Codec.encode(&Command::EnableCommandedMode).unwrap();
        assert_eq!((enable[0].id, enable[0].data[0]), (0x421, 0x01));

        let reset = V2Codec.encode(&Command::ResetState).unwrap();
        assert_eq!((reset[0].id, reset[0].data[0]), (0x441, 0x00));

        let version = V2Codec.encode(&Command::VersionRequest).unwrap();
        assert_eq!((version[0].id, version[0].data[0]), (0x4A1, 0x01));

        let mode = V2Codec.encode(&Command::SetMotionMode(MotionMode::Spinning)).unwrap();
        assert_eq!((mode[0].id, mode[0].data[0]), (0x141, 0x02));
    }

    #[test]
    fn test_motion_command_round_trip() {
        let cmd = MotionCommand::new(-0.75, 0.35, 0.125);
        let frames = V2Codec.encode(&Command::Motion(cmd)).unwrap();
        let decoded = V2Codec.decode_motion_command(&frames).unwrap();
        assert!((decoded.linear_velocity - cmd.linear_velocity).abs() <= 0.0005);
        assert!((decoded.steering_angle - cmd.steering_angle).abs() <= 0.0005);
        assert!((decoded.angular_velocity - cmd.angular_velocity).abs() <= 0.0005);
    }
}
