//! 配置文件加载测试

use ranger_can::MockCanAdapter;
use ranger_sdk::{ConfigError, ProtocolSetting, ProtocolVersion, RangerConfig, RangerRobot};
use std::io::Write;
use std::time::Duration;

#[test]
fn load_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
interface = "vcan0"
protocol = "v1"
detect_timeout_ms = 500

[pipeline]
receive_timeout_ms = 5

[limits]
max_steer_angle = 0.5
"#
    )
    .unwrap();

    let config = RangerConfig::load(file.path()).unwrap();
    assert_eq!(config.interface, "vcan0");
    assert_eq!(config.protocol, ProtocolSetting::V1);
    assert_eq!(config.detect_timeout(), Duration::from_millis(500));
    assert_eq!(config.pipeline.receive_timeout_ms, 5);
    assert_eq!(config.limits.max_steer_angle, 0.5);
}

#[test]
fn invalid_file_reports_parse_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "protocol = \"v3\"").unwrap();
    assert!(matches!(RangerConfig::load(file.path()), Err(ConfigError::Parse(_))));
}

#[test]
fn config_limits_reach_the_dispatcher() {
    let config = RangerConfig::from_toml_str(
        r#"
protocol = "v2"

[limits]
max_linear_velocity = 0.5
"#,
    )
    .unwrap();

    let mut robot = RangerRobot::from_config(&config);
    let (can, _bus) = MockCanAdapter::new();
    robot.connect_with(can).unwrap();
    assert_eq!(robot.get_parser_protocol_version(), ProtocolVersion::V2);

    robot.enable_commanded_mode().unwrap();
    robot.set_motion_command(0.4, 0.0, 0.0).unwrap();
    assert!(robot.set_motion_command(0.8, 0.0, 0.0).is_err());
}

#[test]
fn builder_uses_config_interface() {
    let config = RangerConfig {
        interface: "  ".to_string(),
        ..Default::default()
    };
    assert!(config.validate().is_err());
    // 驱动层 Builder 同样拒绝空接口名
    assert!(config.builder().build().is_err());
}

mod limits_validation {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn non_positive_limits_are_rejected(value in -10.0f64..=0.0) {
            let raw = format!("[limits]\nmax_angular_velocity = {:?}\n", value);
            prop_assert!(matches!(
                RangerConfig::from_toml_str(&raw),
                Err(ConfigError::Invalid(_))
            ));
        }

        #[test]
        fn positive_limits_round_trip(value in 0.01f64..10.0) {
            let mut config = RangerConfig::default();
            config.limits.max_linear_velocity = value;
            let text = config.to_toml_string().unwrap();
            let back = RangerConfig::from_toml_str(&text).unwrap();
            prop_assert_eq!(back.limits.max_linear_velocity, value);
        }
    }
}
