//! 状态结构定义
//!
//! 三个聚合状态（核心 / 执行器 / 通用传感器）各自存放在一个 `ArcSwap` 中。
//! 接收循环是唯一写者：读取当前快照、复制、修改、整体替换；
//! 读者拿到的永远是某一次完整合并之后的值，不会看到写了一半的记录。

use crate::DriverError;
use crate::hooks::HookManager;
use arc_swap::ArcSwap;
use ranger_protocol::ids::ACTUATOR_COUNT;
use ranger_protocol::{
    ActuatorHSStateMessage, ActuatorLSStateMessage, BmsBasicMessage, BmsExtendedMessage,
    LightStateMessage, MotionModeStateMessage, MotionStateMessage, MotorAngleMessage,
    MotorSpeedMessage, OdometryMessage, RangerMessage, RcStateMessage, SystemStateMessage,
    VersionInfo,
};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

// ============================================================================
// 时间戳
// ============================================================================

static EPOCH: OnceLock<Instant> = OnceLock::new();

fn epoch() -> Instant {
    *EPOCH.get_or_init(Instant::now)
}

/// 单调时间戳
///
/// 内部保存 `Instant`，只在对外接口处换算成毫秒。
/// 毫秒值相对于进程内第一次取时间戳的时刻（单调时钟，不是墙上时间）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(Instant);

impl Timestamp {
    /// 当前时刻
    pub fn now() -> Self {
        let _ = epoch();
        Self(Instant::now())
    }

    /// 纪元时刻（毫秒值为 0）
    pub fn epoch() -> Self {
        Self(epoch())
    }

    /// 纪元起的毫秒数
    pub fn as_millis(&self) -> u64 {
        self.0.saturating_duration_since(epoch()).as_millis() as u64
    }

    /// 从纪元起的毫秒数还原
    pub fn from_millis(millis: u64) -> Self {
        let base = epoch();
        Self(base.checked_add(Duration::from_millis(millis)).unwrap_or(base))
    }

    /// 距今经过的时间（用于判断状态是否过期）
    pub fn elapsed(&self) -> Duration {
        self.0.elapsed()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::epoch()
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Timestamp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.as_millis())
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Timestamp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <u64 as serde::Deserialize>::deserialize(deserializer).map(Self::from_millis)
    }
}

// ============================================================================
// 聚合状态
// ============================================================================

/// 核心状态（系统 / 运动 / 灯光 / 运动模式 / 遥控器 / 里程计）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangerCoreState {
    /// 最近一次合并的时刻
    pub time_stamp: Timestamp,
    pub system_state: SystemStateMessage,
    pub motion_state: MotionStateMessage,
    pub light_state: LightStateMessage,
    pub motion_mode_state: MotionModeStateMessage,
    pub rc_state: RcStateMessage,
    pub odometry: OdometryMessage,
}

/// 执行器状态（4 个轮子，按 0..4 索引）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangerActuatorState {
    pub time_stamp: Timestamp,
    pub motor_angles: MotorAngleMessage,
    pub motor_speeds: MotorSpeedMessage,
    pub actuator_hs_state: [ActuatorHSStateMessage; ACTUATOR_COUNT],
    pub actuator_ls_state: [ActuatorLSStateMessage; ACTUATOR_COUNT],
}

fn list_size_error(len: usize) -> DriverError {
    DriverError::InvalidArgument(format!("List size must be {}, got {}", ACTUATOR_COUNT, len))
}

fn check_slot(index: usize) -> Result<usize, DriverError> {
    if index < ACTUATOR_COUNT {
        Ok(index)
    } else {
        Err(DriverError::IndexOutOfRange {
            index,
            len: ACTUATOR_COUNT,
        })
    }
}

impl RangerActuatorState {
    /// 整体替换 4 个高速反馈槽位，长度必须为 4
    pub fn set_actuator_hs_state(
        &mut self,
        states: &[ActuatorHSStateMessage],
    ) -> Result<(), DriverError> {
        self.actuator_hs_state = states.try_into().map_err(|_| list_size_error(states.len()))?;
        Ok(())
    }

    /// 整体替换 4 个低速反馈槽位，长度必须为 4
    pub fn set_actuator_ls_state(
        &mut self,
        states: &[ActuatorLSStateMessage],
    ) -> Result<(), DriverError> {
        self.actuator_ls_state = states.try_into().map_err(|_| list_size_error(states.len()))?;
        Ok(())
    }

    pub fn set_actuator_hs_slot(
        &mut self,
        index: usize,
        state: ActuatorHSStateMessage,
    ) -> Result<(), DriverError> {
        self.actuator_hs_state[check_slot(index)?] = state;
        Ok(())
    }

    pub fn set_actuator_ls_slot(
        &mut self,
        index: usize,
        state: ActuatorLSStateMessage,
    ) -> Result<(), DriverError> {
        self.actuator_ls_state[check_slot(index)?] = state;
        Ok(())
    }
}

/// 通用传感器状态（BMS）
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RangerCommonSensorState {
    pub time_stamp: Timestamp,
    pub bms_basic_state: BmsBasicMessage,
    pub bms_extended_state: BmsExtendedMessage,
}

// ============================================================================
// 上下文
// ============================================================================

/// Ranger 上下文（所有状态的聚合）
pub struct RangerContext {
    /// 核心状态（50Hz 级别的系统/运动反馈）
    pub core: ArcSwap<RangerCoreState>,
    /// 执行器状态（每个轮子独立的高速/低速反馈）
    pub actuator: ArcSwap<RangerActuatorState>,
    /// 通用传感器状态
    pub sensor: ArcSwap<RangerCommonSensorState>,
    /// 固件版本（按需查询，冷数据用 RwLock）
    pub version_info: RwLock<Option<VersionInfo>>,
    /// 帧回调
    pub hooks: RwLock<HookManager>,
}

impl RangerContext {
    pub fn new() -> Self {
        Self {
            core: ArcSwap::from_pointee(RangerCoreState::default()),
            actuator: ArcSwap::from_pointee(RangerActuatorState::default()),
            sensor: ArcSwap::from_pointee(RangerCommonSensorState::default()),
            version_info: RwLock::new(None),
            hooks: RwLock::new(HookManager::new()),
        }
    }

    pub fn core_state(&self) -> RangerCoreState {
        **self.core.load()
    }

    pub fn actuator_state(&self) -> RangerActuatorState {
        **self.actuator.load()
    }

    pub fn sensor_state(&self) -> RangerCommonSensorState {
        **self.sensor.load()
    }

    pub fn version_info(&self) -> Option<VersionInfo> {
        self.version_info.read().ok().and_then(|guard| *guard)
    }

    pub(crate) fn clear_version_info(&self) -> Result<(), DriverError> {
        *self.version_info.write().map_err(|_| DriverError::PoisonedLock)? = None;
        Ok(())
    }

    /// 把一条解码后的消息合并进对应的聚合状态
    ///
    /// 只更新该消息对应的字段，并把该聚合的时间戳刷新为当前时刻。
    /// 执行器索引越界时返回 `IndexOutOfRange`，状态保持不变。
    ///
    /// 只能由接收循环调用：读-改-写之间没有 CAS，依赖单写者。
    pub fn merge(&self, message: &RangerMessage) -> Result<(), DriverError> {
        match *message {
            RangerMessage::SystemState(m) => self.update_core(|s| s.system_state = m),
            RangerMessage::MotionState(m) => self.update_core(|s| s.motion_state = m),
            RangerMessage::LightState(m) => self.update_core(|s| s.light_state = m),
            RangerMessage::RcState(m) => self.update_core(|s| s.rc_state = m),
            RangerMessage::MotionModeState(m) => self.update_core(|s| s.motion_mode_state = m),
            RangerMessage::Odometry(m) => self.update_core(|s| s.odometry = m),
            RangerMessage::ActuatorHS(m) => {
                return self.update_actuator(|s| s.set_actuator_hs_slot(m.motor_id as usize, m));
            },
            RangerMessage::ActuatorLS(m) => {
                return self.update_actuator(|s| s.set_actuator_ls_slot(m.motor_id as usize, m));
            },
            RangerMessage::ActuatorV1(m) => {
                return self.update_actuator(|s| {
                    let index = check_slot(m.motor_id as usize)?;
                    let hs = &mut s.actuator_hs_state[index];
                    hs.motor_id = m.motor_id;
                    hs.rpm = m.rpm;
                    hs.current = m.current;
                    let ls = &mut s.actuator_ls_state[index];
                    ls.motor_id = m.motor_id;
                    ls.driver_temp = m.driver_temp;
                    ls.motor_temp = m.motor_temp;
                    Ok(())
                });
            },
            RangerMessage::MotorAngle(m) => {
                return self.update_actuator(|s| {
                    s.motor_angles = m;
                    Ok(())
                });
            },
            RangerMessage::MotorSpeed(m) => {
                return self.update_actuator(|s| {
                    s.motor_speeds = m;
                    Ok(())
                });
            },
            RangerMessage::BmsBasic(m) => self.update_sensor(|s| s.bms_basic_state = m),
            RangerMessage::BmsExtended(m) => self.update_sensor(|s| s.bms_extended_state = m),
            RangerMessage::Version(info) => {
                *self.version_info.write().map_err(|_| DriverError::PoisonedLock)? = Some(info);
            },
        }
        Ok(())
    }

    fn update_core(&self, f: impl FnOnce(&mut RangerCoreState)) {
        let mut next = **self.core.load();
        f(&mut next);
        next.time_stamp = Timestamp::now();
        self.core.store(Arc::new(next));
    }

    fn update_actuator(
        &self,
        f: impl FnOnce(&mut RangerActuatorState) -> Result<(), DriverError>,
    ) -> Result<(), DriverError> {
        let mut next = **self.actuator.load();
        f(&mut next)?;
        next.time_stamp = Timestamp::now();
        self.actuator.store(Arc::new(next));
        Ok(())
    }

    fn update_sensor(&self, f: impl FnOnce(&mut RangerCommonSensorState)) {
        let mut next = **self.sensor.load();
        f(&mut next);
        next.time_stamp = Timestamp::now();
        self.sensor.store(Arc::new(next));
    }
}

impl Default for RangerContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ranger_protocol::{ActuatorV1StateMessage, ControlMode, VehicleState};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    fn motion(linear: f64, angular: f64) -> RangerMessage {
        RangerMessage::MotionState(MotionStateMessage {
            linear_velocity: linear,
            angular_velocity: angular,
            ..Default::default()
        })
    }

    fn hs(motor_id: u8, rpm: i16) -> ActuatorHSStateMessage {
        ActuatorHSStateMessage {
            motor_id,
            rpm,
            current: 1.5,
            pulse_count: 100 * rpm as i32,
        }
    }

    #[test]
    fn test_context_default_state() {
        let ctx = RangerContext::new();
        let core = ctx.core_state();
        assert_eq!(core.time_stamp.as_millis(), 0);
        assert_eq!(core.motion_state.linear_velocity, 0.0);
        assert!(ctx.version_info().is_none());
    }

    #[test]
    fn test_merge_updates_only_matching_fields() {
        let ctx = RangerContext::new();
        ctx.merge(&RangerMessage::SystemState(SystemStateMessage {
            vehicle_state: VehicleState::Normal,
            control_mode: ControlMode::CanCommand,
            battery_voltage: 26.4,
            error_code: 0,
        }))
        .unwrap();

        let core = ctx.core_state();
        assert_eq!(core.system_state.control_mode, ControlMode::CanCommand);
        assert_eq!(core.system_state.battery_voltage, 26.4);
        assert_eq!(core.motion_state, MotionStateMessage::default());
        assert!(core.time_stamp >= Timestamp::epoch());

        // 其他聚合不受影响
        assert_eq!(ctx.actuator_state().time_stamp, Timestamp::epoch());
        assert_eq!(ctx.sensor_state().time_stamp, Timestamp::epoch());
    }

    #[test]
    fn test_merge_twice_changes_only_timestamp() {
        let ctx = RangerContext::new();
        let msg = motion(0.8, 0.1);

        ctx.merge(&msg).unwrap();
        let first = ctx.core_state();
        thread::sleep(Duration::from_millis(2));
        ctx.merge(&msg).unwrap();
        let second = ctx.core_state();

        assert!(second.time_stamp > first.time_stamp);
        assert_eq!(
            RangerCoreState {
                time_stamp: first.time_stamp,
                ..second
            },
            first
        );
    }

    #[test]
    fn test_newer_frame_wins() {
        let ctx = RangerContext::new();
        ctx.merge(&motion(0.2, 0.0)).unwrap();
        ctx.merge(&motion(0.9, 0.3)).unwrap();
        let core = ctx.core_state();
        assert_eq!(core.motion_state.linear_velocity, 0.9);
        assert_eq!(core.motion_state.angular_velocity, 0.3);
    }

    #[test]
    fn test_reading_twice_without_merge_keeps_timestamp() {
        let ctx = RangerContext::new();
        ctx.merge(&motion(0.5, 0.0)).unwrap();
        let a = ctx.core_state().time_stamp;
        thread::sleep(Duration::from_millis(2));
        let b = ctx.core_state().time_stamp;
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_four_hs_slots_populated() {
        let ctx = RangerContext::new();
        for i in 0..4u8 {
            ctx.merge(&RangerMessage::ActuatorHS(hs(i, 100 + i as i16))).unwrap();
        }
        let state = ctx.actuator_state();
        assert_eq!(state.actuator_hs_state.len(), 4);
        for (i, slot) in state.actuator_hs_state.iter().enumerate() {
            assert_eq!(slot.motor_id, i as u8);
            assert_eq!(slot.rpm, 100 + i as i16);
        }
    }

    #[test]
    fn test_out_of_range_index_rejected_without_mutation() {
        let ctx = RangerContext::new();
        ctx.merge(&RangerMessage::ActuatorHS(hs(2, 500))).unwrap();
        let before = ctx.actuator_state();

        let result = ctx.merge(&RangerMessage::ActuatorHS(hs(4, 999)));
        assert!(matches!(
            result,
            Err(DriverError::IndexOutOfRange { index: 4, len: 4 })
        ));

        let result = ctx.merge(&RangerMessage::ActuatorV1(ActuatorV1StateMessage {
            motor_id: 7,
            ..Default::default()
        }));
        assert!(result.is_err());

        // 时间戳也不变：失败的合并没有发布新快照
        assert_eq!(ctx.actuator_state(), before);
    }

    #[test]
    fn test_v1_actuator_updates_both_slots() {
        let ctx = RangerContext::new();
        ctx.merge(&RangerMessage::ActuatorV1(ActuatorV1StateMessage {
            motor_id: 1,
            rpm: -320,
            current: 2.5,
            driver_temp: 41.0,
            motor_temp: 38.0,
        }))
        .unwrap();

        let state = ctx.actuator_state();
        assert_eq!(state.actuator_hs_state[1].rpm, -320);
        assert_eq!(state.actuator_hs_state[1].current, 2.5);
        assert_eq!(state.actuator_ls_state[1].driver_temp, 41.0);
        assert_eq!(state.actuator_ls_state[1].motor_temp, 38.0);
        assert_eq!(state.actuator_hs_state[0], ActuatorHSStateMessage::default());
    }

    #[test]
    fn test_set_actuator_state_requires_four_entries() {
        let mut state = RangerActuatorState::default();
        let three = [hs(0, 1), hs(1, 2), hs(2, 3)];
        assert!(matches!(
            state.set_actuator_hs_state(&three),
            Err(DriverError::InvalidArgument(msg)) if msg.contains("List size must be 4")
        ));
        assert_eq!(state.actuator_hs_state, [ActuatorHSStateMessage::default(); 4]);

        let four = [hs(0, 1), hs(1, 2), hs(2, 3), hs(3, 4)];
        state.set_actuator_hs_state(&four).unwrap();
        assert_eq!(state.actuator_hs_state[3].rpm, 4);

        let five = [ActuatorLSStateMessage::default(); 5];
        assert!(state.set_actuator_ls_state(&five).is_err());

        assert!(matches!(
            state.set_actuator_ls_slot(4, ActuatorLSStateMessage::default()),
            Err(DriverError::IndexOutOfRange { index: 4, len: 4 })
        ));
    }

    #[test]
    fn test_sensor_and_version_merge() {
        let ctx = RangerContext::new();
        ctx.merge(&RangerMessage::BmsBasic(BmsBasicMessage {
            battery_soc: 87,
            battery_soh: 99,
            voltage: 26.1,
            current: -3.2,
            temperature: 25.0,
        }))
        .unwrap();
        ctx.merge(&RangerMessage::Version(VersionInfo {
            control_hw_version: 0x0102,
            ..Default::default()
        }))
        .unwrap();

        assert_eq!(ctx.sensor_state().bms_basic_state.battery_soc, 87);
        assert_eq!(ctx.version_info().map(|v| v.control_hw_version), Some(0x0102));

        ctx.clear_version_info().unwrap();
        assert!(ctx.version_info().is_none());
    }

    #[test]
    fn test_timestamp_millis_roundtrip() {
        let ts = Timestamp::from_millis(1234);
        assert_eq!(ts.as_millis(), 1234);
        assert_eq!(Timestamp::default().as_millis(), 0);
        assert!(Timestamp::now() >= Timestamp::epoch());
    }

    #[test]
    fn test_quiet_bus_shows_as_stale_timestamp() {
        let ctx = RangerContext::new();
        ctx.merge(&motion(0.1, 0.0)).unwrap();
        thread::sleep(Duration::from_millis(20));
        // 没有新的合并，时间戳停在上一次
        assert!(ctx.core_state().time_stamp.elapsed() >= Duration::from_millis(20));
    }

    /// 并发读：读者永远看不到一半新一半旧的运动状态
    #[test]
    fn test_concurrent_readers_never_see_torn_state() {
        let ctx = Arc::new(RangerContext::new());
        let done = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let ctx = ctx.clone();
                let done = done.clone();
                thread::spawn(move || {
                    let mut last = Timestamp::epoch();
                    while !done.load(Ordering::Acquire) {
                        let core = ctx.core_state();
                        assert_eq!(
                            core.motion_state.linear_velocity,
                            core.motion_state.angular_velocity
                        );
                        assert!(core.time_stamp >= last);
                        last = core.time_stamp;
                    }
                })
            })
            .collect();

        for i in 0..5000 {
            let v = i as f64 * 0.001;
            ctx.merge(&motion(v, v)).unwrap();
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(ctx.core_state().motion_state.linear_velocity, 4999.0 * 0.001);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_timestamp_serializes_as_millis() {
        let state = RangerCommonSensorState {
            time_stamp: Timestamp::from_millis(250),
            ..Default::default()
        };
        let json = serde_json::to_value(state).unwrap();
        assert_eq!(json["time_stamp"], 250);

        let back: RangerCommonSensorState = serde_json::from_value(json).unwrap();
        assert_eq!(back.time_stamp.as_millis(), 250);
    }
}
