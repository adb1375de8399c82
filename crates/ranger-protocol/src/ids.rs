//! CAN ID 常量定义
//!
//! V1（旧版，带校验和）与 V2 两套 ID 表。两个版本的 ID 空间有重叠
//! （例如 0x141 在 V1 中是灯光反馈，在 V2 中是运动模式指令），
//! 因此 ID 只能在选定协议版本之后解释。

// ============================================================================
// V2 反馈帧 ID
// ============================================================================

/// 系统状态反馈
pub const V2_ID_SYSTEM_STATE: u32 = 0x211;

/// 运动状态反馈
pub const V2_ID_MOTION_STATE: u32 = 0x221;

/// 灯光状态反馈
pub const V2_ID_LIGHT_STATE: u32 = 0x231;

/// 遥控器状态反馈
pub const V2_ID_RC_STATE: u32 = 0x241;

/// 驱动器高速反馈（0x251~0x258）
pub const V2_ID_ACTUATOR_HS_BASE: u32 = 0x251;
pub const V2_ID_ACTUATOR_HS_END: u32 = 0x258;

/// 驱动器低速反馈（0x261~0x268）
pub const V2_ID_ACTUATOR_LS_BASE: u32 = 0x261;
pub const V2_ID_ACTUATOR_LS_END: u32 = 0x268;

/// 转向电机角度反馈
pub const V2_ID_MOTOR_ANGLE: u32 = 0x271;

/// 轮速反馈
pub const V2_ID_MOTOR_SPEED: u32 = 0x281;

/// 运动模式反馈
pub const V2_ID_MOTION_MODE_STATE: u32 = 0x291;

/// 里程计反馈
pub const V2_ID_ODOMETRY: u32 = 0x311;

/// BMS 基础信息
pub const V2_ID_BMS_BASIC: u32 = 0x361;

/// BMS 扩展信息（告警/警告）
pub const V2_ID_BMS_EXTENDED: u32 = 0x362;

/// 版本信息应答
pub const V2_ID_VERSION_RESPONSE: u32 = 0x4A2;

// ============================================================================
// V2 控制帧 ID
// ============================================================================

/// 运动控制指令
pub const V2_ID_MOTION_COMMAND: u32 = 0x111;

/// 灯光控制指令
pub const V2_ID_LIGHT_COMMAND: u32 = 0x121;

/// 运动模式设置指令
pub const V2_ID_MOTION_MODE_COMMAND: u32 = 0x141;

/// 控制模式设置（使能 CAN 指令模式）
pub const V2_ID_CONTROL_MODE_CONFIG: u32 = 0x421;

/// 状态复位（清除错误）
pub const V2_ID_STATE_RESET: u32 = 0x441;

/// 版本信息请求
pub const V2_ID_VERSION_REQUEST: u32 = 0x4A1;

// ============================================================================
// V1 帧 ID
// ============================================================================

/// 系统状态反馈
pub const V1_ID_SYSTEM_STATE: u32 = 0x151;

/// 运动状态反馈
pub const V1_ID_MOTION_STATE: u32 = 0x131;

/// 灯光状态反馈
pub const V1_ID_LIGHT_STATE: u32 = 0x141;

/// 驱动器反馈（电机序号在数据区 Byte 6）
pub const V1_ID_ACTUATOR_STATE: u32 = 0x200;

/// 速度控制指令（同时携带控制模式与故障清除标志）
pub const V1_ID_MOTION_COMMAND: u32 = 0x130;

/// 转向控制指令（同时携带运动模式）
pub const V1_ID_STEERING_COMMAND: u32 = 0x132;

/// 灯光控制指令
pub const V1_ID_LIGHT_COMMAND: u32 = 0x140;

/// 每个版本固定的驱动器数量（四轮）
pub const ACTUATOR_COUNT: usize = 4;

/// V2 高速反馈 ID 对应的电机序号
///
/// 返回 `None` 表示 ID 不在 0x251~0x258 范围内。序号可能 ≥ 4，
/// 由状态聚合层拒绝并记录为协议异常。
pub fn v2_hs_motor_index(id: u32) -> Option<u8> {
    (V2_ID_ACTUATOR_HS_BASE..=V2_ID_ACTUATOR_HS_END)
        .contains(&id)
        .then(|| (id - V2_ID_ACTUATOR_HS_BASE) as u8)
}

/// V2 低速反馈 ID 对应的电机序号
pub fn v2_ls_motor_index(id: u32) -> Option<u8> {
    (V2_ID_ACTUATOR_LS_BASE..=V2_ID_ACTUATOR_LS_END)
        .contains(&id)
        .then(|| (id - V2_ID_ACTUATOR_LS_BASE) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hs_motor_index() {
        assert_eq!(v2_hs_motor_index(0x251), Some(0));
        assert_eq!(v2_hs_motor_index(0x254), Some(3));
        assert_eq!(v2_hs_motor_index(0x258), Some(7));
        assert_eq!(v2_hs_motor_index(0x259), None);
        assert_eq!(v2_hs_motor_index(0x250), None);
    }

    #[test]
    fn test_ls_motor_index() {
        assert_eq!(v2_ls_motor_index(0x261), Some(0));
        assert_eq!(v2_ls_motor_index(0x264), Some(3));
        assert_eq!(v2_ls_motor_index(0x251), None);
    }
}
