//! SocketCAN CAN 适配器实现
//!
//! 支持 Linux 平台下的 SocketCAN 支持，使用内核级的 CAN 通讯接口。
//!
//! ## 特性
//!
//! - 支持标准帧和扩展帧
//! - 软件时间戳（接收时刻，微秒）
//! - 自动过滤错误帧
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**：SocketCAN 是 Linux 内核特性
//! - **接口配置**：波特率等配置由系统工具（`ip link`）完成，不在应用层设置

use crate::{CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, RangerFrame, SplittableAdapter};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, ExtendedId, Frame, Socket, StandardId};
use std::io::ErrorKind;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{trace, warn};

mod split;

pub use split::{SocketCanRxAdapter, SocketCanTxAdapter};

/// 默认读超时（与接收循环的轮询周期一致）
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2);

/// SocketCAN 适配器
///
/// # 示例
///
/// ```no_run
/// use ranger_can::{CanAdapter, RangerFrame, SocketCanAdapter};
///
/// let mut adapter = SocketCanAdapter::new("can0").unwrap();
/// adapter.send(RangerFrame::new_standard(0x421, &[0x01])).unwrap();
/// let frame = adapter.receive().unwrap();
/// ```
#[derive(Debug)]
pub struct SocketCanAdapter {
    socket: CanSocket,
    /// 接口名称（如 "can0"）
    interface: String,
    read_timeout: Duration,
}

impl SocketCanAdapter {
    /// 打开 CAN 接口
    ///
    /// # 错误
    /// - `CanError::Device(NotFound)`: 接口不存在
    /// - `CanError::Device(AccessDenied)`: 权限不足
    /// - `CanError::Device(Backend)`: 其他打开失败
    pub fn new(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        let socket = CanSocket::open(&interface).map_err(|e| {
            let kind = match e.kind() {
                ErrorKind::NotFound => CanDeviceErrorKind::NotFound,
                ErrorKind::PermissionDenied => CanDeviceErrorKind::AccessDenied,
                _ if e.raw_os_error() == Some(19) => CanDeviceErrorKind::NoDevice, // ENODEV
                _ => CanDeviceErrorKind::Backend,
            };
            CanError::Device(CanDeviceError::new(
                kind,
                format!("Failed to open CAN interface '{}': {}", interface, e),
            ))
        })?;

        socket.set_read_timeout(DEFAULT_READ_TIMEOUT).map_err(CanError::Io)?;

        trace!("SocketCAN interface '{}' opened", interface);

        Ok(Self {
            socket,
            interface,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    pub fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), CanError> {
        self.socket.set_read_timeout(timeout).map_err(CanError::Io)?;
        self.read_timeout = timeout;
        Ok(())
    }
}

impl CanAdapter for SocketCanAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError> {
        write_frame(&self.socket, &frame)
    }

    fn receive(&mut self) -> Result<RangerFrame, CanError> {
        read_data_frame(&self.socket)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        if let Err(e) = self.set_read_timeout(timeout) {
            warn!("Failed to set receive timeout: {}", e);
        }
    }
}

impl SplittableAdapter for SocketCanAdapter {
    type RxAdapter = SocketCanRxAdapter;
    type TxAdapter = SocketCanTxAdapter;

    /// 分离为独立的 RX 和 TX 适配器
    ///
    /// 两个半边通过 `dup()` 共享同一个打开文件描述，严禁在分离后使用
    /// `set_nonblocking()`，超时只能依赖 `SO_RCVTIMEO`。
    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        let rx_adapter = SocketCanRxAdapter::new(&self.socket, self.read_timeout)?;
        let tx_adapter = SocketCanTxAdapter::new(&self.socket)?;

        trace!(
            "SocketCanAdapter split into RX and TX adapters (interface: {})",
            self.interface
        );

        Ok((rx_adapter, tx_adapter))
    }
}

// ============================================================================
// RX/TX 共用的帧转换
// ============================================================================

/// 读错误分类，`None` 表示被信号打断（EINTR），应当直接重试
fn classify_read_error(e: std::io::Error) -> Option<CanError> {
    match e.kind() {
        ErrorKind::Interrupted => None,
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Some(CanError::Timeout),
        _ => Some(CanError::Io(e)),
    }
}

/// 阻塞读取直到收到数据帧，错误帧被丢弃
pub(crate) fn read_data_frame(socket: &CanSocket) -> Result<RangerFrame, CanError> {
    loop {
        let can_frame = match socket.read_frame() {
            Ok(can_frame) => can_frame,
            Err(e) => match classify_read_error(e) {
                Some(err) => return Err(err),
                None => {
                    trace!("read_frame interrupted by signal, retrying");
                    continue;
                },
            },
        };

        if let CanFrame::Error(err) = &can_frame {
            trace!("Dropping CAN error frame: {:?}", err);
            continue;
        }

        let frame = to_ranger_frame(&can_frame);
        trace!("Received CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
        return Ok(frame);
    }
}

/// 发送一帧（Fire-and-Forget）
pub(crate) fn write_frame(socket: &CanSocket, frame: &RangerFrame) -> Result<(), CanError> {
    let can_frame = to_can_frame(frame)?;
    socket.write_frame(&can_frame).map_err(CanError::Io)?;
    trace!("Sent CAN frame: ID=0x{:X}, len={}", frame.id, frame.len);
    Ok(())
}

fn to_can_frame(frame: &RangerFrame) -> Result<CanFrame, CanError> {
    let built = if frame.is_extended {
        ExtendedId::new(frame.id).and_then(|id| CanFrame::new(id, frame.data_slice()))
    } else {
        u16::try_from(frame.id)
            .ok()
            .and_then(StandardId::new)
            .and_then(|id| CanFrame::new(id, frame.data_slice()))
    };

    built.ok_or_else(|| {
        CanError::Device(CanDeviceError::new(
            CanDeviceErrorKind::InvalidFrame,
            format!("Failed to build CAN frame with ID 0x{:X}", frame.id),
        ))
    })
}

fn to_ranger_frame(can_frame: &CanFrame) -> RangerFrame {
    let payload = can_frame.data();
    // raw_id() 可能带标志位，按帧类型截取有效位
    let frame = if can_frame.is_extended() {
        RangerFrame::new_extended(can_frame.raw_id() & 0x1FFF_FFFF, payload)
    } else {
        RangerFrame::new_standard((can_frame.raw_id() & 0x7FF) as u16, payload)
    };
    frame.with_timestamp(software_timestamp_us())
}

/// 软件时间戳（Unix 纪元起的微秒数），仅用于诊断
fn software_timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
