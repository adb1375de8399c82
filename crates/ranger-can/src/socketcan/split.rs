//! SocketCAN 适配器分离实现
//!
//! 基于 `as_fd().try_clone_to_owned()`（`dup()`）得到两个独立的 FD，
//! RX 线程和 TX 线程各持有一个。

use super::{read_data_frame, write_frame};
use crate::{CanError, RangerFrame, RxAdapter, TxAdapter};
use socketcan::{CanSocket, Socket};
use std::os::fd::AsFd;
use std::time::Duration;

/// 只读适配器（用于 RX 线程）
pub struct SocketCanRxAdapter {
    socket: CanSocket,
}

impl SocketCanRxAdapter {
    /// `dup()` 出的 FD 共享 `SO_RCVTIMEO`，这里按传入值重新设置一次
    pub fn new(socket: &CanSocket, read_timeout: Duration) -> Result<Self, CanError> {
        let rx_socket = socket.as_fd().try_clone_to_owned().map(CanSocket::from).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to clone SocketCAN socket for RX: {}",
                e
            )))
        })?;
        rx_socket.set_read_timeout(read_timeout).map_err(CanError::Io)?;

        Ok(Self { socket: rx_socket })
    }
}

impl RxAdapter for SocketCanRxAdapter {
    fn receive(&mut self) -> Result<RangerFrame, CanError> {
        read_data_frame(&self.socket)
    }
}

/// 只写适配器（用于 TX 线程）
pub struct SocketCanTxAdapter {
    socket: CanSocket,
}

impl SocketCanTxAdapter {
    pub fn new(socket: &CanSocket) -> Result<Self, CanError> {
        let tx_socket = socket.as_fd().try_clone_to_owned().map(CanSocket::from).map_err(|e| {
            CanError::Io(std::io::Error::other(format!(
                "Failed to clone SocketCAN socket for TX: {}",
                e
            )))
        })?;
        Ok(Self { socket: tx_socket })
    }
}

impl TxAdapter for SocketCanTxAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError> {
        write_frame(&self.socket, &frame)
    }
}
