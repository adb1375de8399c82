//! 内存 CAN 总线（测试用）
//!
//! `MockCanAdapter` 的另一端是 [`MockBusHandle`]：测试代码通过 handle
//! 注入“底盘发出”的反馈帧，并读取驱动层发送的指令帧。
//! 调用 [`MockBusHandle::close`] 后接收端返回设备错误，
//! 用于模拟通道中途断开。

use crate::{
    CanAdapter, CanDeviceError, CanDeviceErrorKind, CanError, RangerFrame, RxAdapter,
    SplittableAdapter, TxAdapter,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(2);

fn closed_error() -> CanError {
    CanError::Device(CanDeviceError::new(CanDeviceErrorKind::Closed, "mock bus closed"))
}

/// 测试侧句柄
#[derive(Clone)]
pub struct MockBusHandle {
    inbound_tx: Arc<Mutex<Option<Sender<RangerFrame>>>>,
    outbound_rx: Receiver<RangerFrame>,
}

impl MockBusHandle {
    /// 注入一帧，驱动层的接收端会读到它
    ///
    /// 总线已关闭时返回 `false`。
    pub fn inject(&self, frame: RangerFrame) -> bool {
        match self.inbound_tx.lock() {
            Ok(guard) => guard.as_ref().is_some_and(|tx| tx.send(frame).is_ok()),
            Err(_) => false,
        }
    }

    /// 取出目前为止驱动层发送的所有帧
    pub fn take_sent(&self) -> Vec<RangerFrame> {
        self.outbound_rx.try_iter().collect()
    }

    /// 等待下一帧发送帧
    pub fn recv_sent_timeout(&self, timeout: Duration) -> Option<RangerFrame> {
        self.outbound_rx.recv_timeout(timeout).ok()
    }

    /// 关闭总线，接收端在读完已注入的帧后返回错误
    pub fn close(&self) {
        if let Ok(mut guard) = self.inbound_tx.lock() {
            guard.take();
        }
    }
}

/// 内存 CAN 适配器
pub struct MockCanAdapter {
    inbound_rx: Receiver<RangerFrame>,
    outbound_tx: Sender<RangerFrame>,
    read_timeout: Duration,
}

impl MockCanAdapter {
    /// 创建适配器和对应的测试句柄
    pub fn new() -> (Self, MockBusHandle) {
        let (inbound_tx, inbound_rx) = crossbeam_channel::unbounded();
        let (outbound_tx, outbound_rx) = crossbeam_channel::unbounded();
        (
            Self {
                inbound_rx,
                outbound_tx,
                read_timeout: DEFAULT_READ_TIMEOUT,
            },
            MockBusHandle {
                inbound_tx: Arc::new(Mutex::new(Some(inbound_tx))),
                outbound_rx,
            },
        )
    }
}

fn recv(rx: &Receiver<RangerFrame>, timeout: Duration) -> Result<RangerFrame, CanError> {
    if timeout.is_zero() {
        return match rx.try_recv() {
            Ok(frame) => Ok(frame),
            Err(TryRecvError::Empty) => Err(CanError::Timeout),
            Err(TryRecvError::Disconnected) => Err(closed_error()),
        };
    }
    match rx.recv_timeout(timeout) {
        Ok(frame) => Ok(frame),
        Err(RecvTimeoutError::Timeout) => Err(CanError::Timeout),
        Err(RecvTimeoutError::Disconnected) => Err(closed_error()),
    }
}

fn send(tx: &Sender<RangerFrame>, frame: RangerFrame) -> Result<(), CanError> {
    tx.send(frame).map_err(|_| closed_error())
}

impl CanAdapter for MockCanAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError> {
        send(&self.outbound_tx, frame)
    }

    fn receive(&mut self) -> Result<RangerFrame, CanError> {
        recv(&self.inbound_rx, self.read_timeout)
    }

    fn set_receive_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}

impl SplittableAdapter for MockCanAdapter {
    type RxAdapter = MockRxAdapter;
    type TxAdapter = MockTxAdapter;

    fn split(self) -> Result<(Self::RxAdapter, Self::TxAdapter), CanError> {
        Ok((
            MockRxAdapter {
                inbound_rx: self.inbound_rx,
                read_timeout: self.read_timeout,
            },
            MockTxAdapter {
                outbound_tx: self.outbound_tx,
            },
        ))
    }
}

/// 内存总线的接收半边
pub struct MockRxAdapter {
    inbound_rx: Receiver<RangerFrame>,
    read_timeout: Duration,
}

impl RxAdapter for MockRxAdapter {
    fn receive(&mut self) -> Result<RangerFrame, CanError> {
        recv(&self.inbound_rx, self.read_timeout)
    }
}

/// 内存总线的发送半边
pub struct MockTxAdapter {
    outbound_tx: Sender<RangerFrame>,
}

impl TxAdapter for MockTxAdapter {
    fn send(&mut self, frame: RangerFrame) -> Result<(), CanError> {
        send(&self.outbound_tx, frame)
    }
}
