//! # Calbench Bus Layer
//!
//! 仪器总线抽象层，提供统一的会话接口。
//!
//! 上层（`calbench-driver`）只依赖 [`InstrumentBus`] trait：
//! 按行收发文本、总线触发、设备清除、服务请求（SRQ）回调注册、返回本地控制。
//!
//! ## 后端
//!
//! - [`prologix`]: LAN-GPIB 控制器（`++` 指令方言，TCP）
//! - `mock`: 模拟数字万用表（需启用 `mock` feature）

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use calbench_protocol::StatusByte;

pub mod address;
pub mod prologix;

#[cfg(feature = "mock")]
pub mod mock;

pub use address::BusAddress;
pub use prologix::PrologixBus;

#[cfg(feature = "mock")]
pub use mock::{ReadingSource, ScriptedReadings, SimMonitor, SimulatedDmm};

/// 总线层统一错误类型
#[derive(Error, Debug)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Read timeout")]
    Timeout,
    #[error("Session disconnected")]
    Disconnected,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Device Error: {0}")]
    Device(String),
}

impl BusError {
    /// 是否为超时（会话超时由传输层负责）
    pub fn is_timeout(&self) -> bool {
        match self {
            BusError::Timeout => true,
            BusError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// 待处理中断事件的确认接口
///
/// 每次 SRQ 通知后必须丢弃/确认挂起的事件，否则下一次中断不会重新布防。
pub trait EventQueue: Send + Sync {
    fn discard_pending_events(&self) -> Result<(), BusError>;
}

/// 一次服务请求通知
///
/// 由传输层的通知上下文（非测试序列线程）构造并传给回调。
pub struct ServiceRequest<'a> {
    status: StatusByte,
    events: &'a dyn EventQueue,
}

impl<'a> ServiceRequest<'a> {
    pub fn new(status: StatusByte, events: &'a dyn EventQueue) -> Self {
        Self { status, events }
    }

    /// 串行轮询得到的状态字节（对核心而言是不透明值，仅用于日志）
    pub fn status(&self) -> StatusByte {
        self.status
    }

    /// 丢弃挂起的 SRQ 事件（回调返回前必须调用）
    pub fn discard_pending_events(&self) -> Result<(), BusError> {
        self.events.discard_pending_events()
    }
}

/// SRQ 回调类型
///
/// 在传输层自己的线程中调用，必须非阻塞。
pub type ServiceRequestHandler = Arc<dyn Fn(&ServiceRequest<'_>) + Send + Sync>;

/// 仪器会话
///
/// 会话及其唯一的指令/响应字节管道由驱动层独占，只在测试序列线程中访问；
/// 唯一跨线程的入口是 [`on_service_request`](InstrumentBus::on_service_request) 注册的回调。
pub trait InstrumentBus: Send {
    /// 发送一行文本（传输层负责行终止符）
    fn write_line(&mut self, line: &str) -> Result<(), BusError>;

    /// 读取一行响应（不含行终止符），受会话超时约束
    fn read_line(&mut self) -> Result<String, BusError>;

    /// 发出总线触发（GPIB GET）
    fn assert_trigger(&mut self) -> Result<(), BusError>;

    /// 设备清除（GPIB SDC）
    fn clear(&mut self) -> Result<(), BusError>;

    /// 设置会话超时
    fn set_timeout(&mut self, timeout: Duration);

    /// 当前会话超时
    fn timeout(&self) -> Duration;

    /// 注册 SRQ 回调（替换之前的回调）
    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), BusError>;

    /// 释放远程控制，返回前面板本地操作
    fn return_to_local(&mut self) -> Result<(), BusError>;
}

impl<B: InstrumentBus + ?Sized> InstrumentBus for Box<B> {
    fn write_line(&mut self, line: &str) -> Result<(), BusError> {
        (**self).write_line(line)
    }

    fn read_line(&mut self) -> Result<String, BusError> {
        (**self).read_line()
    }

    fn assert_trigger(&mut self) -> Result<(), BusError> {
        (**self).assert_trigger()
    }

    fn clear(&mut self) -> Result<(), BusError> {
        (**self).clear()
    }

    fn set_timeout(&mut self, timeout: Duration) {
        (**self).set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        (**self).timeout()
    }

    fn on_service_request(&mut self, handler: ServiceRequestHandler) -> Result<(), BusError> {
        (**self).on_service_request(handler)
    }

    fn return_to_local(&mut self) -> Result<(), BusError> {
        (**self).return_to_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingQueue(AtomicUsize);

    impl EventQueue for CountingQueue {
        fn discard_pending_events(&self) -> Result<(), BusError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_service_request_forwards_discard() {
        let queue = CountingQueue(AtomicUsize::new(0));
        let request = ServiceRequest::new(StatusByte(0x41), &queue);

        assert!(request.status().measurement_summary());
        request.discard_pending_events().unwrap();
        assert_eq!(queue.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bus_error_timeout_classification() {
        assert!(BusError::Timeout.is_timeout());
        assert!(BusError::Io(std::io::Error::from(std::io::ErrorKind::WouldBlock)).is_timeout());
        assert!(!BusError::Disconnected.is_timeout());
        assert_eq!(format!("{}", BusError::Timeout), "Read timeout");
    }
}
