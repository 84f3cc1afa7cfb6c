//! 驱动层错误类型定义

use calbench_bus::BusError;
use calbench_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// 总线/传输错误（超时、断开、I/O）
    #[error(transparent)]
    Bus(#[from] BusError),

    /// 在会话超时内未收到完成信号
    #[error("Completion signal not received within {timeout:?}")]
    CompletionTimeout { timeout: Duration },

    /// 协议解析错误
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl DriverError {
    /// 是否为超时类错误（传输超时或完成信号超时）
    pub fn is_timeout(&self) -> bool {
        match self {
            DriverError::Bus(e) => e.is_timeout(),
            DriverError::CompletionTimeout { .. } => true,
            DriverError::Protocol(_) => false,
        }
    }
}
