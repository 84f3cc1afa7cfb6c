//! # Calbench Driver
//!
//! 仪器驱动层：
//! - 指令协议层（[`Instrument`]）：独占总线会话，发送指令、读取响应、解析数值列表
//! - 完成信号（[`CompletionSignal`]）：SRQ 通知与测试序列线程之间唯一的异步边界
//! - Builder（[`InstrumentBuilder`]）：按地址选择后端并打开会话
//!
//! # 线程模型
//!
//! `Instrument` 只在测试序列线程中使用。SRQ 回调在传输层自己的线程中运行，
//! 只做两件事：丢弃挂起事件、投递完成许可。

mod builder;
mod error;
pub mod instrument;
pub mod signal;

pub use builder::{DEFAULT_TIMEOUT, DynInstrument, InstrumentBuilder};
pub use error::DriverError;
pub use instrument::Instrument;
pub use signal::{CompletionSignal, completion_handler};
