//! # Calbench Protocol
//!
//! 数字万用表（DMM）SCPI 指令集定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: SCPI 指令及一次性配置 / 每阶段触发的指令序列
//! - `parse`: 逗号分隔数值响应的解析
//! - `status`: IEEE 488.2 状态字节解码
//!
//! ## 指令分类
//!
//! 对上层而言，指令本身是不透明的字符串，上层只需要知道某条指令属于
//! “配置”“触发”还是“取数”阶段（见 [`CommandClass`]）。

pub mod command;
pub mod parse;
pub mod status;

// 重新导出常用类型
pub use command::*;
pub use parse::*;
pub use status::*;

use thiserror::Error;

/// 仪器显示屏文本字段的最大宽度（字符）
pub const DISPLAY_TEXT_WIDTH: usize = 12;

/// 协议层错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// 寄存器查询响应不是整数
    #[error("Invalid register value: {raw:?}")]
    InvalidRegister { raw: String },
}
