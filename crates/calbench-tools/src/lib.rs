//! # Calbench Tools - 纯算法
//!
//! **依赖原则**: 不依赖任何 I/O 层，所有函数均为纯函数
//!
//! ## 包含模块
//!
//! - `statistics` - 采集数据的统计归约（Welford 在线算法）
//! - `engineering` - 工程记数法格式化（报告与进度显示）

pub mod engineering;
pub mod statistics;

// 重新导出常用类型
pub use engineering::format_engineering;
pub use statistics::{StatisticalSummary, StatisticsError, WelfordAccumulator, reduce};
