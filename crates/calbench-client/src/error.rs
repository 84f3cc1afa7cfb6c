//! 客户端层错误类型

use crate::profile::ProfileError;
use crate::sequencer::SequencerState;
use calbench_driver::DriverError;
use thiserror::Error;

/// 操作员交互错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperatorError {
    /// 操作员中止了本次运行
    #[error("Operator aborted the run")]
    Aborted,

    /// 交互失败（终端不可用等）
    #[error("Operator interaction failed: {0}")]
    Interaction(String),
}

/// 单个阶段失败的原因
#[derive(Error, Debug)]
pub enum StageFailure {
    /// 仪器/传输错误（包括完成信号超时）
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// 丢弃无效字段后没有剩余样本
    #[error("Burst contained no valid samples ({rejected} field(s) rejected)")]
    EmptyBurst { rejected: usize },

    /// 操作员交互失败或中止
    #[error(transparent)]
    Operator(#[from] OperatorError),
}

/// 测试序列错误
///
/// 所有变体都会终止本次运行，错误一直传递到 CLI。
#[derive(Error, Debug)]
pub enum SequencerError {
    /// 配置不可用（如没有阶段）
    #[error("Invalid profile: {0}")]
    Profile(#[from] ProfileError),

    /// 一次性配置失败
    #[error("Instrument configuration failed")]
    Configure { source: DriverError },

    /// 阶段失败（指明阶段与所处操作）
    ///
    /// `index` 从 0 开始，显示文本中的阶段号从 1 开始；失败原因见 `source()`。
    #[error("Stage {stage} ({label:?}) failed while {operation}", stage = .index + 1)]
    Stage {
        index: usize,
        label: String,
        operation: SequencerState,
        source: StageFailure,
    },
}

impl SequencerError {
    /// 失败阶段的序号（非阶段错误返回 `None`）
    pub fn stage_index(&self) -> Option<usize> {
        match self {
            SequencerError::Stage { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// 是否由操作员中止
    pub fn is_aborted(&self) -> bool {
        matches!(
            self,
            SequencerError::Stage {
                source: StageFailure::Operator(OperatorError::Aborted),
                ..
            }
        )
    }
}
