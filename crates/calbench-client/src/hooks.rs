//! 测试序列观察者
//!
//! 在状态切换与阶段结果产生时回调，用于实时进度显示、日志或外部记录。
//! 回调在测试序列线程中同步执行，应尽快返回。
//!
//! # 使用示例
//!
//! ```rust
//! use calbench_client::hooks::{HookManager, SequencerObserver};
//! use calbench_client::{TestResult, TestStage};
//! use std::sync::Arc;
//!
//! struct PrintProgress;
//!
//! impl SequencerObserver for PrintProgress {
//!     fn on_result(&self, stage: &TestStage, result: &TestResult) {
//!         println!("{}: {}", stage.label, result.verdict);
//!     }
//! }
//!
//! let mut hooks = HookManager::new();
//! hooks.add_observer(Arc::new(PrintProgress));
//! assert_eq!(hooks.len(), 1);
//! ```

use crate::profile::TestStage;
use crate::result::TestResult;
use crate::sequencer::SequencerState;
use std::sync::Arc;

/// 测试序列观察者
///
/// 两个方法都有空的默认实现，只需实现关心的事件。
pub trait SequencerObserver: Send + Sync {
    /// 状态切换（`stage` 为当前阶段，配置 / 完成时为 `None`）
    fn on_state(&self, state: SequencerState, stage: Option<&TestStage>) {
        let _ = (state, stage);
    }

    /// 阶段结果产生
    fn on_result(&self, stage: &TestStage, result: &TestResult) {
        let _ = (stage, result);
    }
}

/// 观察者列表
#[derive(Default)]
pub struct HookManager {
    observers: Vec<Arc<dyn SequencerObserver>>,
}

impl HookManager {
    /// 创建新的观察者列表
    #[must_use]
    pub const fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// 添加观察者
    pub fn add_observer(&mut self, observer: Arc<dyn SequencerObserver>) {
        self.observers.push(observer);
    }

    /// 移除所有观察者
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// 通知状态切换
    pub fn notify_state(&self, state: SequencerState, stage: Option<&TestStage>) {
        for observer in &self.observers {
            observer.on_state(state, stage);
        }
    }

    /// 通知阶段结果
    pub fn notify_result(&self, stage: &TestStage, result: &TestResult) {
        for observer in &self.observers {
            observer.on_result(stage, result);
        }
    }
}
