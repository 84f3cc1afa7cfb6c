//! 阶段测试序列（状态机）
//!
//! ```text
//! Idle → Configuring → ( AwaitingOperator → Arming → AwaitingCompletion
//!                        → Fetching → Reducing )* → Complete
//! ```
//!
//! - 一次性配置只在每次运行开始时执行一次
//! - 阶段按配置顺序执行，不重排、不跳过、不自动重试
//! - 只在 `AwaitingOperator`（等待操作员）和 `AwaitingCompletion`（等待 SRQ）挂起
//! - 配置开始后的任何错误都会先尽力释放仪器，再返回原始错误

use crate::error::{SequencerError, StageFailure};
use crate::hooks::{HookManager, SequencerObserver};
use crate::operator::OperatorPrompt;
use crate::profile::{StagePoint, TestProfile, TestStage};
use crate::result::TestResult;
use calbench_bus::InstrumentBus;
use calbench_driver::Instrument;
use calbench_tools::reduce;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 测试序列状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequencerState {
    Idle,
    /// 一次性配置 + `*OPC?` 同步
    Configuring,
    /// 显示阶段标签，等待操作员确认
    AwaitingOperator,
    /// 清缓冲区、启动触发系统、总线触发
    Arming,
    /// 等待完成信号
    AwaitingCompletion,
    /// 读取采集数据
    Fetching,
    /// 统计归约与判定
    Reducing,
    /// 全部阶段完成，仪器已释放
    Complete,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SequencerState::Idle => "idle",
            SequencerState::Configuring => "configuring",
            SequencerState::AwaitingOperator => "awaiting operator",
            SequencerState::Arming => "arming",
            SequencerState::AwaitingCompletion => "awaiting completion",
            SequencerState::Fetching => "fetching",
            SequencerState::Reducing => "reducing",
            SequencerState::Complete => "complete",
        };
        f.write_str(text)
    }
}

/// 阶段测试序列
///
/// 独占仪器会话；每次 [`run`](StageSequencer::run) 执行一种测试的全部阶段。
pub struct StageSequencer<B: InstrumentBus> {
    instrument: Instrument<B>,
    state: SequencerState,
    hooks: HookManager,
}

impl<B: InstrumentBus> StageSequencer<B> {
    /// 接管仪器会话
    pub fn new(instrument: Instrument<B>) -> Self {
        Self {
            instrument,
            state: SequencerState::Idle,
            hooks: HookManager::new(),
        }
    }

    /// 添加观察者
    pub fn add_observer(&mut self, observer: Arc<dyn SequencerObserver>) {
        self.hooks.add_observer(observer);
    }

    /// 当前状态（失败后停留在出错时的状态）
    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn instrument(&self) -> &Instrument<B> {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut Instrument<B> {
        &mut self.instrument
    }

    /// 归还仪器会话
    pub fn into_instrument(self) -> Instrument<B> {
        self.instrument
    }

    /// 执行一种测试的全部阶段
    ///
    /// 成功时返回按阶段顺序排列的结果。无论成败都会尝试释放仪器；
    /// 释放失败只记录 `error!`，不会丢弃已经得到的结果。
    ///
    /// # 错误
    ///
    /// - `SequencerError::Profile`: 配置无效（没有阶段、窗口倒置等）
    /// - `SequencerError::Configure`: 一次性配置失败
    /// - `SequencerError::Stage`: 某阶段失败（包含阶段与所处操作）
    pub fn run(
        &mut self,
        profile: &TestProfile,
        operator: &mut dyn OperatorPrompt,
    ) -> Result<Vec<TestResult>, SequencerError> {
        profile.validate()?;

        info!("Starting {:?} ({} stages)", profile.title, profile.len());
        self.transition(SequencerState::Configuring, None);

        match self.run_stages(profile, operator) {
            Ok(results) => {
                self.transition(SequencerState::Complete, None);
                if let Err(e) = self.instrument.release() {
                    error!("Failed to release instrument after {}: {}", profile.title, e);
                }
                let passed = results.iter().filter(|r| r.verdict.is_pass()).count();
                info!("{} complete: {}/{} stages passed", profile.title, passed, results.len());
                Ok(results)
            },
            Err(e) => {
                warn!("{} aborted: {:?}", profile.title, e);
                if let Err(release_err) = self.instrument.release() {
                    error!("Failed to release instrument after error: {}", release_err);
                }
                Err(e)
            },
        }
    }

    fn run_stages(
        &mut self,
        profile: &TestProfile,
        operator: &mut dyn OperatorPrompt,
    ) -> Result<Vec<TestResult>, SequencerError> {
        self.instrument
            .configure(&profile.measurement)
            .map_err(|source| SequencerError::Configure { source })?;

        let mut results = Vec::with_capacity(profile.len());
        for point in &profile.points {
            let result = self.run_stage(profile, point, operator).map_err(|source| {
                SequencerError::Stage {
                    index: point.stage.index,
                    label: point.stage.label.clone(),
                    operation: self.state,
                    source,
                }
            })?;
            results.push(result);
        }

        Ok(results)
    }

    fn run_stage(
        &mut self,
        profile: &TestProfile,
        point: &StagePoint,
        operator: &mut dyn OperatorPrompt,
    ) -> Result<TestResult, StageFailure> {
        let stage = &point.stage;

        self.transition(SequencerState::AwaitingOperator, Some(stage));
        self.instrument.show_text(&stage.label)?;
        operator.pause_for_confirmation(&stage.label)?;
        self.instrument.clear_text()?;

        self.transition(SequencerState::Arming, Some(stage));
        self.instrument.arm()?;

        self.transition(SequencerState::AwaitingCompletion, Some(stage));
        self.instrument.await_completion()?;

        self.transition(SequencerState::Fetching, Some(stage));
        let burst = self.instrument.fetch_burst()?;

        self.transition(SequencerState::Reducing, Some(stage));
        let summary = reduce(&burst.samples).map_err(|_| StageFailure::EmptyBurst {
            rejected: burst.rejected.len(),
        })?;
        let result = TestResult::evaluate(stage.index, summary, profile.limit_for(stage.index));

        info!(
            "Stage {} ({}): mean {:.6} V over {} samples, window [{}, {}] {}",
            stage.index,
            stage.label,
            summary.mean,
            summary.count,
            result.limit.low(),
            result.limit.high(),
            result.verdict
        );
        self.hooks.notify_result(stage, &result);

        Ok(result)
    }

    fn transition(&mut self, next: SequencerState, stage: Option<&TestStage>) {
        debug!("Sequencer: {} -> {}", self.state, next);
        self.state = next;
        self.hooks.notify_state(next, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(SequencerState::AwaitingCompletion.to_string(), "awaiting completion");
        assert_eq!(SequencerState::Idle.to_string(), "idle");
    }
}
