//! 运行进度输出

use calbench_client::{SequencerObserver, SequencerState, TestResult, TestStage};
use calbench_tools::format_engineering;

/// 在终端打印阶段进度与结果
pub struct ProgressPrinter {
    total: usize,
    precision: usize,
}

impl ProgressPrinter {
    pub fn new(total: usize, precision: usize) -> Self {
        Self { total, precision }
    }

    fn result_line(&self, stage: &TestStage, result: &TestResult) -> String {
        let icon = if result.verdict.is_pass() { "✅" } else { "❌" };
        format!(
            "  {} [{}/{}] {:<14} mean {:>12}  σ {:>12}  {}",
            icon,
            stage.index + 1,
            self.total,
            stage.label,
            format_engineering(result.summary.mean, self.precision, "V"),
            format_engineering(result.summary.std_dev, self.precision, "V"),
            result.verdict
        )
    }
}

impl SequencerObserver for ProgressPrinter {
    fn on_state(&self, state: SequencerState, stage: Option<&TestStage>) {
        match (state, stage) {
            (SequencerState::Configuring, _) => println!("⚙️  Configuring instrument..."),
            (SequencerState::AwaitingOperator, Some(stage)) => {
                println!("📍 Stage {}/{}: {}", stage.index + 1, self.total, stage.label)
            },
            (SequencerState::AwaitingCompletion, Some(_)) => println!("  ⏳ Measuring..."),
            _ => {},
        }
    }

    fn on_result(&self, stage: &TestStage, result: &TestResult) {
        println!("{}", self.result_line(stage, result));
    }
}
