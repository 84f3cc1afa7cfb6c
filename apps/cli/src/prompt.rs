//! 终端操作员交互（inquire）

use calbench_client::{OperatorError, OperatorPrompt};
use inquire::{Confirm, InquireError, Select};

/// 基于 inquire 的交互式提示
///
/// Esc / Ctrl+C 视为操作员中止。
#[derive(Debug, Default)]
pub struct InquirePrompt;

impl InquirePrompt {
    pub fn new() -> Self {
        Self
    }
}

fn map_inquire(e: InquireError) -> OperatorError {
    match e {
        InquireError::OperationCanceled | InquireError::OperationInterrupted => OperatorError::Aborted,
        other => OperatorError::Interaction(other.to_string()),
    }
}

impl OperatorPrompt for InquirePrompt {
    fn select(&mut self, title: &str, choices: &[String]) -> Result<usize, OperatorError> {
        let choice = Select::new(title, choices.to_vec())
            .with_page_size(10)
            .raw_prompt()
            .map_err(map_inquire)?;
        Ok(choice.index)
    }

    fn pause_for_confirmation(&mut self, label: &str) -> Result<(), OperatorError> {
        let message = format!("Set the switch to \"{label}\" and continue?");
        let proceed = Confirm::new(&message)
            .with_default(true)
            .with_help_message("The instrument display shows the expected position")
            .prompt()
            .map_err(map_inquire)?;

        if proceed { Ok(()) } else { Err(OperatorError::Aborted) }
    }
}

/// 是否再执行一次测试
pub fn ask_run_another() -> Result<bool, OperatorError> {
    Confirm::new("Run another test?")
        .with_default(false)
        .prompt()
        .map_err(map_inquire)
}
