//! 操作员交互接口
//!
//! 测试序列只依赖 [`OperatorPrompt`]：终端、GUI 或脚本化实现均可。

use crate::error::OperatorError;
use tracing::info;

/// 操作员交互
pub trait OperatorPrompt {
    /// 从列表中选择一项，返回序号
    fn select(&mut self, title: &str, choices: &[String]) -> Result<usize, OperatorError>;

    /// 提示操作员把开关拨到 `label` 位置，确认后返回
    ///
    /// 阻塞直到操作员确认；返回 `OperatorError::Aborted` 会终止本次运行。
    fn pause_for_confirmation(&mut self, label: &str) -> Result<(), OperatorError>;
}

impl<P: OperatorPrompt + ?Sized> OperatorPrompt for &mut P {
    fn select(&mut self, title: &str, choices: &[String]) -> Result<usize, OperatorError> {
        (**self).select(title, choices)
    }

    fn pause_for_confirmation(&mut self, label: &str) -> Result<(), OperatorError> {
        (**self).pause_for_confirmation(label)
    }
}

/// 无人值守：固定选择，自动确认每个阶段
///
/// 用于模拟演示与自动化测试。
#[derive(Debug, Clone, Default)]
pub struct AutoConfirm {
    selection: usize,
    confirmed: Vec<String>,
}

impl AutoConfirm {
    pub fn new() -> Self {
        Self::default()
    }

    /// `select` 固定返回 `selection`
    pub fn with_selection(selection: usize) -> Self {
        Self {
            selection,
            confirmed: Vec::new(),
        }
    }

    /// 已确认的阶段标签（按顺序）
    pub fn confirmed(&self) -> &[String] {
        &self.confirmed
    }
}

impl OperatorPrompt for AutoConfirm {
    fn select(&mut self, title: &str, choices: &[String]) -> Result<usize, OperatorError> {
        match choices.get(self.selection) {
            Some(choice) => {
                info!("{} -> {}", title, choice);
                Ok(self.selection)
            },
            None => Err(OperatorError::Interaction(format!(
                "selection {} out of range ({} choices)",
                self.selection,
                choices.len()
            ))),
        }
    }

    fn pause_for_confirmation(&mut self, label: &str) -> Result<(), OperatorError> {
        info!("Auto-confirming stage {:?}", label);
        self.confirmed.push(label.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_confirm_records_labels() {
        let mut op = AutoConfirm::new();
        op.pause_for_confirmation("Fully CCW").unwrap();
        op.pause_for_confirmation("1 Step CW").unwrap();
        assert_eq!(op.confirmed(), ["Fully CCW", "1 Step CW"]);
    }

    #[test]
    fn test_auto_confirm_selection_bounds() {
        let choices = vec!["a".to_string(), "b".to_string()];
        assert_eq!(AutoConfirm::with_selection(1).select("Pick", &choices), Ok(1));
        assert!(matches!(
            AutoConfirm::with_selection(2).select("Pick", &choices),
            Err(OperatorError::Interaction(_))
        ));
    }
}
