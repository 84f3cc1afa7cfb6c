//! 阶段结果与判定

use crate::profile::{LimitWindow, TestProfile, TestStage};
use calbench_tools::StatisticalSummary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// 均值落在窗口内（含边界）为 `Pass`
    pub fn judge(mean: f64, limit: &LimitWindow) -> Self {
        if limit.contains(mean) { Verdict::Pass } else { Verdict::Fail }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// 单个阶段的测量结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    /// 所属阶段在配置中的序号
    pub stage_index: usize,
    pub summary: StatisticalSummary,
    pub limit: LimitWindow,
    pub verdict: Verdict,
}

impl TestResult {
    /// 由统计摘要与窗口生成结果
    pub fn evaluate(stage_index: usize, summary: StatisticalSummary, limit: LimitWindow) -> Self {
        Self {
            stage_index,
            verdict: Verdict::judge(summary.mean, &limit),
            summary,
            limit,
        }
    }

    /// 解析所属阶段
    ///
    /// # Panics
    ///
    /// 结果与配置不匹配（序号越界）时 panic。
    pub fn stage<'p>(&self, profile: &'p TestProfile) -> &'p TestStage {
        &profile.points[self.stage_index].stage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calbench_tools::reduce;

    #[test]
    fn test_verdict_bounds_inclusive() {
        let limit = LimitWindow::new(0.975, 1.025).unwrap();
        assert_eq!(Verdict::judge(1.000, &limit), Verdict::Pass);
        assert_eq!(Verdict::judge(1.030, &limit), Verdict::Fail);
        assert_eq!(Verdict::judge(0.975, &limit), Verdict::Pass);
        assert_eq!(Verdict::judge(1.025, &limit), Verdict::Pass);
    }

    #[test]
    fn test_evaluate_uses_mean() {
        let summary = reduce(&[0.001, 0.002, 0.0015, -0.001]).unwrap();
        let limit = LimitWindow::new(-0.015, 0.015).unwrap();
        let result = TestResult::evaluate(0, summary, limit);
        assert!(result.verdict.is_pass());
        assert_eq!(result.verdict.to_string(), "PASS");

        let profile = TestProfile::zero_carryover();
        assert_eq!(result.stage(&profile).label, "Fully CCW");
    }
}
