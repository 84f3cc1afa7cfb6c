//! 报告模型
//!
//! 测试序列完成后，结果列表整体交给 [`RunReport::build`]，生成与渲染方式无关的
//! 结构化报告（可序列化为 JSON）。文本 / PDF 等排版由渲染器负责。
//!
//! # 双栏排版
//!
//! 摘要表按两栏排列：阶段 `i` 与阶段 `i + ceil(n/2)` 位于同一行。
//! 16 个阶段时 0↔8 … 7↔15；阶段数为奇数时最后一行右栏为空。

use crate::profile::{TestKind, TestProfile};
use crate::result::{TestResult, Verdict};
use calbench_tools::StatisticalSummary;
use serde::{Deserialize, Serialize};

/// 单次运行信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    /// 仪器标识（`*IDN?` 响应）
    pub instrument_id: Option<String>,
    /// 开始时间（Unix 秒）
    pub started_at_unix: u64,
}

/// 报告元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub test_kind: TestKind,
    pub title: String,
    pub spec_text: String,
    pub reference_image_id: Option<String>,
    pub column_header: String,
    pub precision: usize,
    pub limit_precision: usize,
    pub filename_prefix: String,
    pub instrument_id: Option<String>,
    pub started_at_unix: u64,
}

/// 摘要表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub label: String,
    pub limit_low: f64,
    pub actual_mean: f64,
    pub limit_high: f64,
    pub verdict: Verdict,
}

/// 明细表的一行（完整统计量）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRow {
    pub label: String,
    pub summary: StatisticalSummary,
}

/// 双栏摘要表的一行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedRow {
    pub left: ReportRow,
    pub right: Option<ReportRow>,
}

/// 一次运行的完整报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    /// 按阶段顺序
    pub rows: Vec<ReportRow>,
    pub details: Vec<DetailRow>,
}

impl RunReport {
    /// 构建报告
    ///
    /// # Panics
    ///
    /// 结果的阶段序号不属于 `profile` 时 panic。
    pub fn build(profile: &TestProfile, results: &[TestResult], run: RunInfo) -> Self {
        let metadata = RunMetadata {
            test_kind: profile.kind,
            title: profile.title.clone(),
            spec_text: profile.spec_text.clone(),
            reference_image_id: profile.reference_image_id.clone(),
            column_header: profile.column_header.clone(),
            precision: profile.precision,
            limit_precision: profile.limit_precision,
            filename_prefix: profile.filename_prefix.clone(),
            instrument_id: run.instrument_id,
            started_at_unix: run.started_at_unix,
        };

        let rows = results
            .iter()
            .map(|r| ReportRow {
                label: r.stage(profile).label.clone(),
                limit_low: r.limit.low(),
                actual_mean: r.summary.mean,
                limit_high: r.limit.high(),
                verdict: r.verdict,
            })
            .collect();

        let details = results
            .iter()
            .map(|r| DetailRow {
                label: r.stage(profile).label.clone(),
                summary: r.summary,
            })
            .collect();

        Self {
            metadata,
            rows,
            details,
        }
    }

    /// 双栏排列：阶段 `i` 与 `i + ceil(n/2)` 同行
    pub fn paired_rows(&self) -> Vec<PairedRow> {
        let half = self.rows.len().div_ceil(2);
        (0..half)
            .map(|i| PairedRow {
                left: self.rows[i].clone(),
                right: self.rows.get(i + half).cloned(),
            })
            .collect()
    }

    /// 所有阶段均通过
    pub fn passed(&self) -> bool {
        self.rows.iter().all(|r| r.verdict.is_pass())
    }

    /// 未通过的阶段数
    pub fn failures(&self) -> usize {
        self.rows.iter().filter(|r| !r.verdict.is_pass()).count()
    }

    /// 输出文件名（不含扩展名）：`{prefix}-{unix秒}`
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.metadata.filename_prefix, self.metadata.started_at_unix)
    }
}
