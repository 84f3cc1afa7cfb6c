//! 报告渲染与落盘
//!
//! 文本报告：标题、规格说明、双栏摘要表、统计明细。
//! 同时写出 JSON（完整的结构化报告）。

use anyhow::{Context, Result};
use calbench_client::{ReportRow, RunReport};
use calbench_tools::format_engineering;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

const LABEL_WIDTH: usize = 22;
const VALUE_WIDTH: usize = 10;

fn half_header(column_header: &str) -> String {
    format!(
        "{:<lw$} {:>vw$} {:>vw$} {:>vw$} {:<6}",
        column_header,
        "Low",
        "Actual",
        "High",
        "Result",
        lw = LABEL_WIDTH,
        vw = VALUE_WIDTH
    )
}

fn half_row(row: &ReportRow, precision: usize, limit_precision: usize) -> String {
    format!(
        "{:<lw$} {:>vw$.lp$} {:>vw$.p$} {:>vw$.lp$} {:<6}",
        row.label,
        row.limit_low,
        row.actual_mean,
        row.limit_high,
        row.verdict.to_string(),
        lw = LABEL_WIDTH,
        vw = VALUE_WIDTH,
        p = precision,
        lp = limit_precision
    )
}

/// 渲染文本报告
pub fn render_text(report: &RunReport) -> String {
    let meta = &report.metadata;
    let mut out = String::new();

    let _ = writeln!(out, "{}", meta.title);
    if !meta.spec_text.is_empty() {
        let _ = writeln!(out, "{}", meta.spec_text);
    }
    if let Some(id) = &meta.instrument_id {
        let _ = writeln!(out, "Instrument: {}", id);
    }
    if let Some(image) = &meta.reference_image_id {
        let _ = writeln!(out, "Test setup: {}", image);
    }
    let _ = writeln!(out, "Started: {} (unix)", meta.started_at_unix);
    out.push('\n');

    let header = half_header(&meta.column_header);
    let _ = writeln!(out, "{} | {}", header, header);
    let _ = writeln!(out, "{}", "-".repeat(header.len() * 2 + 3));
    for pair in report.paired_rows() {
        let left = half_row(&pair.left, meta.precision, meta.limit_precision);
        match &pair.right {
            Some(right) => {
                let right = half_row(right, meta.precision, meta.limit_precision);
                let _ = writeln!(out, "{} | {}", left, right);
            },
            None => {
                let _ = writeln!(out, "{}", left.trim_end());
            },
        }
    }
    out.push('\n');

    let _ = writeln!(
        out,
        "{:<lw$} {:>5} {:>14} {:>14} {:>14} {:>14}",
        "Details",
        "n",
        "Min",
        "Max",
        "Mean",
        "Std Dev",
        lw = LABEL_WIDTH
    );
    for detail in &report.details {
        let s = &detail.summary;
        let _ = writeln!(
            out,
            "{:<lw$} {:>5} {:>14} {:>14} {:>14} {:>14}",
            detail.label,
            s.count,
            format_engineering(s.min, meta.precision, "V"),
            format_engineering(s.max, meta.precision, "V"),
            format_engineering(s.mean, meta.precision, "V"),
            format_engineering(s.std_dev, meta.precision, "V"),
            lw = LABEL_WIDTH
        );
    }
    out.push('\n');

    let total = report.rows.len();
    let overall = if report.passed() { "PASS" } else { "FAIL" };
    let _ = writeln!(
        out,
        "Overall: {} ({}/{} stages passed)",
        overall,
        total - report.failures(),
        total
    );

    out
}

/// 写出 `{stem}.json` 与 `{stem}.txt`，返回两个路径
pub fn write_report(report: &RunReport, text: &str, dir: &Path) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create report directory {}", dir.display()))?;

    let stem = report.file_stem();
    let json_path = dir.join(format!("{stem}.json"));
    let text_path = dir.join(format!("{stem}.txt"));

    let json = serde_json::to_string_pretty(report).context("failed to serialize report")?;
    fs::write(&json_path, json).with_context(|| format!("failed to write {}", json_path.display()))?;
    fs::write(&text_path, text).with_context(|| format!("failed to write {}", text_path.display()))?;

    Ok((json_path, text_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use calbench_client::{RunInfo, TestProfile, TestResult};
    use calbench_tools::reduce;

    fn report_for(profile: &TestProfile, mean_for: impl Fn(usize) -> f64) -> RunReport {
        let results: Vec<TestResult> = (0..profile.len())
            .map(|i| TestResult::evaluate(i, reduce(&[mean_for(i)]).unwrap(), profile.limit_for(i)))
            .collect();
        RunReport::build(
            profile,
            &results,
            RunInfo {
                instrument_id: Some("KEITHLEY INSTRUMENTS INC.,MODEL 2000".to_string()),
                started_at_unix: 1_700_000_000,
            },
        )
    }

    #[test]
    fn test_render_zero_carryover() {
        let profile = TestProfile::zero_carryover();
        let report = report_for(&profile, |i| if i == 9 { 0.02 } else { 0.000875 });
        let text = render_text(&report);

        assert!(text.starts_with("Zero Carryover Test\n"));
        assert!(text.contains("Instrument: KEITHLEY INSTRUMENTS INC.,MODEL 2000"));
        assert!(text.contains("Test setup: TestSetup"));
        assert!(text.contains("Range Switch Position"));
        assert!(text.contains("875.000 µV"));
        assert!(text.contains("Overall: FAIL (9/10 stages passed)"));

        // 第一行：阶段 0 与阶段 5 并排
        let first_row = text
            .lines()
            .find(|l| l.starts_with("Fully CCW"))
            .unwrap();
        let (left, right) = first_row.split_once(" | ").unwrap();
        assert!(left.contains("-0.015"));
        assert!(left.contains("0.001"));
        assert!(left.contains("PASS"));
        assert!(right.starts_with("5 Steps CW"));
    }

    #[test]
    fn test_render_limit_precision() {
        let profile = TestProfile::instrument_accuracy();
        let report = report_for(&profile, |_| 1.0);
        let text = render_text(&report);
        let row = text.lines().find(|l| l.starts_with("Fully CCW")).unwrap();
        assert!(row.contains("0.9750"));
        assert!(row.contains("1.000"));
        assert!(row.contains("1.0250"));
        assert!(text.contains("Overall: PASS (10/10 stages passed)"));
    }

    #[test]
    fn test_write_report_files() {
        let dir = tempfile::tempdir().unwrap();
        let profile = TestProfile::calibration_factor();
        let report = report_for(&profile, |i| {
            let limit = profile.limit_for(i);
            (limit.low() + limit.high()) / 2.0
        });
        let text = render_text(&report);

        let out = dir.path().join("reports");
        let (json_path, text_path) = write_report(&report, &text, &out).unwrap();

        assert_eq!(json_path, out.join("calibration-factor-1700000000.json"));
        assert_eq!(fs::read_to_string(&text_path).unwrap(), text);

        let back: RunReport = serde_json::from_str(&fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(back.metadata, report.metadata);
        assert_eq!(back.rows.len(), 16);
        assert!(back.passed());
    }
}
