//! 模拟运行的读数来源
//!
//! 模拟万用表根据前面板显示的阶段标签生成读数：取该阶段验收窗口的中点，
//! 叠加 ±10% 半宽的交替纹波，使标准差不为零而均值仍在窗口内。

use calbench_client::TestProfile;
use calbench_protocol::Command;
use std::collections::HashMap;
use tracing::warn;

/// 纹波幅度（相对窗口半宽）
const RIPPLE: f64 = 0.1;

/// 为 `profile` 构造标称读数来源
pub fn nominal_source(profile: &TestProfile) -> impl FnMut(Option<&str>, u32) -> String + Send + 'static {
    // 显示文本会被截断，按截断后的文本建表
    let nominals: HashMap<String, (f64, f64)> = profile
        .points
        .iter()
        .map(|p| {
            let mid = (p.limit.low() + p.limit.high()) / 2.0;
            let half = (p.limit.high() - p.limit.low()) / 2.0;
            (displayed(&p.stage.label), (mid, half * RIPPLE))
        })
        .collect();

    move |display_text: Option<&str>, count: u32| {
        let Some((mid, ripple)) = display_text.and_then(|text| nominals.get(text)).copied() else {
            warn!("Simulated DMM has no nominal reading for display {:?}", display_text);
            return String::new();
        };

        (0..count)
            .map(|i| {
                let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
                format!("{:+.9E}", mid + sign * ripple)
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}

fn displayed(label: &str) -> String {
    match Command::display_text(label) {
        Command::DisplayText(text) => text,
        _ => label.to_string(),
    }
}
