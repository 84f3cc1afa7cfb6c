//! # 统计工具
//!
//! 将一次采集的读数归约为 [`StatisticalSummary`]。
//!
//! 标准差使用 Welford 在线递推（样本标准差，Bessel 校正）：
//!
//! ```text
//! n    += 1
//! delta = x - mean
//! mean += delta / n
//! m2   += delta * (x - mean)
//! std   = sqrt(m2 / (n - 1))   (n > 1，否则为 0)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 统计错误
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticsError {
    /// 空采集：极值无定义
    #[error("Burst contains no valid samples")]
    EmptyBurst,
}

/// Welford 在线累加器
///
/// # 示例
///
/// ```
/// use calbench_tools::WelfordAccumulator;
///
/// let mut acc = WelfordAccumulator::new();
/// for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
///     acc.push(x);
/// }
/// assert_eq!(acc.count(), 8);
/// assert!((acc.mean() - 5.0).abs() < 1e-12);
/// assert!((acc.sample_std_dev() - 2.138089935).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WelfordAccumulator {
    n: usize,
    mean: f64,
    m2: f64,
}

impl WelfordAccumulator {
    /// 创建空累加器
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入一个样本
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// 样本数
    pub fn count(&self) -> usize {
        self.n
    }

    /// 当前均值（空时为 0）
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// 样本标准差，少于 2 个样本时为 0
    pub fn sample_std_dev(&self) -> f64 {
        if self.n > 1 {
            (self.m2 / (self.n - 1) as f64).sqrt()
        } else {
            0.0
        }
    }
}

impl Extend<f64> for WelfordAccumulator {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        for x in iter {
            self.push(x);
        }
    }
}

/// 一次采集的统计摘要
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    /// 有效样本数
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// 算术平均值
    pub mean: f64,
    /// 样本标准差（Bessel 校正），`count < 2` 时为 0
    pub std_dev: f64,
}

/// 将采集数据归约为统计摘要
///
/// # 错误
///
/// - `StatisticsError::EmptyBurst`: 输入为空
///
/// # 示例
///
/// ```
/// use calbench_tools::reduce;
///
/// let summary = reduce(&[0.001, 0.002, 0.0015, -0.001]).unwrap();
/// assert_eq!(summary.count, 4);
/// assert_eq!(summary.min, -0.001);
/// assert_eq!(summary.max, 0.002);
/// assert!((summary.mean - 0.000875).abs() < 1e-12);
/// ```
pub fn reduce(samples: &[f64]) -> Result<StatisticalSummary, StatisticsError> {
    let (&first, rest) = samples.split_first().ok_or(StatisticsError::EmptyBurst)?;

    let mut acc = WelfordAccumulator::new();
    acc.push(first);
    let (mut min, mut max) = (first, first);

    for &x in rest {
        acc.push(x);
        min = min.min(x);
        max = max.max(x);
    }

    Ok(StatisticalSummary {
        count: acc.count(),
        min,
        max,
        mean: acc.mean(),
        std_dev: acc.sample_std_dev(),
    })
}
