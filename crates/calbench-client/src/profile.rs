//! 测试配置与限值表
//!
//! 每种测试类型对应一份 [`TestProfile`]：标题、规格说明、阶段与验收窗口、
//! 报告格式参数以及一次性测量配置。阶段与窗口存放在同一个序列中
//! （[`StagePoint`]），长度与顺序在结构上一致。
//!
//! 内置三种测试：
//!
//! | 测试 | 阶段数 | 量程 |
//! |------|--------|------|
//! | Zero Carryover | 10 | 0.2 V |
//! | Instrument Accuracy | 10 | 2 V |
//! | Calibration Factor | 16 | 2 V |
//!
//! 也可以从 TOML 文件加载自定义配置：
//!
//! ```toml
//! title = "Recorder Linearity"
//! filename_prefix = "linearity"
//! precision = 4
//!
//! [measurement]
//! range_volts = 2.0
//! sample_count = 50
//!
//! [[stages]]
//! label = "Full scale"
//! low = 0.99
//! high = 1.01
//! ```

use calbench_protocol::MeasurementSetup;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// 配置错误
#[derive(Error, Debug)]
pub enum ProfileError {
    /// 下限大于上限（或含 NaN）
    #[error("Inverted limit window: low {low} > high {high}")]
    InvertedWindow { low: f64, high: f64 },

    /// 配置中没有任何阶段
    #[error("Profile {title:?} defines no stages")]
    NoStages { title: String },

    /// 测量配置不可执行（采样数为 0、量程非正等）
    #[error("Invalid measurement setup: {0}")]
    InvalidMeasurement(String),

    /// 文件名前缀为空或包含路径成分
    #[error("Invalid filename prefix {0:?}")]
    InvalidPrefix(String),

    /// 未知测试类型
    #[error("Unknown test kind {0:?} (expected zero-carryover, accuracy, cal-factor)")]
    UnknownKind(String),

    /// TOML 解析错误
    #[error("Invalid profile file: {0}")]
    Toml(#[from] toml::de::Error),

    /// 文件读取错误
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// 测试类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestKind {
    /// 零点遗留（量程开关）
    ZeroCarryover,
    /// 仪表精度（量程开关）
    InstrumentAccuracy,
    /// 校准因子开关
    CalibrationFactor,
    /// 从文件加载的自定义配置
    Custom,
}

impl TestKind {
    /// 内置测试类型（选择菜单顺序）
    pub const BUILTIN: [TestKind; 3] = [
        TestKind::ZeroCarryover,
        TestKind::InstrumentAccuracy,
        TestKind::CalibrationFactor,
    ];
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestKind::ZeroCarryover => "zero-carryover",
            TestKind::InstrumentAccuracy => "accuracy",
            TestKind::CalibrationFactor => "cal-factor",
            TestKind::Custom => "custom",
        };
        f.write_str(name)
    }
}

impl FromStr for TestKind {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "zero-carryover" | "zero" => Ok(TestKind::ZeroCarryover),
            "accuracy" | "instrument-accuracy" => Ok(TestKind::InstrumentAccuracy),
            "cal-factor" | "calibration-factor" | "calfactor" => Ok(TestKind::CalibrationFactor),
            "custom" => Ok(TestKind::Custom),
            _ => Err(ProfileError::UnknownKind(s.to_string())),
        }
    }
}

/// 一个物理开关位置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestStage {
    pub label: String,
    pub index: usize,
}

/// 验收窗口（伏特，闭区间）
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LimitWindow {
    low: f64,
    high: f64,
}

impl LimitWindow {
    /// 创建验收窗口
    ///
    /// # 错误
    ///
    /// - `ProfileError::InvertedWindow`: `low > high` 或任一端为 NaN
    pub fn new(low: f64, high: f64) -> Result<Self, ProfileError> {
        if low.is_nan() || high.is_nan() || low > high {
            return Err(ProfileError::InvertedWindow { low, high });
        }
        Ok(Self { low, high })
    }

    /// 以标称值为中心、按相对容差构造窗口
    ///
    /// ```
    /// use calbench_client::LimitWindow;
    ///
    /// let w = LimitWindow::around(1.0, 0.01).unwrap();
    /// assert!((w.low() - 0.99).abs() < 1e-12);
    /// assert!((w.high() - 1.01).abs() < 1e-12);
    /// ```
    pub fn around(nominal: f64, tolerance: f64) -> Result<Self, ProfileError> {
        let delta = (nominal * tolerance).abs();
        Self::new(nominal - delta, nominal + delta)
    }

    /// 对称窗口 `±half_width`
    pub fn symmetric(half_width: f64) -> Result<Self, ProfileError> {
        Self::new(-half_width, half_width)
    }

    pub fn low(&self) -> f64 {
        self.low
    }

    pub fn high(&self) -> f64 {
        self.high
    }

    /// 闭区间判断
    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

/// 阶段与其验收窗口
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePoint {
    pub stage: TestStage,
    pub limit: LimitWindow,
}

/// 测试配置
#[derive(Debug, Clone, PartialEq)]
pub struct TestProfile {
    pub kind: TestKind,
    /// 报告标题
    pub title: String,
    /// 规格说明文字
    pub spec_text: String,
    /// 测试连接图标识（由渲染器解析）
    pub reference_image_id: Option<String>,
    /// 阶段与窗口（按执行顺序）
    pub points: Vec<StagePoint>,
    /// 输出文件名前缀
    pub filename_prefix: String,
    /// 报告首列列名
    pub column_header: String,
    /// 测量值显示精度（小数位）
    pub precision: usize,
    /// 限值显示精度（小数位）
    pub limit_precision: usize,
    /// 一次性测量配置
    pub measurement: MeasurementSetup,
}

/// 量程开关测试的十个位置
const RANGE_SWITCH_LABELS: [&str; 10] = [
    "Fully CCW",
    "1 Step CW",
    "2 Steps CW",
    "3 Steps CW",
    "4 Steps CW",
    "5 Steps CW",
    "6 Steps CW",
    "7 Steps CW",
    "8 Steps CW",
    "Fully CW",
];

/// Zero Carryover 各位置的对称窗口（伏特）
const ZERO_CARRYOVER_LIMITS: [f64; 10] = [
    0.015, 0.017, 0.014, 0.011, 0.008, 0.005, 0.005, 0.005, 0.005, 0.005,
];

/// Instrument Accuracy 各位置的窗口（伏特）
const ACCURACY_LIMITS: [(f64, f64); 10] = [
    (0.975, 1.025),
    (0.978, 1.022),
    (0.981, 1.019),
    (0.984, 1.016),
    (0.987, 1.013),
    (0.998, 1.002),
    (0.990, 1.010),
    (0.990, 1.010),
    (0.990, 1.015),
    (0.990, 1.015),
];

/// 校准因子开关范围（百分比，从高到低）
const CAL_FACTOR_PERCENT: std::ops::RangeInclusive<u32> = 85..=100;

/// 校准因子测试的相对容差
const CAL_FACTOR_TOLERANCE: f64 = 0.01;

fn build_points(
    entries: impl IntoIterator<Item = (String, LimitWindow)>,
) -> Vec<StagePoint> {
    entries
        .into_iter()
        .enumerate()
        .map(|(index, (label, limit))| StagePoint {
            stage: TestStage { label, index },
            limit,
        })
        .collect()
}

impl TestProfile {
    /// Zero Carryover 测试（0.2 V 量程，±mV 窗口）
    pub fn zero_carryover() -> Self {
        let entries = RANGE_SWITCH_LABELS.iter().zip(ZERO_CARRYOVER_LIMITS).map(|(label, half)| {
            (label.to_string(), LimitWindow { low: -half, high: half })
        });

        Self {
            kind: TestKind::ZeroCarryover,
            title: "Zero Carryover Test".to_string(),
            spec_text: "SPECIFICATION: ±0.5% of full scale when zeroed in the most sensitive range."
                .to_string(),
            reference_image_id: Some("TestSetup".to_string()),
            points: build_points(entries),
            filename_prefix: "zero-carryover".to_string(),
            column_header: "Range Switch Position".to_string(),
            precision: 3,
            limit_precision: 3,
            measurement: MeasurementSetup {
                range_volts: 0.2,
                ..MeasurementSetup::default()
            },
        }
    }

    /// Instrument Accuracy 测试（2 V 量程）
    pub fn instrument_accuracy() -> Self {
        let entries = RANGE_SWITCH_LABELS
            .iter()
            .zip(ACCURACY_LIMITS)
            .map(|(label, (low, high))| (label.to_string(), LimitWindow { low, high }));

        Self {
            kind: TestKind::InstrumentAccuracy,
            title: "Instrument Accuracy Test".to_string(),
            spec_text: "SPECIFICATION: ±1% of full scale on all ranges.".to_string(),
            reference_image_id: Some("AccuracyTestSetup".to_string()),
            points: build_points(entries),
            filename_prefix: "instrument-accuracy".to_string(),
            column_header: "Range Switch Position".to_string(),
            precision: 3,
            limit_precision: 4,
            measurement: MeasurementSetup {
                range_volts: 2.0,
                ..MeasurementSetup::default()
            },
        }
    }

    /// Calibration Factor 测试（16 档，100% → 85%）
    ///
    /// 满量程参考输入下，开关置于 `pct` 时的标称读数为 `100 / pct` 伏特，窗口为标称值 ±1%。
    pub fn calibration_factor() -> Self {
        let entries = CAL_FACTOR_PERCENT.rev().map(|pct| {
            let nominal = 100.0 / f64::from(pct);
            let delta = nominal * CAL_FACTOR_TOLERANCE;
            (
                pct.to_string(),
                LimitWindow {
                    low: nominal - delta,
                    high: nominal + delta,
                },
            )
        });

        Self {
            kind: TestKind::CalibrationFactor,
            title: "Calibration Factor Test".to_string(),
            spec_text: "SPECIFICATION: ±1% of reading at each calibration factor setting."
                .to_string(),
            reference_image_id: Some("CalFactorTestSetup".to_string()),
            points: build_points(entries),
            filename_prefix: "calibration-factor".to_string(),
            column_header: "Cal Factor (%)".to_string(),
            precision: 4,
            limit_precision: 4,
            measurement: MeasurementSetup {
                range_volts: 2.0,
                ..MeasurementSetup::default()
            },
        }
    }

    /// 内置配置（`Custom` 返回 `None`）
    pub fn builtin(kind: TestKind) -> Option<Self> {
        match kind {
            TestKind::ZeroCarryover => Some(Self::zero_carryover()),
            TestKind::InstrumentAccuracy => Some(Self::instrument_accuracy()),
            TestKind::CalibrationFactor => Some(Self::calibration_factor()),
            TestKind::Custom => None,
        }
    }

    /// 从 TOML 文本加载自定义配置
    ///
    /// 阶段序号按文件顺序分配；每个窗口都会校验。
    pub fn from_toml_str(text: &str) -> Result<Self, ProfileError> {
        let file: ProfileFile = toml::from_str(text)?;
        file.into_profile()
    }

    /// 从 TOML 文件加载自定义配置
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ProfileError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// 阶段 `stage_index` 的验收窗口
    ///
    /// # Panics
    ///
    /// 序号越界属于调用方错误（阶段只能来自本配置）。
    pub fn limit_for(&self, stage_index: usize) -> LimitWindow {
        match self.points.get(stage_index) {
            Some(point) => point.limit,
            None => panic!(
                "stage index {} out of range for profile {:?} ({} stages)",
                stage_index,
                self.title,
                self.points.len()
            ),
        }
    }

    /// 按顺序遍历阶段
    pub fn stages(&self) -> impl Iterator<Item = &TestStage> {
        self.points.iter().map(|p| &p.stage)
    }

    /// 阶段数
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// 检查配置能否执行
    ///
    /// # 错误
    ///
    /// - `ProfileError::NoStages`: 没有阶段
    /// - `ProfileError::InvalidMeasurement`: 采样数为 0，或量程不是正的有限值
    /// - `ProfileError::InvalidPrefix`: 文件名前缀为空，或包含 `/`、`\\`、`..`
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.is_empty() {
            return Err(ProfileError::NoStages {
                title: self.title.clone(),
            });
        }

        let setup = &self.measurement;
        if setup.sample_count == 0 {
            return Err(ProfileError::InvalidMeasurement("sample_count must be at least 1".to_string()));
        }
        if !setup.range_volts.is_finite() || setup.range_volts <= 0.0 {
            return Err(ProfileError::InvalidMeasurement(format!(
                "range_volts must be positive and finite, got {}",
                setup.range_volts
            )));
        }

        let prefix = &self.filename_prefix;
        if prefix.is_empty() || prefix.contains(['/', '\\']) || prefix.contains("..") {
            return Err(ProfileError::InvalidPrefix(prefix.clone()));
        }

        Ok(())
    }
}

/// 配置文件格式
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProfileFile {
    title: String,
    #[serde(default)]
    spec_text: String,
    #[serde(default)]
    reference_image_id: Option<String>,
    filename_prefix: String,
    #[serde(default = "default_column_header")]
    column_header: String,
    #[serde(default = "default_precision")]
    precision: usize,
    #[serde(default)]
    limit_precision: Option<usize>,
    #[serde(default)]
    measurement: MeasurementSetup,
    #[serde(default)]
    stages: Vec<StageEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StageEntry {
    label: String,
    low: f64,
    high: f64,
}

fn default_column_header() -> String {
    "Position".to_string()
}

fn default_precision() -> usize {
    3
}

impl ProfileFile {
    fn into_profile(self) -> Result<TestProfile, ProfileError> {
        if self.stages.is_empty() {
            return Err(ProfileError::NoStages { title: self.title });
        }

        let entries = self
            .stages
            .into_iter()
            .map(|s| LimitWindow::new(s.low, s.high).map(|w| (s.label, w)))
            .collect::<Result<Vec<_>, _>>()?;

        let profile = TestProfile {
            kind: TestKind::Custom,
            title: self.title,
            spec_text: self.spec_text,
            reference_image_id: self.reference_image_id,
            points: build_points(entries),
            filename_prefix: self.filename_prefix,
            column_header: self.column_header,
            precision: self.precision,
            limit_precision: self.limit_precision.unwrap_or(self.precision),
            measurement: self.measurement,
        };
        profile.validate()?;
        Ok(profile)
    }
}
