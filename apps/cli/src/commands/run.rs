//! 测试执行命令
//!
//! 选择测试 → 打开仪器 → 逐阶段执行 → 渲染并保存报告。
//! 任何错误都会报告出错的阶段与操作；交互模式下随后询问是否再执行一次。

use super::config::CliConfig;
use super::profiles::ProfileCatalog;
use crate::progress::ProgressPrinter;
use crate::prompt::{InquirePrompt, ask_run_another};
use crate::render::{render_text, write_report};
use crate::simulate::nominal_source;
use anyhow::{Context, Result, bail};
use calbench_bus::BusAddress;
use calbench_client::{
    AutoConfirm, OperatorError, OperatorPrompt, RunInfo, RunReport, StageSequencer,
    TestKind, TestProfile,
};
use calbench_driver::InstrumentBuilder;
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// 执行验收测试
#[derive(Args, Debug)]
pub struct RunCommand {
    /// 测试类型（zero-carryover / accuracy / cal-factor）；省略时交互选择
    #[arg(short, long)]
    pub test: Option<TestKind>,

    /// 自定义测试配置文件（TOML）
    #[arg(short, long, conflicts_with = "test")]
    pub profile: Option<PathBuf>,

    /// 仪器地址（覆盖配置文件）
    #[arg(short, long)]
    pub address: Option<String>,

    /// LAN-GPIB 网关，用于 VISA 资源名
    #[arg(long)]
    pub gateway: Option<String>,

    /// 使用模拟万用表
    #[arg(long)]
    pub simulate: bool,

    /// 总线超时（毫秒）
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// 报告输出目录（默认当前目录）
    #[arg(short, long)]
    pub report_dir: Option<PathBuf>,

    /// 自动确认每个阶段（无人值守）
    #[arg(short, long)]
    pub yes: bool,
}

/// 单次运行的结果
enum Outcome {
    Completed(Box<RunReport>),
    Aborted,
}

impl RunCommand {
    pub fn execute(self) -> Result<()> {
        let config = CliConfig::load()?;
        let address = config.resolve_address(self.address.as_deref(), self.gateway.as_deref(), self.simulate)?;
        let timeout = config.timeout(self.timeout_ms);
        let report_dir = self
            .report_dir
            .clone()
            .or_else(|| config.report_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        let catalog = ProfileCatalog::load(&config);

        let mut auto = AutoConfirm::new();
        let mut terminal = InquirePrompt::new();
        let operator: &mut dyn OperatorPrompt = if self.yes { &mut auto } else { &mut terminal };

        // 命令行指定了测试时只运行一次
        let single_shot = self.yes || self.test.is_some() || self.profile.is_some();

        loop {
            let profile = match self.choose_profile(&catalog, operator) {
                Ok(profile) => profile,
                Err(e) if is_abort(&e) => {
                    println!("👋 Bye");
                    return Ok(());
                },
                Err(e) => return Err(e),
            };

            match run_once(&profile, &address, timeout, operator, &report_dir) {
                Ok(Outcome::Completed(report)) if single_shot && !report.passed() => {
                    bail!("{} failed ({} stage(s) out of window)", report.metadata.title, report.failures());
                },
                Ok(_) => {},
                Err(e) if single_shot => return Err(e),
                Err(e) => println!("❌ {:#}", e),
            }

            if single_shot {
                return Ok(());
            }

            match ask_run_another() {
                Ok(true) => continue,
                Ok(false) | Err(OperatorError::Aborted) => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn choose_profile(&self, catalog: &ProfileCatalog, operator: &mut dyn OperatorPrompt) -> Result<TestProfile> {
        if let Some(path) = &self.profile {
            return TestProfile::load_from_file(path)
                .with_context(|| format!("failed to load profile {}", path.display()));
        }

        if let Some(kind) = self.test {
            return catalog
                .find(kind)
                .cloned()
                .with_context(|| format!("no {kind} profile available; use --profile for custom tests"));
        }

        let index = operator.select("Select the test to run", &catalog.titles())?;
        catalog
            .profiles
            .get(index)
            .cloned()
            .with_context(|| format!("selection {index} out of range"))
    }
}

fn is_abort(e: &anyhow::Error) -> bool {
    matches!(e.downcast_ref::<OperatorError>(), Some(OperatorError::Aborted))
}

/// 执行一次测试：每次运行独占一个仪器会话
fn run_once(
    profile: &TestProfile,
    address: &BusAddress,
    timeout: Duration,
    operator: &mut dyn OperatorPrompt,
    report_dir: &Path,
) -> Result<Outcome> {
    let mut builder = InstrumentBuilder::new().address(address.clone()).timeout(timeout);
    if address.is_simulated() {
        builder = builder.reading_source(nominal_source(profile));
    }

    let mut instrument = builder
        .build()
        .with_context(|| format!("failed to open instrument at {address}"))?;
    let instrument_id = instrument.identify().context("instrument did not identify itself")?;
    println!("🔌 {}", instrument_id);

    let started_at_unix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    println!("📊 {} ({} stages)", profile.title, profile.len());
    let mut sequencer = StageSequencer::new(instrument);
    sequencer.add_observer(Arc::new(ProgressPrinter::new(profile.len(), profile.precision)));

    let results = match sequencer.run(profile, operator) {
        Ok(results) => results,
        Err(e) if e.is_aborted() => {
            warn!("{} aborted by operator", profile.title);
            println!("⚠️  Test aborted by operator; instrument returned to local control");
            return Ok(Outcome::Aborted);
        },
        Err(e) => return Err(e.into()),
    };

    let report = RunReport::build(
        profile,
        &results,
        RunInfo {
            instrument_id: Some(instrument_id),
            started_at_unix,
        },
    );
    let text = render_text(&report);
    println!("\n{}", text);

    let (json_path, text_path) = write_report(&report, &text, report_dir)?;
    info!("Report written to {} and {}", json_path.display(), text_path.display());
    println!("💾 {}", text_path.display());
    println!("💾 {}", json_path.display());

    Ok(Outcome::Completed(Box::new(report)))
}
