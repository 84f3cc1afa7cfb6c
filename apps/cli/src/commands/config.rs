//! 配置管理命令
//!
//! 用于管理 CLI 配置（仪器地址、网关、超时、报告目录、自定义测试配置）

use anyhow::{Context, Result, bail};
use calbench_bus::BusAddress;
use calbench_client::TestProfile;
use calbench_driver::DEFAULT_TIMEOUT;
use clap::Subcommand;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 配置文件路径
fn config_dir() -> Result<PathBuf> {
    let mut path = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("cannot determine config directory"))?;

    path.push("calbench");
    Ok(path)
}

pub fn config_file() -> Result<PathBuf> {
    let mut path = config_dir()?;
    path.push("config.toml");
    Ok(path)
}

/// CLI 配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// 默认仪器地址（`prologix://host/gpib`、`GPIB0::16::INSTR` 或 `sim`）
    pub address: Option<String>,

    /// VISA 资源名使用的 LAN-GPIB 网关（`host[:port]`）
    pub gateway: Option<String>,

    /// 总线超时（毫秒）
    pub timeout_ms: Option<u64>,

    /// 报告输出目录
    pub report_dir: Option<PathBuf>,

    /// 额外加载的测试配置文件
    pub profiles: Vec<PathBuf>,
}

impl CliConfig {
    /// 加载默认位置的配置
    pub fn load() -> Result<Self> {
        Self::load_from(&config_file()?)
    }

    /// 从指定文件加载；文件不存在时返回默认配置
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("invalid config file {}", path.display()))
    }

    /// 保存到指定文件
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, format!("# Calbench CLI Configuration\n\n{content}"))
            .with_context(|| format!("failed to write config file {}", path.display()))?;

        Ok(())
    }

    /// 解析仪器地址
    ///
    /// 命令行参数优先于配置文件；`simulate` 总是选择模拟万用表。
    /// VISA 资源名（`GPIB0::16::INSTR`）需要网关。
    pub fn resolve_address(
        &self,
        address: Option<&str>,
        gateway: Option<&str>,
        simulate: bool,
    ) -> Result<BusAddress> {
        if simulate {
            return Ok(BusAddress::Simulated);
        }

        let Some(raw) = address.or(self.address.as_deref()) else {
            bail!("no instrument address; pass --address or run `calbench config set --address ...`");
        };

        let gateway = gateway.or(self.gateway.as_deref());
        let parsed = match gateway {
            Some(gateway) if raw.trim().to_ascii_uppercase().starts_with("GPIB") => {
                BusAddress::from_visa_resource(raw, gateway)
            },
            _ => raw.parse(),
        };

        parsed.with_context(|| format!("invalid instrument address {raw:?}"))
    }

    /// 总线超时
    pub fn timeout(&self, override_ms: Option<u64>) -> Duration {
        override_ms
            .or(self.timeout_ms)
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// 配置命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 设置配置项
    Set {
        /// 仪器地址（如 prologix://192.168.1.50/16、GPIB0::16::INSTR、sim）
        #[arg(short, long)]
        address: Option<String>,

        /// LAN-GPIB 网关（host[:port]）
        #[arg(short, long)]
        gateway: Option<String>,

        /// 总线超时（毫秒）
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// 报告输出目录
        #[arg(short, long)]
        report_dir: Option<PathBuf>,

        /// 添加自定义测试配置文件（可重复）
        #[arg(long = "add-profile")]
        add_profiles: Vec<PathBuf>,
    },

    /// 获取配置项
    Get {
        /// 配置项名称
        #[arg(default_value = "all")]
        key: String,
    },

    /// 检查配置
    Check,
}

impl ConfigCommand {
    pub fn execute(self) -> Result<()> {
        let path = config_file()?;
        self.execute_at(&path)
    }

    fn execute_at(self, path: &Path) -> Result<()> {
        match self {
            ConfigCommand::Set {
                address,
                gateway,
                timeout_ms,
                report_dir,
                add_profiles,
            } => Self::set_(path, address, gateway, timeout_ms, report_dir, add_profiles),

            ConfigCommand::Get { key } => Self::get_(path, &key),

            ConfigCommand::Check => Self::check_(path),
        }
    }

    fn set_(
        path: &Path,
        address: Option<String>,
        gateway: Option<String>,
        timeout_ms: Option<u64>,
        report_dir: Option<PathBuf>,
        add_profiles: Vec<PathBuf>,
    ) -> Result<()> {
        let mut config = CliConfig::load_from(path)?;

        if let Some(address) = address {
            println!("✅ Default address: {}", address);
            config.address = Some(address);
        }

        if let Some(gateway) = gateway {
            println!("✅ Gateway: {}", gateway);
            config.gateway = Some(gateway);
        }

        if let Some(ms) = timeout_ms {
            if ms == 0 {
                bail!("timeout must be greater than zero");
            }
            println!("✅ Bus timeout: {} ms", ms);
            config.timeout_ms = Some(ms);
        }

        if let Some(dir) = report_dir {
            println!("✅ Report directory: {}", dir.display());
            config.report_dir = Some(dir);
        }

        for profile in add_profiles {
            if config.profiles.contains(&profile) {
                println!("⚠️  Profile already registered: {}", profile.display());
                continue;
            }
            println!("✅ Added profile: {}", profile.display());
            config.profiles.push(profile);
        }

        config.save_to(path)
    }

    fn get_(path: &Path, key: &str) -> Result<()> {
        let config = CliConfig::load_from(path)?;

        fn show(value: Option<String>) {
            match value {
                Some(v) => println!("{}", v),
                None => println!("(not set)"),
            }
        }

        match key {
            "address" => show(config.address),
            "gateway" => show(config.gateway),
            "timeout_ms" | "timeout-ms" => show(config.timeout_ms.map(|ms| ms.to_string())),
            "report_dir" | "report-dir" => show(config.report_dir.map(|d| d.display().to_string())),
            "profiles" => {
                for profile in &config.profiles {
                    println!("{}", profile.display());
                }
            },
            "all" => {
                println!("Calbench configuration:");
                println!("  address:    {:?}", config.address);
                println!("  gateway:    {:?}", config.gateway);
                println!("  timeout:    {:?}", config.timeout(None));
                println!("  report dir: {:?}", config.report_dir);
                println!("  profiles:   {:?}", config.profiles);
            },
            other => bail!("unknown config key {other:?}"),
        }

        Ok(())
    }

    fn check_(path: &Path) -> Result<()> {
        let config = CliConfig::load_from(path)?;
        println!("Config file: {}", path.display());

        let mut problems = 0;

        match config.resolve_address(None, None, false) {
            Ok(address) => println!("  ✅ address: {}", address),
            Err(e) => {
                println!("  ❌ address: {:#}", e);
                problems += 1;
            },
        }

        println!("  ✅ timeout: {:?}", config.timeout(None));

        for file in &config.profiles {
            match TestProfile::load_from_file(file) {
                Ok(profile) => println!("  ✅ profile {}: {} ({} stages)", file.display(), profile.title, profile.len()),
                Err(e) => {
                    println!("  ❌ profile {}: {}", file.display(), e);
                    problems += 1;
                },
            }
        }

        if problems > 0 {
            bail!("{problems} configuration problem(s) found");
        }
        Ok(())
    }
}
