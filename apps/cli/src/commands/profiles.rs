//! 测试配置列表命令

use super::config::CliConfig;
use anyhow::Result;
use calbench_client::{ProfileError, TestKind, TestProfile};
use clap::Args;
use std::path::PathBuf;
use tracing::warn;

/// 可用的测试配置：内置三种 + 配置文件中登记的自定义配置
#[derive(Debug)]
pub struct ProfileCatalog {
    pub profiles: Vec<TestProfile>,
    /// 加载失败的自定义配置
    pub rejected: Vec<(PathBuf, ProfileError)>,
}

impl ProfileCatalog {
    pub fn load(config: &CliConfig) -> Self {
        let mut profiles: Vec<TestProfile> =
            TestKind::BUILTIN.iter().filter_map(|&kind| TestProfile::builtin(kind)).collect();
        let mut rejected = Vec::new();

        for path in &config.profiles {
            match TestProfile::load_from_file(path) {
                Ok(profile) => profiles.push(profile),
                Err(e) => {
                    warn!("Skipping profile {}: {}", path.display(), e);
                    rejected.push((path.clone(), e));
                },
            }
        }

        Self { profiles, rejected }
    }

    /// 选择菜单中显示的标题
    pub fn titles(&self) -> Vec<String> {
        self.profiles.iter().map(|p| p.title.clone()).collect()
    }

    /// 按类型查找第一个匹配的配置
    pub fn find(&self, kind: TestKind) -> Option<&TestProfile> {
        self.profiles.iter().find(|p| p.kind == kind)
    }
}

/// 列出测试配置
#[derive(Args, Debug)]
pub struct ProfilesCommand {
    /// 同时列出每个阶段的验收窗口
    #[arg(short, long)]
    detail: bool,
}

impl ProfilesCommand {
    pub fn execute(self) -> Result<()> {
        let config = CliConfig::load()?;
        let catalog = ProfileCatalog::load(&config);

        println!("📋 Available tests:");
        for profile in &catalog.profiles {
            println!("  [{}] {} ({} stages)", profile.kind, profile.title, profile.len());

            if self.detail {
                for point in &profile.points {
                    println!(
                        "      {:>2}. {:<14} [{:.prec$}, {:.prec$}] V",
                        point.stage.index + 1,
                        point.stage.label,
                        point.limit.low(),
                        point.limit.high(),
                        prec = profile.limit_precision
                    );
                }
            }
        }

        for (path, e) in &catalog.rejected {
            println!("  ❌ {}: {}", path.display(), e);
        }

        Ok(())
    }
}
