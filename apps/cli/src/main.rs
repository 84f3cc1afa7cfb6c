//! # Calbench CLI
//!
//! 记录仪输出校准验收测试的命令行工具。
//!
//! ```bash
//! # 配置默认仪器地址
//! calbench config set --address prologix://192.168.1.50/16
//!
//! # 交互式选择测试并逐阶段提示操作员
//! calbench run
//!
//! # 无硬件演示：模拟万用表 + 自动确认
//! calbench run --test zero-carryover --simulate --yes
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod progress;
mod prompt;
mod render;
mod simulate;

use commands::{ConfigCommand, ProfilesCommand, RunCommand};

/// Calbench - 校准验收测试工具
#[derive(Parser, Debug)]
#[command(name = "calbench")]
#[command(about = "Acceptance tests for recorder-output calibration", long_about = None)]
#[command(version)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 执行验收测试
    Run {
        #[command(flatten)]
        args: RunCommand,
    },

    /// 列出可用的测试配置
    Profiles {
        #[command(flatten)]
        args: ProfilesCommand,
    },

    /// 配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 初始化日志
    let directive = if cli.verbose { "calbench=debug" } else { "calbench=info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { args } => args.execute(),
        Commands::Profiles { args } => args.execute(),
        Commands::Config(cmd) => cmd.execute(),
    }
}
