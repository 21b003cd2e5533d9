//! # Fanout CLI
//!
//! 命令行接口入口点。
//!
//! 提供：
//! - 配置加载与验证
//! - 启动 fan-out 并等待终止信号
//! - 优雅关闭与运行摘要

mod cli;
mod commands;
mod summary;

use anyhow::Result;
use clap::Parser;
use observability::ObservabilityConfig;
use tracing::info;

use cli::{Cli, Commands};
use commands::{run_fanout, run_validate};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    observability::init_with_config(ObservabilityConfig {
        log_format: cli.log_format.into(),
        metrics_port: cli.metrics_port(),
        default_log_level: cli.log_level().to_string(),
    })?;

    info!(version = env!("CARGO_PKG_VERSION"), "Fanout CLI starting");

    let result = match &cli.command {
        Commands::Run(args) => run_fanout(args).await,
        Commands::Validate(args) => run_validate(args),
    };

    if let Err(ref e) = result {
        tracing::error!(error = %e, "Command failed");
    }

    result
}
