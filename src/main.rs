use anyhow::Result;
use clap::Parser;
use tracing::info;

use malg_acta::cli::Cli;
use malg_acta::{init_telemetry, run_workflow, AppConfig, BuiltinModules, ExecutionContext, Logger, ShutdownSignal};

fn main() -> Result<()> {
    let cli = Cli::parse();
    tokio::runtime::Runtime::new()?.block_on(async { run(cli).await })
}

async fn run(cli: Cli) -> Result<()> {
    AppConfig::load_env_file();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(method) = cli.input {
        config.input.method = method;
    }

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_telemetry(&config.logging)?;
    info!(input = config.input.method.strategy_name(), "Starting malg-acta");

    let shutdown = ShutdownSignal::new();
    shutdown.install_ctrl_c_handler();

    let ctx = ExecutionContext::new(config, Logger::console(), shutdown);
    let report = run_workflow(&ctx, Box::new(BuiltinModules::standard())).await?;
    info!(completed = report.completed_sessions(), "Goodbye");
    Ok(())
}
