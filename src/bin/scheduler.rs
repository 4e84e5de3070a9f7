use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use micro_orchestrator::config::SchedulerConfig;
use micro_orchestrator::scheduler::Scheduler;
use micro_orchestrator::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "scheduler")]
#[command(about = "Placement scheduler for the micro-orchestrator")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind to
    #[arg(long, default_value = "5000")]
    port: u16,

    /// Path of the desired-state snapshot file
    #[arg(long, default_value = "orchestrator_state.json")]
    state_file: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = SchedulerConfig::new(args.host, args.port).with_state_file(args.state_file);

    tracing::info!(
        host = %config.host,
        port = config.port,
        state_file = %config.state_file_path.display(),
        "Starting scheduler"
    );

    let shutdown = install_shutdown_handler();
    let scheduler = Arc::new(Scheduler::new(config)?);
    scheduler.run(shutdown).await?;

    tracing::info!("Scheduler stopped");
    Ok(())
}
