use clap::Parser;
use tracing_subscriber::EnvFilter;

use micro_orchestrator::agent::Agent;
use micro_orchestrator::config::AgentConfig;
use micro_orchestrator::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "node-agent")]
#[command(about = "Per-host process supervisor for the micro-orchestrator")]
struct Args {
    /// Port to listen on for HTTP control requests
    #[arg(long, default_value = "8080")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = AgentConfig::new(args.port);

    tracing::info!(port = config.port, "Starting node agent");

    let shutdown = install_shutdown_handler();
    Agent::new(config).run(shutdown).await?;

    tracing::info!("Node agent stopped");
    Ok(())
}
