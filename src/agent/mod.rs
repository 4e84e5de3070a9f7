//! Node Agent: per-host process supervisor and metrics engine.
//!
//! The agent accepts control requests over HTTP and owns the child
//! processes it spawns:
//! - **Process supervision**: spawn, track, and terminate children
//! - **Metrics**: host CPU/memory sampled from the kernel pseudofiles
//! - **Reaping**: a background task purges records of dead children
//!
//! # Components
//!
//! - [`ProcessSupervisor`]: the mutex-guarded process table
//! - [`MetricsSampler`]: delta-based CPU and meminfo sampling
//! - [`http`]: the `/status`, `/start`, `/stop` wire surface
//!
//! Children are not killed on agent shutdown; they keep running and the
//! in-memory table is simply lost.

pub mod http;
pub mod metrics;
pub mod process;

pub use metrics::{MetricsSampler, SystemMetrics};
pub use process::{ProcessRecord, ProcessStatus, ProcessSupervisor};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::Result;

/// The per-host agent service: HTTP surface plus the reaper task.
pub struct Agent {
    config: AgentConfig,
    supervisor: Arc<ProcessSupervisor>,
    sampler: Arc<MetricsSampler>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        let supervisor = Arc::new(ProcessSupervisor::new(config.stop_grace_period));
        Self {
            config,
            supervisor,
            sampler: Arc::new(MetricsSampler::new()),
        }
    }

    /// Serve HTTP and run the reaper until the shutdown token fires.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let reaper = self.supervisor.clone();
        let reap_interval = self.config.reap_interval;
        let reaper_shutdown = shutdown.clone();
        tokio::spawn(async move {
            reaper.run_reaper(reap_interval, reaper_shutdown).await;
        });

        let state = http::AgentState {
            supervisor: self.supervisor.clone(),
            sampler: self.sampler.clone(),
        };
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(addr = %addr, "Node agent listening");

        axum::serve(listener, http::router(state))
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        Ok(())
    }
}
