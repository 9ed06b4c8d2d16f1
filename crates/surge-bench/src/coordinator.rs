use std::sync::Arc;

use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::session::{ClientSession, RunContext, SessionOutcome};
use surge_core::{Connector, LatencySummary, MetricsSnapshot, RunConfig};

/// Everything the reporter needs once every session has settled.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub metrics: MetricsSnapshot,
    pub latency: Option<LatencySummary>,
    pub outcomes: Vec<SessionOutcome>,
    /// Sessions that produced no outcome: aborted after the grace period or
    /// panicked.
    pub abandoned: usize,
}

/// Spawns the configured number of sessions and waits for all of them.
pub struct RunCoordinator {
    config: RunConfig,
    connector: Arc<dyn Connector>,
}

impl RunCoordinator {
    pub fn new(config: RunConfig, connector: Arc<dyn Connector>) -> Self {
        Self { config, connector }
    }

    /// Every call is a fresh run: metrics and the latency recorder start at
    /// the moment `run` is entered.
    pub async fn run(&self) -> RunReport {
        let ctx = RunContext::new(self.config.clone());
        let config = ctx.config.clone();
        info!(
            "Starting load test against {} with {} clients for {:?} over {} topics",
            config.address,
            config.clients,
            config.duration,
            ctx.topics.len()
        );

        let deadline = Instant::now() + config.duration;
        let handles: Vec<_> = (1..=config.clients)
            .map(|number| {
                let session = ClientSession::new(number, ctx.clone());
                tokio::spawn(session.run(self.connector.clone(), deadline))
            })
            .collect();

        // Sessions race their own deadline; this only catches ones stuck in
        // teardown.
        let hard_deadline = deadline + config.shutdown_grace;
        let mut outcomes = Vec::with_capacity(handles.len());
        let mut abandoned = 0;
        for mut handle in handles {
            match tokio::time::timeout_at(hard_deadline, &mut handle).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    error!("Client task failed: {}", e);
                    abandoned += 1;
                }
                Err(_) => {
                    warn!(
                        "Client session still running {:?} past the run duration, aborting",
                        config.shutdown_grace
                    );
                    handle.abort();
                    abandoned += 1;
                }
            }
        }

        RunReport {
            metrics: ctx.metrics.snapshot(),
            latency: ctx.latency.snapshot(),
            outcomes,
            abandoned,
        }
    }
}
