// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::worker::{TenantOutcome, TenantWorker};
use super::ScrapeContext;
use crate::client::TenantIdentity;
use crate::metrics::{Metric, MetricSink};

/// Result of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeSummary {
    pub tenants: usize,
    pub up: usize,
    pub down: usize,
    pub skipped: usize,
    pub timed_out: usize,
    /// Clusters whose services could not be collected, across all tenants
    pub failed_clusters: usize,
}

impl ScrapeSummary {
    fn record(&mut self, outcome: TenantOutcome) {
        match outcome {
            TenantOutcome::Skipped => self.skipped += 1,
            TenantOutcome::Down => self.down += 1,
            TenantOutcome::TimedOut => self.timed_out += 1,
            TenantOutcome::Up { failed_clusters, .. } => {
                self.up += 1;
                self.failed_clusters += failed_clusters;
            }
        }
    }
}

/// Runs one tenant worker per configured tenant and waits for all of them.
pub struct Orchestrator {
    ctx: Arc<ScrapeContext>,
    tenants: Vec<TenantIdentity>,
    deadline: Option<Duration>,
}

impl Orchestrator {
    pub(crate) fn new(
        ctx: Arc<ScrapeContext>,
        tenants: Vec<TenantIdentity>,
        deadline: Option<Duration>,
    ) -> Self {
        // no roles configured still means one collection with ambient credentials
        let tenants = if tenants.is_empty() {
            vec![TenantIdentity::anonymous()]
        } else {
            tenants
        };
        Self {
            ctx,
            tenants,
            deadline,
        }
    }

    /// The tenants collected on every run.
    #[must_use]
    pub fn tenants(&self) -> &[TenantIdentity] {
        &self.tenants
    }

    /// Collect every tenant onto `sink`, returning once all workers are done.
    pub async fn run(&self, sink: &MetricSink) -> ScrapeSummary {
        let started = Instant::now();
        let mut workers = JoinSet::new();

        for tenant in &self.tenants {
            let worker = TenantWorker::new(self.ctx.clone(), tenant.clone(), sink.clone());
            workers.spawn(run_with_deadline(
                worker,
                self.ctx.clone(),
                tenant.clone(),
                sink.clone(),
                self.deadline,
            ));
        }

        let mut summary = ScrapeSummary {
            tenants: self.tenants.len(),
            ..ScrapeSummary::default()
        };
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "tenant worker did not complete");
                    summary.skipped += 1;
                }
            }
        }

        info!(
            tenants = summary.tenants,
            up = summary.up,
            down = summary.down,
            skipped = summary.skipped,
            timed_out = summary.timed_out,
            failed_clusters = summary.failed_clusters,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "collection finished"
        );
        summary
    }
}

/// Run `worker`, giving up after `deadline`.
///
/// On expiry the worker future is dropped, which aborts its cluster scans and
/// their describe batches. Samples already emitted stay. `up=0` is emitted
/// only when the worker had not reported `up` yet: a tenant whose clusters
/// were listed keeps its `up=1` and never gets a second `up` sample.
async fn run_with_deadline(
    worker: TenantWorker,
    ctx: Arc<ScrapeContext>,
    tenant: TenantIdentity,
    sink: MetricSink,
    deadline: Option<Duration>,
) -> TenantOutcome {
    let Some(deadline) = deadline else {
        return worker.run().await;
    };

    let up_reported = worker.up_reported();
    let result = tokio::time::timeout(deadline, worker.run()).await;
    match result {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(island = %tenant.island(), ?deadline, "tenant collection timed out");
            if !up_reported.swap(true, Ordering::SeqCst) {
                sink.emit(ctx.descriptors.sample(
                    Metric::Up,
                    &[ctx.region.as_str(), tenant.island()],
                    0.0,
                ));
            }
            TenantOutcome::TimedOut
        }
    }
}
