// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, warn};

use super::ScrapeContext;
use crate::client::{ClientHandle, TenantIdentity};
use crate::metrics::{Metric, MetricSink};
use crate::resources::{enumerate_clusters, enumerate_services, Cluster};

/// How one tenant's collection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantOutcome {
    /// No session could be established; nothing was emitted.
    Skipped,
    /// Cluster enumeration failed; `up=0` was emitted.
    Down,
    /// Clusters were enumerated; `failed_clusters` of them had no service data.
    Up {
        clusters: usize,
        failed_clusters: usize,
    },
    /// The deadline expired before the worker finished.
    TimedOut,
}

/// Collects one tenant's inventory onto a sink.
pub(crate) struct TenantWorker {
    ctx: Arc<ScrapeContext>,
    tenant: TenantIdentity,
    sink: MetricSink,
    up_reported: Arc<AtomicBool>,
}

impl TenantWorker {
    pub(crate) fn new(ctx: Arc<ScrapeContext>, tenant: TenantIdentity, sink: MetricSink) -> Self {
        Self {
            ctx,
            tenant,
            sink,
            up_reported: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once this worker has emitted its `up` sample.
    pub(crate) fn up_reported(&self) -> Arc<AtomicBool> {
        self.up_reported.clone()
    }

    pub(crate) async fn run(self) -> TenantOutcome {
        let island = self.tenant.island().to_string();

        let client = match self.ctx.factory.connect(&self.tenant).await {
            Ok(client) => client,
            Err(e) => {
                warn!(island = %island, error = %e, "could not create a session, skipping tenant");
                return TenantOutcome::Skipped;
            }
        };

        let clusters = match enumerate_clusters(&client, &self.ctx.options).await {
            Ok(clusters) => clusters,
            Err(e) => {
                error!(island = %island, error = %e, "could not list clusters");
                self.emit_up(0.0);
                return TenantOutcome::Down;
            }
        };

        self.emit_up(1.0);
        self.sink.emit(self.ctx.descriptors.sample(
            Metric::ClustersTotal,
            &[self.ctx.region.as_str(), island.as_str()],
            clusters.len() as f64,
        ));

        let total = clusters.len();
        let mut tasks = JoinSet::new();
        for cluster in clusters {
            tasks.spawn(scan_cluster(
                self.ctx.clone(),
                client.clone(),
                island.clone(),
                cluster,
                self.sink.clone(),
            ));
        }

        let mut failed_clusters = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => {}
                Ok(false) => failed_clusters += 1,
                Err(e) => {
                    error!(island = %island, error = %e, "cluster task did not complete");
                    failed_clusters += 1;
                }
            }
        }

        TenantOutcome::Up {
            clusters: total,
            failed_clusters,
        }
    }

    fn emit_up(&self, value: f64) {
        self.up_reported.store(true, Ordering::SeqCst);
        self.sink.emit(
            self.ctx
                .descriptors
                .sample(Metric::Up, &[self.ctx.region.as_str(), self.tenant.island()], value),
        );
    }
}

/// Enumerate one cluster's services and emit their samples.
///
/// Returns `false` when the enumeration failed; nothing is emitted then.
async fn scan_cluster(
    ctx: Arc<ScrapeContext>,
    client: ClientHandle,
    island: String,
    cluster: Cluster,
    sink: MetricSink,
) -> bool {
    let services = match enumerate_services(&client, &cluster, &ctx.options).await {
        Ok(services) => services,
        Err(e) => {
            error!(island = %island, cluster = %cluster.name, error = %e, "could not collect services");
            return false;
        }
    };

    debug!(island = %island, cluster = %cluster.name, "described {} services", services.len());

    let descriptors = &ctx.descriptors;
    let region = ctx.region.as_str();
    sink.emit(descriptors.sample(
        Metric::ServicesTotal,
        &[region, island.as_str(), cluster.name.as_str()],
        services.len() as f64,
    ));

    for service in &services {
        let labels = [region, island.as_str(), cluster.name.as_str(), service.name.as_str()];
        for (metric, value) in [
            (Metric::ServiceDesiredTasks, service.desired_tasks),
            (Metric::ServicePendingTasks, service.pending_tasks),
            (Metric::ServiceRunningTasks, service.running_tasks),
            (Metric::ServiceDeployments, service.deployment_count),
        ] {
            sink.emit(descriptors.sample(metric, &labels, value as f64));
        }
    }
    true
}
