// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory inventory for tests.
//!
//! [`FakeInventory`] serves a fixed set of clusters and services with real
//! cursor pagination, counts every call and can be told to fail specific
//! operations. [`FakeClientFactory`] hands out one inventory per island and
//! [`FakeGateway`] serves an inventory over gRPC.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::api::inventory as pb;
use crate::api::{InventoryService, InventoryServiceServer};
use crate::client::{
    ClientFactory, ClientHandle, InventoryApi, Page, TenantIdentity, ASSUME_ROLE_METADATA_KEY,
};
use crate::error::{ExporterError, Result};
use crate::resources::{Cluster, Service};

/// Cluster ARN used by the fake inventory for `name`.
#[must_use]
pub fn cluster_arn(name: &str) -> String {
    format!("arn:aws:ecs:eu-west-1:000000000000:cluster/{name}")
}

/// `count` services named `<cluster>-svc-NN` with counts derived from the index.
#[must_use]
pub fn services(cluster: &str, count: usize) -> Vec<Service> {
    (0..count)
        .map(|i| {
            let name = format!("{cluster}-svc-{i:02}");
            Service {
                id: format!("arn:aws:ecs:eu-west-1:000000000000:service/{cluster}/{name}"),
                name,
                desired_tasks: (i % 4) as i64 + 1,
                running_tasks: (i % 4) as i64,
                pending_tasks: (i % 2) as i64,
                deployment_count: 1 + (i % 3 == 0) as i64,
            }
        })
        .collect()
}

/// Calls observed by a [`FakeInventory`].
#[derive(Debug, Default)]
pub struct CallLog {
    list_clusters: AtomicUsize,
    describe_clusters: AtomicUsize,
    list_services: AtomicUsize,
    describe_services: AtomicUsize,
    describe_services_done: AtomicUsize,
    batch_sizes: Mutex<Vec<usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CallLog {
    pub fn list_clusters(&self) -> usize {
        self.list_clusters.load(Ordering::SeqCst)
    }

    pub fn describe_clusters(&self) -> usize {
        self.describe_clusters.load(Ordering::SeqCst)
    }

    pub fn list_services(&self) -> usize {
        self.list_services.load(Ordering::SeqCst)
    }

    pub fn describe_services(&self) -> usize {
        self.describe_services.load(Ordering::SeqCst)
    }

    /// `DescribeServices` calls that ran to completion, successful or not.
    pub fn describe_services_done(&self) -> usize {
        self.describe_services_done.load(Ordering::SeqCst)
    }

    /// Calls running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Identifier count of each `DescribeServices` call, in arrival order.
    pub fn describe_services_batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Highest number of calls that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlight(self)
    }
}

struct InFlight<'a>(&'a CallLog);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
struct Failures {
    list_clusters: Option<tonic::Status>,
    describe_clusters: Option<tonic::Status>,
    list_services: HashMap<String, tonic::Status>,
    describe_services: HashMap<String, tonic::Status>,
}

/// In-memory [`InventoryApi`].
#[derive(Debug, Default)]
pub struct FakeInventory {
    clusters: BTreeMap<String, (Cluster, Vec<Service>)>,
    vanished: HashSet<String>,
    latency: Option<Duration>,
    service_latency: Option<Duration>,
    describe_latency: Option<Duration>,
    failures: Mutex<Failures>,
    calls: CallLog,
}

impl FakeInventory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cluster holding `services`.
    #[must_use]
    pub fn with_cluster(mut self, name: impl Into<String>, services: Vec<Service>) -> Self {
        let name = name.into();
        let cluster = Cluster::new(cluster_arn(&name), name);
        self.clusters.insert(cluster.id.clone(), (cluster, services));
        self
    }

    /// Add a cluster that is listed but left out of describe responses.
    #[must_use]
    pub fn with_vanished_cluster(mut self, name: &str) -> Self {
        let arn = cluster_arn(name);
        self.vanished.insert(arn.clone());
        self.clusters.insert(arn.clone(), (Cluster::new(arn, name), Vec::new()));
        self
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Delay only service calls by `latency`.
    #[must_use]
    pub fn with_service_latency(mut self, latency: Duration) -> Self {
        self.service_latency = Some(latency);
        self
    }

    /// Delay only `DescribeServices` by `latency`.
    #[must_use]
    pub fn with_describe_latency(mut self, latency: Duration) -> Self {
        self.describe_latency = Some(latency);
        self
    }

    /// The cluster named `name`.
    pub fn cluster(&self, name: &str) -> Option<Cluster> {
        self.clusters.get(&cluster_arn(name)).map(|(c, _)| c.clone())
    }

    pub fn calls(&self) -> &CallLog {
        &self.calls
    }

    pub fn fail_list_clusters(&self, status: tonic::Status) {
        self.failures().list_clusters = Some(status);
    }

    pub fn fail_describe_clusters(&self, status: tonic::Status) {
        self.failures().describe_clusters = Some(status);
    }

    /// Fail `ListServices` for the cluster named `cluster`.
    pub fn fail_list_services(&self, cluster: &str, status: tonic::Status) {
        self.failures()
            .list_services
            .insert(cluster_arn(cluster), status);
    }

    /// Fail any `DescribeServices` batch that contains `service_id`.
    pub fn fail_describe_services_containing(&self, service_id: &str, status: tonic::Status) {
        self.failures()
            .describe_services
            .insert(service_id.to_string(), status);
    }

    fn failures(&self) -> std::sync::MutexGuard<'_, Failures> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn delay(&self, extra: Option<Duration>) {
        let total = self.latency.unwrap_or_default() + extra.unwrap_or_default();
        if !total.is_zero() {
            tokio::time::sleep(total).await;
        }
    }

    fn page(ids: Vec<String>, bound: u32, cursor: Option<&str>) -> Page {
        let offset = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        let end = (offset + bound.max(1) as usize).min(ids.len());
        let chunk = ids.get(offset..end).map(<[String]>::to_vec).unwrap_or_default();
        if end < ids.len() {
            Page::more(chunk, end.to_string())
        } else {
            Page::last(chunk)
        }
    }

    fn services_of(&self, cluster_id: &str) -> &[Service] {
        self.clusters
            .get(cluster_id)
            .map(|(_, services)| services.as_slice())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InventoryApi for FakeInventory {
    async fn list_clusters(&self, page_bound: u32, cursor: Option<&str>) -> Result<Page> {
        self.calls.list_clusters.fetch_add(1, Ordering::SeqCst);
        let _guard = self.calls.enter();
        self.delay(None).await;

        if let Some(status) = self.failures().list_clusters.clone() {
            return Err(ExporterError::list("ListClusters", status));
        }
        Ok(Self::page(
            self.clusters.keys().cloned().collect(),
            page_bound,
            cursor,
        ))
    }

    async fn describe_clusters(&self, ids: &[String]) -> Result<Vec<Cluster>> {
        self.calls.describe_clusters.fetch_add(1, Ordering::SeqCst);
        let _guard = self.calls.enter();
        self.delay(None).await;

        if let Some(status) = self.failures().describe_clusters.clone() {
            return Err(ExporterError::describe("DescribeClusters", status));
        }
        Ok(ids
            .iter()
            .filter(|id| !self.vanished.contains(*id))
            .filter_map(|id| self.clusters.get(id).map(|(c, _)| c.clone()))
            .collect())
    }

    async fn list_services(
        &self,
        cluster_id: &str,
        page_bound: u32,
        cursor: Option<&str>,
    ) -> Result<Page> {
        self.calls.list_services.fetch_add(1, Ordering::SeqCst);
        let _guard = self.calls.enter();
        self.delay(self.service_latency).await;

        if let Some(status) = self.failures().list_services.get(cluster_id).cloned() {
            return Err(ExporterError::list("ListServices", status));
        }
        let ids = self
            .services_of(cluster_id)
            .iter()
            .map(|s| s.id.clone())
            .collect();
        Ok(Self::page(ids, page_bound, cursor))
    }

    async fn describe_services(&self, cluster_id: &str, ids: &[String]) -> Result<Vec<Service>> {
        self.calls.describe_services.fetch_add(1, Ordering::SeqCst);
        self.calls
            .batch_sizes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ids.len());
        let _guard = self.calls.enter();
        self.delay(self.service_latency).await;
        if let Some(latency) = self.describe_latency {
            tokio::time::sleep(latency).await;
        }
        self.calls.describe_services_done.fetch_add(1, Ordering::SeqCst);

        let failure = {
            let failures = self.failures();
            ids.iter()
                .find_map(|id| failures.describe_services.get(id).cloned())
        };
        if let Some(status) = failure {
            return Err(ExporterError::describe("DescribeServices", status));
        }

        let wanted: HashSet<&String> = ids.iter().collect();
        Ok(self
            .services_of(cluster_id)
            .iter()
            .filter(|s| wanted.contains(&s.id))
            .cloned()
            .collect())
    }
}

/// [`ClientFactory`] serving a [`FakeInventory`] per island.
#[derive(Debug, Default)]
pub struct FakeClientFactory {
    inventories: HashMap<String, Arc<FakeInventory>>,
    auth_failures: HashSet<String>,
}

impl FakeClientFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `inventory` to the tenant labeled `island` (`""` for the anonymous tenant).
    #[must_use]
    pub fn with_tenant(mut self, island: impl Into<String>, inventory: Arc<FakeInventory>) -> Self {
        self.inventories.insert(island.into(), inventory);
        self
    }

    /// Refuse credentials for `island`.
    #[must_use]
    pub fn with_auth_failure(mut self, island: impl Into<String>) -> Self {
        self.auth_failures.insert(island.into());
        self
    }
}

#[async_trait]
impl ClientFactory for FakeClientFactory {
    async fn connect(&self, tenant: &TenantIdentity) -> Result<ClientHandle> {
        tenant.role_metadata()?;

        if self.auth_failures.contains(tenant.island()) {
            return Err(tenant.auth_error("AccessDenied: not authorized to perform sts:AssumeRole"));
        }
        match self.inventories.get(tenant.island()) {
            Some(inventory) => {
                let client: ClientHandle = inventory.clone();
                Ok(client)
            }
            None => Err(tenant.auth_error("no inventory for island")),
        }
    }
}

/// Serves a [`FakeInventory`] over the gRPC inventory API.
#[derive(Debug, Clone)]
pub struct FakeGateway {
    inventory: Arc<FakeInventory>,
    rejected_roles: HashSet<String>,
}

impl FakeGateway {
    #[must_use]
    pub fn new(inventory: Arc<FakeInventory>) -> Self {
        Self {
            inventory,
            rejected_roles: HashSet::new(),
        }
    }

    /// Answer every call made with `role` as permission denied.
    #[must_use]
    pub fn with_rejected_role(mut self, role: impl Into<String>) -> Self {
        self.rejected_roles.insert(role.into());
        self
    }

    fn authorize<T>(&self, request: &tonic::Request<T>) -> std::result::Result<(), tonic::Status> {
        let role = request
            .metadata()
            .get(ASSUME_ROLE_METADATA_KEY)
            .and_then(|value| value.to_str().ok());
        match role {
            Some(role) if self.rejected_roles.contains(role) => Err(tonic::Status::permission_denied(
                format!("not authorized to perform sts:AssumeRole on {role}"),
            )),
            _ => Ok(()),
        }
    }

    /// The tonic service to add to a server.
    #[must_use]
    pub fn into_service(self) -> InventoryServiceServer<FakeGateway> {
        InventoryServiceServer::new(self)
    }
}

fn to_status(err: ExporterError) -> tonic::Status {
    match err.upstream_status() {
        Some(status) => status.clone(),
        None => tonic::Status::internal(err.to_string()),
    }
}

fn page_bound(max_results: i32) -> u32 {
    u32::try_from(max_results).unwrap_or(0).max(1)
}

fn cursor(token: &str) -> Option<&str> {
    Some(token).filter(|t| !t.is_empty())
}

#[async_trait]
impl InventoryService for FakeGateway {
    async fn list_clusters(
        &self,
        request: tonic::Request<pb::ListClustersRequest>,
    ) -> std::result::Result<tonic::Response<pb::ListClustersResponse>, tonic::Status> {
        self.authorize(&request)?;
        let request = request.into_inner();
        let page = self
            .inventory
            .list_clusters(page_bound(request.max_results), cursor(&request.next_token))
            .await
            .map_err(to_status)?;
        Ok(tonic::Response::new(pb::ListClustersResponse {
            cluster_arns: page.ids,
            next_token: page.next_cursor.unwrap_or_default(),
        }))
    }

    async fn describe_clusters(
        &self,
        request: tonic::Request<pb::DescribeClustersRequest>,
    ) -> std::result::Result<tonic::Response<pb::DescribeClustersResponse>, tonic::Status> {
        self.authorize(&request)?;
        let ids = request.into_inner().clusters;
        let clusters = self
            .inventory
            .describe_clusters(&ids)
            .await
            .map_err(to_status)?;
        let failures = ids
            .iter()
            .filter(|id| !clusters.iter().any(|c| &c.id == *id))
            .map(|id| pb::Failure {
                arn: id.clone(),
                reason: "MISSING".to_string(),
            })
            .collect();
        Ok(tonic::Response::new(pb::DescribeClustersResponse {
            clusters: clusters
                .into_iter()
                .map(|c| pb::Cluster {
                    cluster_arn: c.id,
                    cluster_name: c.name,
                })
                .collect(),
            failures,
        }))
    }

    async fn list_services(
        &self,
        request: tonic::Request<pb::ListServicesRequest>,
    ) -> std::result::Result<tonic::Response<pb::ListServicesResponse>, tonic::Status> {
        self.authorize(&request)?;
        let request = request.into_inner();
        let page = self
            .inventory
            .list_services(
                &request.cluster,
                page_bound(request.max_results),
                cursor(&request.next_token),
            )
            .await
            .map_err(to_status)?;
        Ok(tonic::Response::new(pb::ListServicesResponse {
            service_arns: page.ids,
            next_token: page.next_cursor.unwrap_or_default(),
        }))
    }

    async fn describe_services(
        &self,
        request: tonic::Request<pb::DescribeServicesRequest>,
    ) -> std::result::Result<tonic::Response<pb::DescribeServicesResponse>, tonic::Status> {
        self.authorize(&request)?;
        let request = request.into_inner();
        let services = self
            .inventory
            .describe_services(&request.cluster, &request.services)
            .await
            .map_err(to_status)?;
        Ok(tonic::Response::new(pb::DescribeServicesResponse {
            services: services
                .into_iter()
                .map(|s| pb::Service {
                    service_arn: s.id,
                    service_name: s.name,
                    desired_count: s.desired_tasks,
                    running_count: s.running_tasks,
                    pending_count: s.pending_tasks,
                    deployments: (0..s.deployment_count)
                        .map(|i| pb::Deployment {
                            id: format!("ecs-svc/{i}"),
                            status: if i == 0 { "PRIMARY" } else { "ACTIVE" }.to_string(),
                        })
                        .collect(),
                })
                .collect(),
            failures: Vec::new(),
        }))
    }
}
