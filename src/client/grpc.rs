// SPDX-License-Identifier: MIT OR Apache-2.0

//! gRPC-backed inventory client.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tonic::service::interceptor::InterceptedService;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::debug;

use super::{ClientFactory, ClientHandle, InventoryApi, Page, TenantIdentity, TenantInterceptor};
use crate::api::inventory::{
    DescribeClustersRequest, DescribeServicesRequest, Failure, ListClustersRequest,
    ListServicesRequest,
};
use crate::api::InventoryServiceClient;
use crate::config::ExporterConfig;
use crate::error::{ExporterError, Result};
use crate::resources::{Cluster, Service};
use crate::runtime::{RequestLogger, RetryConfig};

type TenantClient = InventoryServiceClient<InterceptedService<Channel, TenantInterceptor>>;

/// Connection settings for the inventory gateway.
#[derive(Clone, Debug)]
pub struct GrpcClientConfig {
    /// Gateway URL (`http://` or `https://`)
    pub endpoint: String,
    /// Region sent with every request
    pub region: String,
    /// CA bundle for an `https://` gateway; webpki roots when unset
    pub ca_path: Option<PathBuf>,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Option<Duration>,
    /// Retries for transient failures
    pub max_retries: u32,
}

impl GrpcClientConfig {
    /// Settings for `endpoint` in `region` with default timeouts.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            region: region.into(),
            ca_path: None,
            connect_timeout: Duration::from_secs(5),
            request_timeout: Some(Duration::from_secs(10)),
            max_retries: 3,
        }
    }

    /// Derive the gateway settings from the exporter configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no region is configured.
    #[allow(clippy::result_large_err)]
    pub fn from_exporter_config(config: &ExporterConfig) -> Result<Self> {
        Ok(Self {
            ca_path: config.ca_path.clone(),
            max_retries: config.max_retries,
            ..Self::new(config.endpoint.clone(), config.region()?)
        })
    }

    /// Set the number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Creates a fresh lazily-connected channel per tenant and scrape.
///
/// Nothing is dialed until the first call, so an unreachable gateway shows up
/// as a failed `ListClusters` rather than as an authentication failure.
#[derive(Clone, Debug)]
pub struct GrpcClientFactory {
    config: GrpcClientConfig,
}

impl GrpcClientFactory {
    /// Create a factory.
    #[must_use]
    pub fn new(config: GrpcClientConfig) -> Self {
        Self { config }
    }

    /// The gateway settings.
    #[must_use]
    pub fn config(&self) -> &GrpcClientConfig {
        &self.config
    }

    #[allow(clippy::result_large_err)]
    fn endpoint(&self) -> Result<Endpoint> {
        let mut endpoint = Endpoint::from_shared(self.config.endpoint.clone())
            .map_err(|e| ExporterError::Config(format!("Invalid endpoint URL: {e}")))?
            .connect_timeout(self.config.connect_timeout);

        if let Some(timeout) = self.config.request_timeout {
            endpoint = endpoint.timeout(timeout);
        }

        if self.config.endpoint.starts_with("https://") {
            let mut tls = ClientTlsConfig::new().with_webpki_roots();
            if let Some(ca_path) = &self.config.ca_path {
                let ca_pem = std::fs::read(ca_path).map_err(|e| {
                    ExporterError::Config(format!(
                        "Failed to read CA cert {}: {e}",
                        ca_path.display()
                    ))
                })?;
                tls = tls.ca_certificate(Certificate::from_pem(ca_pem));
            }
            endpoint = endpoint.tls_config(tls)?;
        }

        Ok(endpoint)
    }
}

#[async_trait]
impl ClientFactory for GrpcClientFactory {
    async fn connect(&self, tenant: &TenantIdentity) -> Result<ClientHandle> {
        let interceptor = TenantInterceptor::new(tenant, &self.config.region)?;
        let channel = self
            .endpoint()
            .map_err(|e| tenant.auth_error(e.to_string()))?
            .connect_lazy();

        Ok(Arc::new(GrpcInventoryClient {
            inner: InventoryServiceClient::with_interceptor(channel, interceptor),
            retry: RetryConfig::new(self.config.max_retries),
            logger: Arc::new(RequestLogger::new()),
        }))
    }
}

/// [`InventoryApi`] over the inventory gateway, with retries on transient codes.
#[derive(Clone)]
pub struct GrpcInventoryClient {
    inner: TenantClient,
    retry: RetryConfig,
    logger: Arc<RequestLogger>,
}

impl GrpcInventoryClient {
    async fn call<T, F, Fut>(
        &self,
        method: &'static str,
        mut op: F,
    ) -> std::result::Result<T, tonic::Status>
    where
        F: FnMut(TenantClient) -> Fut,
        Fut: Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    {
        let span = self.logger.start(method);
        let result = self.retry.execute(|| op(self.inner.clone())).await;
        match &result {
            Ok(_) => self.logger.finish_success(span),
            Err(status) => self.logger.finish_error(span, status.message()),
        }
        result.map(tonic::Response::into_inner)
    }
}

fn log_failures(operation: &str, failures: &[Failure]) {
    for failure in failures {
        debug!(
            operation,
            arn = %failure.arn,
            reason = %failure.reason,
            "resource not described"
        );
    }
}

fn non_empty(token: String) -> Option<String> {
    Some(token).filter(|t| !t.is_empty())
}

#[async_trait]
impl InventoryApi for GrpcInventoryClient {
    async fn list_clusters(&self, page_bound: u32, cursor: Option<&str>) -> Result<Page> {
        let request = ListClustersRequest {
            max_results: page_bound as i32,
            next_token: cursor.unwrap_or_default().to_string(),
        };
        let response = self
            .call("ListClusters", |mut client| {
                let request = request.clone();
                async move { client.list_clusters(request).await }
            })
            .await
            .map_err(|status| ExporterError::list("ListClusters", status))?;

        Ok(Page {
            ids: response.cluster_arns,
            next_cursor: non_empty(response.next_token),
        })
    }

    async fn describe_clusters(&self, ids: &[String]) -> Result<Vec<Cluster>> {
        let request = DescribeClustersRequest {
            clusters: ids.to_vec(),
        };
        let response = self
            .call("DescribeClusters", |mut client| {
                let request = request.clone();
                async move { client.describe_clusters(request).await }
            })
            .await
            .map_err(|status| ExporterError::describe("DescribeClusters", status))?;

        log_failures("DescribeClusters", &response.failures);
        Ok(response
            .clusters
            .into_iter()
            .map(|c| Cluster::new(c.cluster_arn, c.cluster_name))
            .collect())
    }

    async fn list_services(
        &self,
        cluster_id: &str,
        page_bound: u32,
        cursor: Option<&str>,
    ) -> Result<Page> {
        let request = ListServicesRequest {
            cluster: cluster_id.to_string(),
            max_results: page_bound as i32,
            next_token: cursor.unwrap_or_default().to_string(),
        };
        let response = self
            .call("ListServices", |mut client| {
                let request = request.clone();
                async move { client.list_services(request).await }
            })
            .await
            .map_err(|status| ExporterError::list("ListServices", status))?;

        Ok(Page {
            ids: response.service_arns,
            next_cursor: non_empty(response.next_token),
        })
    }

    async fn describe_services(&self, cluster_id: &str, ids: &[String]) -> Result<Vec<Service>> {
        let request = DescribeServicesRequest {
            cluster: cluster_id.to_string(),
            services: ids.to_vec(),
        };
        let response = self
            .call("DescribeServices", |mut client| {
                let request = request.clone();
                async move { client.describe_services(request).await }
            })
            .await
            .map_err(|status| ExporterError::describe("DescribeServices", status))?;

        log_failures("DescribeServices", &response.failures);
        Ok(response
            .services
            .into_iter()
            .map(|s| Service {
                id: s.service_arn,
                name: s.service_name,
                desired_tasks: s.desired_count.max(0),
                running_tasks: s.running_count.max(0),
                pending_tasks: s.pending_count.max(0),
                deployment_count: s.deployments.len() as i64,
            })
            .collect())
    }
}
