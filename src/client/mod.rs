// SPDX-License-Identifier: MIT OR Apache-2.0

//! Access to the remote inventory API.
//!
//! - [`InventoryApi`]: the four list/describe operations the collector needs
//! - [`ClientFactory`]: produces one authenticated [`ClientHandle`] per tenant
//! - [`GrpcClientFactory`]: the production factory talking to the inventory gateway
//!
//! # Example
//!
//! ```no_run
//! use ecs_exporter_rs::client::{ClientFactory, GrpcClientFactory, GrpcClientConfig, TenantIdentity};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let factory = GrpcClientFactory::new(GrpcClientConfig::new("http://127.0.0.1:50051", "eu-west-1"));
//! let client = factory.connect(&TenantIdentity::anonymous()).await?;
//! let page = client.list_clusters(10, None).await?;
//! println!("first page: {:?}", page.ids);
//! # Ok(())
//! # }
//! ```

mod grpc;
mod tenant;


use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::resources::{Cluster, Service};

pub use grpc::{GrpcClientConfig, GrpcClientFactory, GrpcInventoryClient};
pub use tenant::{
    TenantIdentity, TenantInterceptor, ASSUME_ROLE_METADATA_KEY, REGION_METADATA_KEY,
};

/// One page of identifiers from a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    /// Resource identifiers on this page.
    pub ids: Vec<String>,
    /// Cursor for the next page; `None` or empty means end of results.
    pub next_cursor: Option<String>,
}

impl Page {
    /// A final page.
    #[must_use]
    pub fn last(ids: Vec<String>) -> Self {
        Self {
            ids,
            next_cursor: None,
        }
    }

    /// A page followed by more results.
    #[must_use]
    pub fn more(ids: Vec<String>, cursor: impl Into<String>) -> Self {
        Self {
            ids,
            next_cursor: Some(cursor.into()),
        }
    }

    /// The cursor to continue with, treating an empty cursor as none.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.next_cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// The remote inventory operations.
///
/// Implementations report failures as [`ExporterError::UpstreamList`] or
/// [`ExporterError::UpstreamDescribe`].
///
/// [`ExporterError::UpstreamList`]: crate::error::ExporterError::UpstreamList
/// [`ExporterError::UpstreamDescribe`]: crate::error::ExporterError::UpstreamDescribe
#[async_trait]
pub trait InventoryApi: Send + Sync {
    /// List one page of cluster identifiers.
    async fn list_clusters(&self, page_bound: u32, cursor: Option<&str>) -> Result<Page>;

    /// Describe clusters by identifier. Unknown identifiers are left out.
    async fn describe_clusters(&self, ids: &[String]) -> Result<Vec<Cluster>>;

    /// List one page of service identifiers in a cluster.
    async fn list_services(
        &self,
        cluster_id: &str,
        page_bound: u32,
        cursor: Option<&str>,
    ) -> Result<Page>;

    /// Describe services of a cluster by identifier.
    async fn describe_services(&self, cluster_id: &str, ids: &[String]) -> Result<Vec<Service>>;
}

/// An authenticated session for one tenant, shared by that tenant's tasks.
pub type ClientHandle = Arc<dyn InventoryApi>;

/// Produces a [`ClientHandle`] for a tenant.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Establish a session for `tenant`.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Auth`](crate::error::ExporterError::Auth) when
    /// credentials for the tenant cannot be set up.
    async fn connect(&self, tenant: &TenantIdentity) -> Result<ClientHandle>;
}
