// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inventory entities and the enumerators that discover them.
//!
//! - [`list_all`]: follows pagination cursors until the server stops returning one
//! - [`enumerate_clusters`]: lists and describes every cluster of a tenant
//! - [`enumerate_services`]: lists the services of a cluster and describes them
//!   in concurrent batches
//!
//! None of these retry; a failed remote call fails the enumeration it belongs to.

mod cluster;
mod pagination;
mod service;

use crate::config::{ExporterConfig, DEFAULT_PAGE_SIZE};
use crate::runtime::RequestLimit;

pub use cluster::enumerate_clusters;
pub use pagination::list_all;
pub use service::{enumerate_services, partition};

/// A cluster as described by the remote API.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cluster {
    /// Opaque identifier (the cluster ARN)
    pub id: String,
    /// Cluster name, used as the `ecsCluster` label
    pub name: String,
}

impl Cluster {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A service as described by the remote API. All counts are non-negative.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Service {
    /// Opaque identifier (the service ARN)
    pub id: String,
    /// Service name, used as the `service` label
    pub name: String,
    pub desired_tasks: i64,
    pub running_tasks: i64,
    pub pending_tasks: i64,
    /// Number of deployment records the service reports
    pub deployment_count: i64,
}

/// Settings shared by the enumerators of one scrape.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Page bound for list calls and the size of describe batches, at least 1
    pub page_bound: u32,
    /// Cap on in-flight remote calls
    pub limit: RequestLimit,
    /// Describe clusters in page-bound chunks instead of one call
    pub chunk_cluster_describes: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            page_bound: DEFAULT_PAGE_SIZE,
            limit: RequestLimit::unbounded(),
            chunk_cluster_describes: false,
        }
    }
}

impl ScanOptions {
    /// Options with the given page bound and no call limit.
    #[must_use]
    pub fn with_page_bound(page_bound: u32) -> Self {
        Self {
            page_bound: page_bound.max(1),
            ..Self::default()
        }
    }

    /// Set the call limit.
    #[must_use]
    pub fn with_limit(mut self, limit: RequestLimit) -> Self {
        self.limit = limit;
        self
    }

    /// Derive the options from the exporter configuration.
    #[must_use]
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            page_bound: config.page_size,
            limit: RequestLimit::from_setting(config.max_concurrent_requests),
            chunk_cluster_describes: config.chunk_cluster_describes,
        }
    }

    pub(crate) fn batch_size(&self) -> usize {
        self.page_bound as usize
    }
}
