// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus exporter for ECS cluster and service inventory.
//!
//! The exporter enumerates clusters and services for one or more tenants
//! ("islands", each reached through an assumed role) and turns them into
//! gauges: `up`, `clusters_total`, `services_total` and per-service desired,
//! pending and running task counts and deployment counts.

pub mod api;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod metrics;
pub mod resources;
pub mod runtime;
pub mod server;
pub mod testkit;

pub use client::{ClientFactory, ClientHandle, InventoryApi, TenantIdentity};
pub use collector::{Exporter, ScrapeSummary, TenantOutcome};
pub use config::ExporterConfig;
pub use error::{ExporterError, Result};
pub use metrics::{Metric, MetricDescriptors, MetricSample, MetricSink};
pub use resources::{Cluster, Service};
