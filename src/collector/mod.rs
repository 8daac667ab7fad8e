// SPDX-License-Identifier: MIT OR Apache-2.0

//! The collection pipeline.
//!
//! An [`Exporter`] owns the immutable metric descriptors and an
//! [`Orchestrator`]. Each call to [`Exporter::collect`] runs one tenant worker
//! per tenant concurrently. A worker lists its clusters, emits `up` and
//! `clusters_total`, then scans every cluster's services in parallel.
//!
//! Failures stay in the smallest scope that can still report something:
//!
//! - no session for a tenant: the tenant emits nothing
//! - cluster listing fails: the tenant emits `up=0`
//! - a cluster's service scan fails: that cluster emits nothing
//!
//! Callers must not run two collections against the same sink at once; the
//! HTTP server serializes scrapes.
//!
//! # Example
//!
//! ```no_run
//! use ecs_exporter_rs::collector::Exporter;
//! use ecs_exporter_rs::config::ExporterConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExporterConfig::load_from_path("config.yaml")?;
//! let exporter = Exporter::from_config(&config)?;
//! print!("{}", exporter.render().await);
//! # Ok(())
//! # }
//! ```

mod orchestrator;
mod worker;

use std::sync::Arc;

use crate::client::{ClientFactory, GrpcClientConfig, GrpcClientFactory};
use crate::config::ExporterConfig;
use crate::error::Result;
use crate::metrics::{encode_text, MetricDescriptor, MetricDescriptors, MetricSample, MetricSink};
use crate::resources::ScanOptions;

pub use orchestrator::{Orchestrator, ScrapeSummary};
pub use worker::TenantOutcome;

/// Shared, read-only state of every worker in a scrape.
pub(crate) struct ScrapeContext {
    pub(crate) factory: Arc<dyn ClientFactory>,
    pub(crate) descriptors: Arc<MetricDescriptors>,
    pub(crate) region: String,
    pub(crate) options: ScanOptions,
}

/// Pull-style collector: static descriptors plus one collection per call.
pub struct Exporter {
    descriptors: Arc<MetricDescriptors>,
    orchestrator: Orchestrator,
}

impl Exporter {
    /// Build an exporter that obtains sessions from `factory`.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Config`](crate::error::ExporterError::Config)
    /// when the configuration does not validate.
    #[allow(clippy::result_large_err)]
    pub fn new(config: &ExporterConfig, factory: Arc<dyn ClientFactory>) -> Result<Self> {
        config.validate()?;

        let descriptors = Arc::new(MetricDescriptors::new(config.namespace.clone()));
        let ctx = Arc::new(ScrapeContext {
            factory,
            descriptors: descriptors.clone(),
            region: config.region()?.to_string(),
            options: ScanOptions::from_config(config),
        });

        Ok(Self {
            descriptors,
            orchestrator: Orchestrator::new(ctx, config.tenants(), config.scrape_timeout()),
        })
    }

    /// Build an exporter talking to the inventory gateway named in `config`.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration does not validate.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &ExporterConfig) -> Result<Self> {
        let factory = GrpcClientFactory::new(GrpcClientConfig::from_exporter_config(config)?);
        Self::new(config, Arc::new(factory))
    }

    /// The static metric descriptors, in exposition order.
    pub fn describe(&self) -> impl Iterator<Item = &MetricDescriptor> {
        self.descriptors.iter()
    }

    #[must_use]
    pub fn descriptors(&self) -> &Arc<MetricDescriptors> {
        &self.descriptors
    }

    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run one collection, streaming samples onto `sink` as they are produced.
    pub async fn collect(&self, sink: &MetricSink) -> ScrapeSummary {
        self.orchestrator.run(sink).await
    }

    /// Run one collection and return all of its samples.
    pub async fn scrape(&self) -> (Vec<MetricSample>, ScrapeSummary) {
        let (sink, receiver) = MetricSink::channel();
        let summary = self.collect(&sink).await;
        drop(sink);
        (receiver.collect_all().await, summary)
    }

    /// Run one collection and render it in the text exposition format.
    pub async fn render(&self) -> String {
        let (samples, _) = self.scrape().await;
        encode_text(&self.descriptors, &samples)
    }
}
