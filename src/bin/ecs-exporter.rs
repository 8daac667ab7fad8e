// SPDX-License-Identifier: MIT OR Apache-2.0

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use ecs_exporter_rs::config::ExporterConfig;
use ecs_exporter_rs::runtime::{init_logging, LogFormat};
use ecs_exporter_rs::server::{self, MetricsService, DEFAULT_LISTEN_ADDRESS, DEFAULT_TELEMETRY_PATH};
use ecs_exporter_rs::Exporter;

#[derive(Parser, Debug)]
#[command(name = "ecs-exporter", version, about = "Prometheus exporter for ECS clusters and services")]
struct Cli {
    /// The path where metrics will be exposed
    #[arg(long = "web.telemetry-path", env = "ECS_EXPORTER_TELEMETRY_PATH", default_value = DEFAULT_TELEMETRY_PATH)]
    telemetry_path: String,

    /// Address to listen on
    #[arg(long = "web.listen-address", env = "ECS_EXPORTER_LISTEN_ADDRESS", default_value = DEFAULT_LISTEN_ADDRESS)]
    listen_address: String,

    /// The region to get metrics from
    #[arg(long = "aws.region", env = "AWS_REGION")]
    region: Option<String>,

    /// Config file path
    #[arg(long, env = "ECS_EXPORTER_CONFIG")]
    config: Option<PathBuf>,

    /// Run exporter in debug mode
    #[arg(long)]
    debug: bool,

    /// Inventory gateway URL
    #[arg(long, env = "ECS_EXPORTER_ENDPOINT")]
    endpoint: Option<String>,

    /// Page bound for list calls and describe batches
    #[arg(long)]
    page_size: Option<u32>,

    /// Metric namespace prefix
    #[arg(long)]
    namespace: Option<String>,

    /// Log output format (json or text)
    #[arg(long, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

impl Cli {
    /// File configuration with command line values applied on top.
    fn exporter_config(&self) -> Result<ExporterConfig> {
        let mut config = match &self.config {
            Some(path) => ExporterConfig::load_from_path(path)
                .with_context(|| format!("Error getting config file {}", path.display()))?,
            None => ExporterConfig::default(),
        };

        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(page_size) = self.page_size {
            config.page_size = page_size;
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_format).context("failed to initialize logging")?;

    let config = cli.exporter_config()?;
    let address: SocketAddr = cli
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address '{}'", cli.listen_address))?;

    let exporter = Exporter::from_config(&config)?;
    info!(
        region = config.region.as_deref().unwrap_or_default(),
        endpoint = %config.endpoint,
        tenants = exporter.orchestrator().tenants().len(),
        "starting ecs exporter"
    );

    let service = Arc::new(MetricsService::new(Arc::new(exporter), cli.telemetry_path));
    server::serve(address, service, shutdown_signal()).await?;
    Ok(())
}
