// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for the exporter.
//!
//! The configuration file is YAML. Only `roles` is required for multi-account
//! collection; every other key has a default and most can be overridden on the
//! command line.
//!
//! ```yaml
//! region: eu-west-1
//! endpoint: http://127.0.0.1:50051
//! roles:
//!   blue: arn:aws:iam::111111111111:role/ecs-exporter
//!   green: arn:aws:iam::222222222222:role/ecs-exporter
//! ```
//!
//! # Environment Variables
//!
//! - `ECS_EXPORTER_CONFIG` - Path to the configuration file when `--config` is not given
//! - `AWS_REGION` - Region when `--aws.region` is not given
//!
//! # Example
//!
//! ```no_run
//! use ecs_exporter_rs::config::ExporterConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ExporterConfig::load_from_path("/etc/ecs-exporter/config.yaml")?;
//! for tenant in config.tenants() {
//!     println!("island {:?} via {:?}", tenant.island(), tenant.role());
//! }
//! # Ok(())
//! # }
//! ```

mod exporter;

pub use exporter::{
    ExporterConfig, DEFAULT_ENDPOINT, DEFAULT_NAMESPACE, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
