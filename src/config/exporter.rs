// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exporter configuration file parser

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::client::TenantIdentity;
use crate::error::{ExporterError, Result};

/// Default page bound for list calls and describe batches.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page bound the ECS list operations accept.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default metric namespace prefix.
pub const DEFAULT_NAMESPACE: &str = "ecs";

/// Default inventory gateway address.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:50051";

/// Exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExporterConfig {
    /// Island label to role ARN. Empty means a single anonymous tenant
    /// using ambient credentials.
    pub roles: BTreeMap<String, String>,

    /// Region to collect from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Inventory gateway URL (`http://` or `https://`)
    pub endpoint: String,

    /// CA bundle used to verify an `https://` gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_path: Option<PathBuf>,

    /// Page bound for list calls, also the describe batch size
    pub page_size: u32,

    /// Metric namespace prefix
    pub namespace: String,

    /// Global cap on in-flight remote calls; unset means unbounded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrent_requests: Option<usize>,

    /// Per-tenant collection deadline; unset means wait for completion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_timeout_secs: Option<u64>,

    /// Retries for transient remote failures (0 disables)
    pub max_retries: u32,

    /// Describe clusters in `page_size` chunks instead of a single call
    pub chunk_cluster_describes: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            roles: BTreeMap::new(),
            region: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            ca_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            namespace: DEFAULT_NAMESPACE.to_string(),
            max_concurrent_requests: None,
            scrape_timeout_secs: None,
            max_retries: 3,
            chunk_cluster_describes: false,
        }
    }
}

impl ExporterConfig {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file is malformed YAML
    #[allow(clippy::result_large_err)]
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            ExporterError::Config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    ///
    /// An empty document yields the defaults.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| ExporterError::Config(format!("Failed to parse config YAML: {}", e)))
    }

    /// Check the settings that cannot be expressed in the type.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Config`] when the region is missing, the page
    /// size is out of range, the namespace is not a valid metric name prefix
    /// or the endpoint is not an `http`/`https` URL.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        self.region()?;

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ExporterError::Config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }

        if !is_valid_namespace(&self.namespace) {
            return Err(ExporterError::Config(format!(
                "namespace '{}' is not a valid metric name prefix",
                self.namespace
            )));
        }

        let endpoint = url::Url::parse(&self.endpoint)
            .map_err(|e| ExporterError::Config(format!("Invalid endpoint URL: {e}")))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ExporterError::Config(format!(
                "endpoint scheme must be http or https, got '{}'",
                endpoint.scheme()
            )));
        }

        if self.max_concurrent_requests == Some(0) {
            return Err(ExporterError::Config(
                "max_concurrent_requests must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// The configured region.
    ///
    /// # Errors
    ///
    /// Returns an error when no non-empty region is configured.
    #[allow(clippy::result_large_err)]
    pub fn region(&self) -> Result<&str> {
        match self.region.as_deref() {
            Some(region) if !region.trim().is_empty() => Ok(region),
            _ => Err(ExporterError::Config(
                "Please supply a region".to_string(),
            )),
        }
    }

    /// Expand the role mapping into the tenants of one scrape.
    ///
    /// With no roles configured this is a single tenant with an empty island
    /// label and ambient credentials.
    pub fn tenants(&self) -> Vec<TenantIdentity> {
        if self.roles.is_empty() {
            return vec![TenantIdentity::anonymous()];
        }
        self.roles
            .iter()
            .map(|(island, role)| TenantIdentity::new(island.clone(), role.clone()))
            .collect()
    }

    /// Per-tenant collection deadline.
    pub fn scrape_timeout(&self) -> Option<Duration> {
        self.scrape_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        None => true,
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => chars
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':'),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CONFIG: &str = r#"
region: eu-west-1
endpoint: https://inventory.internal:8443
roles:
  blue: arn:aws:iam::111111111111:role/ecs-exporter
  green: arn:aws:iam::222222222222:role/ecs-exporter
page_size: 20
max_concurrent_requests: 8
scrape_timeout_secs: 25
chunk_cluster_describes: true
"#;

    #[test]
    fn test_parse_basic_config() {
        let config = ExporterConfig::from_yaml(SAMPLE_CONFIG).unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.roles.len(), 2);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.namespace, "ecs");
        assert_eq!(config.max_concurrent_requests, Some(8));
        assert_eq!(config.scrape_timeout(), Some(Duration::from_secs(25)));
        assert!(config.chunk_cluster_describes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_roles_only_config() {
        let config = ExporterConfig::from_yaml(
            r#"
roles:
  blue: arn:aws:iam::111111111111:role/a
"#,
        )
        .unwrap();

        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.max_retries, 3);
        assert!(config.region.is_none());
    }

    #[test]
    fn test_empty_document_is_default() {
        let config = ExporterConfig::from_yaml("  \n").unwrap();
        assert_eq!(config, ExporterConfig::default());
    }

    #[test]
    fn test_unknown_key_rejected() {
        let result = ExporterConfig::from_yaml("rolez: {}\n");
        assert!(matches!(result, Err(ExporterError::Config(_))));
    }

    #[test]
    fn test_tenants_without_roles() {
        let config = ExporterConfig::default();
        let tenants = config.tenants();

        assert_eq!(tenants.len(), 1);
        assert_eq!(tenants[0].island(), "");
        assert!(tenants[0].uses_ambient_credentials());
    }

    #[test]
    fn test_tenants_from_roles() {
        let config = ExporterConfig::from_yaml(SAMPLE_CONFIG).unwrap();
        let tenants = config.tenants();

        let islands: Vec<&str> = tenants.iter().map(|t| t.island()).collect();
        assert_eq!(islands, vec!["blue", "green"]);
        assert_eq!(
            tenants[1].role(),
            "arn:aws:iam::222222222222:role/ecs-exporter"
        );
    }

    #[test]
    fn test_validate_requires_region() {
        let config = ExporterConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_validate_page_size_bounds() {
        let mut config = ExporterConfig {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        config.page_size = 0;
        assert!(config.validate().is_err());

        config.page_size = MAX_PAGE_SIZE + 1;
        assert!(config.validate().is_err());

        config.page_size = MAX_PAGE_SIZE;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_namespace() {
        let mut config = ExporterConfig {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        config.namespace = "".to_string();
        assert!(config.validate().is_ok());

        config.namespace = "aws_ecs".to_string();
        assert!(config.validate().is_ok());

        config.namespace = "9ecs".to_string();
        assert!(config.validate().is_err());

        config.namespace = "ecs-exporter".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_endpoint() {
        let mut config = ExporterConfig {
            region: Some("us-east-1".to_string()),
            ..Default::default()
        };

        config.endpoint = "not a url".to_string();
        assert!(config.validate().is_err());

        config.endpoint = "ftp://inventory:21".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_timeout_disables_deadline() {
        let config = ExporterConfig {
            scrape_timeout_secs: Some(0),
            ..Default::default()
        };
        assert_eq!(config.scrape_timeout(), None);
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE_CONFIG.as_bytes()).unwrap();

        let config = ExporterConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.roles.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let result = ExporterConfig::load_from_path("/nonexistent/ecs-exporter-12345.yaml");
        match result {
            Err(ExporterError::Config(msg)) => assert!(msg.contains("Failed to read config file")),
            other => panic!("Expected Config error, got {other:?}"),
        }
    }
}
