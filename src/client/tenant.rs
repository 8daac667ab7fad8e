// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tenant identities and the interceptor that binds calls to one of them.

use std::fmt;

use tonic::metadata::{Ascii, MetadataValue};
use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::error::{ExporterError, Result};

/// Metadata key carrying the target region.
pub const REGION_METADATA_KEY: &str = "x-ecs-region";

/// Metadata key carrying the role the gateway should assume.
pub const ASSUME_ROLE_METADATA_KEY: &str = "x-ecs-assume-role";

/// One account reached through a (possibly assumed) role.
///
/// The island label is what shows up in the `island` metric label. An empty
/// role means the gateway's ambient credentials are used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TenantIdentity {
    island: String,
    role: String,
}

impl TenantIdentity {
    /// Create a tenant for `island` reached through `role`.
    #[must_use]
    pub fn new(island: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            island: island.into(),
            role: role.into(),
        }
    }

    /// The implicit tenant used when no roles are configured.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    /// Island label.
    #[must_use]
    pub fn island(&self) -> &str {
        &self.island
    }

    /// Role identifier, empty for ambient credentials.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Whether calls for this tenant use ambient credentials.
    #[must_use]
    pub fn uses_ambient_credentials(&self) -> bool {
        self.role.is_empty()
    }

    /// The role as request metadata, `None` for ambient credentials.
    ///
    /// The role is passed through opaquely; whether the gateway can assume it
    /// shows up on the first call.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Auth`] when the role cannot be carried as ASCII
    /// metadata.
    #[allow(clippy::result_large_err)]
    pub fn role_metadata(&self) -> Result<Option<MetadataValue<Ascii>>> {
        if self.uses_ambient_credentials() {
            return Ok(None);
        }
        self.role
            .parse::<MetadataValue<Ascii>>()
            .map(Some)
            .map_err(|e| self.auth_error(format!("invalid role metadata: {e}")))
    }

    pub(crate) fn auth_error(&self, reason: impl Into<String>) -> ExporterError {
        ExporterError::Auth {
            island: self.island.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TenantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.island.is_empty() {
            write!(f, "<default>")
        } else {
            write!(f, "{}", self.island)
        }
    }
}

/// Attaches region and assumed role to every request of one tenant.
#[derive(Clone)]
pub struct TenantInterceptor {
    region: MetadataValue<Ascii>,
    role: Option<MetadataValue<Ascii>>,
}

impl TenantInterceptor {
    /// Build the interceptor for `tenant` in `region`.
    ///
    /// # Errors
    ///
    /// Returns [`ExporterError::Auth`] if the region or the role cannot be
    /// carried as ASCII metadata.
    #[allow(clippy::result_large_err)]
    pub fn new(tenant: &TenantIdentity, region: &str) -> Result<Self> {
        let region = region
            .parse::<MetadataValue<Ascii>>()
            .map_err(|e| tenant.auth_error(format!("invalid region metadata: {e}")))?;
        let role = tenant.role_metadata()?;

        Ok(Self { region, role })
    }
}

impl Interceptor for TenantInterceptor {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        let metadata = request.metadata_mut();
        metadata.insert(REGION_METADATA_KEY, self.region.clone());
        if let Some(role) = &self.role {
            metadata.insert(ASSUME_ROLE_METADATA_KEY, role.clone());
        }
        Ok(request)
    }
}
