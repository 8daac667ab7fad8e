// SPDX-License-Identifier: MIT OR Apache-2.0

use thiserror::Error;

#[allow(clippy::result_large_err)]
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Credentials for a tenant could not be established.
    #[error("Authentication error for island '{island}': {reason}")]
    Auth { island: String, reason: String },

    #[error("{operation} failed: {source}")]
    UpstreamList {
        operation: &'static str,
        #[source]
        source: tonic::Status,
    },

    #[error("{operation} failed: {source}")]
    UpstreamDescribe {
        operation: &'static str,
        #[source]
        source: tonic::Status,
    },

    /// A describe batch failed; the merged result for the cluster is incomplete.
    #[error("describe batch {batch} of {total} failed on cluster '{cluster}': {source}")]
    PartialBatch {
        cluster: String,
        batch: usize,
        total: usize,
        #[source]
        source: Box<ExporterError>,
    },

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ExporterError {
    /// Shorthand for a failed list call.
    pub fn list(operation: &'static str, source: tonic::Status) -> Self {
        Self::UpstreamList { operation, source }
    }

    /// Shorthand for a failed describe call.
    pub fn describe(operation: &'static str, source: tonic::Status) -> Self {
        Self::UpstreamDescribe { operation, source }
    }

    /// The upstream status behind this error, if it came from a remote call.
    pub fn upstream_status(&self) -> Option<&tonic::Status> {
        match self {
            Self::UpstreamList { source, .. } | Self::UpstreamDescribe { source, .. } => {
                Some(source)
            }
            Self::PartialBatch { source, .. } => source.upstream_status(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_batch_message() {
        let err = ExporterError::PartialBatch {
            cluster: "prod".to_string(),
            batch: 2,
            total: 3,
            source: Box::new(ExporterError::describe(
                "DescribeServices",
                tonic::Status::unavailable("throttled"),
            )),
        };

        let msg = err.to_string();
        assert!(msg.contains("batch 2 of 3"));
        assert!(msg.contains("'prod'"));
        assert_eq!(
            err.upstream_status().map(|s| s.code()),
            Some(tonic::Code::Unavailable)
        );
    }

    #[test]
    fn test_auth_has_no_upstream_status() {
        let err = ExporterError::Auth {
            island: "blue".to_string(),
            reason: "bad role".to_string(),
        };
        assert!(err.upstream_status().is_none());
        assert!(err.to_string().contains("'blue'"));
    }
}
