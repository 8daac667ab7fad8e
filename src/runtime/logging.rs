// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process logging setup and per-call request logging.
//!
//! [`init_logging`] installs the global `tracing` subscriber. The filter comes
//! from `RUST_LOG` when set; otherwise `info`, or `debug` with the debug flag.
//!
//! [`RequestLogger`] records timing and outcome of each remote call under the
//! `ecs_exporter::grpc` target.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const GRPC_TARGET: &str = "ecs_exporter::grpc";

/// Output format of the process log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human readable lines.
    Text,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Json => write!(f, "json"),
            LogFormat::Text => write!(f, "text"),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "plain" => Ok(LogFormat::Text),
            other => Err(format!("unknown log format '{other}', expected json or text")),
        }
    }
}

fn default_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "debug,h2=info,hyper=info,tower=info" } else { "info" })
    })
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber was already installed.
pub fn init_logging(
    debug: bool,
    format: LogFormat,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    let registry = tracing_subscriber::registry().with(default_filter(debug));
    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    }
}

/// Call counters kept by a [`RequestLogger`].
#[derive(Debug, Default)]
pub struct CallCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl CallCounters {
    /// Calls that returned a response.
    #[must_use]
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Calls that ended in an error after retries.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// All finished calls.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.succeeded() + self.failed()
    }
}

/// Logs timing and outcome of remote calls.
#[derive(Debug, Default)]
pub struct RequestLogger {
    counters: CallCounters,
}

impl RequestLogger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn counters(&self) -> &CallCounters {
        &self.counters
    }

    /// Start tracking a call.
    #[must_use]
    pub fn start(&self, method: &'static str) -> RequestSpan {
        RequestSpan {
            method,
            start: Instant::now(),
        }
    }

    /// Finish a call that returned a response.
    pub fn finish_success(&self, span: RequestSpan) {
        self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        debug!(
            target: GRPC_TARGET,
            method = span.method,
            elapsed_ms = span.elapsed().as_millis() as u64,
            "call completed"
        );
    }

    /// Finish a call that failed.
    pub fn finish_error(&self, span: RequestSpan, error: &str) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        warn!(
            target: GRPC_TARGET,
            method = span.method,
            elapsed_ms = span.elapsed().as_millis() as u64,
            error,
            "call failed"
        );
    }
}

/// An in-flight call.
#[derive(Debug)]
pub struct RequestSpan {
    method: &'static str,
    start: Instant,
}

impl RequestSpan {
    #[must_use]
    pub fn method(&self) -> &'static str {
        self.method
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
