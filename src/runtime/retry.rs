// SPDX-License-Identifier: MIT OR Apache-2.0

//! Retries for remote inventory calls.
//!
//! Every call the gRPC inventory client makes goes through a [`RetryConfig`].
//! The enumerators above it never retry, so a call that still fails here fails
//! its whole enumeration.
//!
//! ```
//! use ecs_exporter_rs::runtime::{Backoff, RetryConfig};
//! use std::time::Duration;
//!
//! let retry = RetryConfig::new(3)
//!     .with_backoff(Backoff::exponential(Duration::from_millis(50)).capped_at(Duration::from_secs(2)))
//!     .with_budget(Some(Duration::from_secs(10)));
//! assert_eq!(retry.max_retries(), 3);
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::ExporterError;

/// Decides from a gRPC code whether a failed call is repeated.
pub trait RetryPolicy: Clone + Send + Sync + 'static {
    fn should_retry(&self, code: tonic::Code) -> bool;
}

/// Repeats throttled calls and calls the gateway could not serve right now.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientCodes;

impl RetryPolicy for TransientCodes {
    fn should_retry(&self, code: tonic::Code) -> bool {
        matches!(
            code,
            tonic::Code::Unavailable
                | tonic::Code::ResourceExhausted
                | tonic::Code::DeadlineExceeded
                | tonic::Code::Aborted
        )
    }
}

/// Fails on the first error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn should_retry(&self, _code: tonic::Code) -> bool {
        false
    }
}

/// Wait between two attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    /// Retry right away.
    Immediate,
    /// `base * 2^attempt`, never more than `cap`, plus up to 25% when `jitter` is set.
    Exponential {
        base: Duration,
        cap: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Doubling delays from `base`, capped at five seconds, with jitter.
    #[must_use]
    pub fn exponential(base: Duration) -> Self {
        Backoff::Exponential {
            base,
            cap: Duration::from_secs(5),
            jitter: true,
        }
    }

    #[must_use]
    pub fn capped_at(self, cap: Duration) -> Self {
        match self {
            Backoff::Exponential { base, jitter, .. } => Backoff::Exponential { base, cap, jitter },
            other => other,
        }
    }

    #[must_use]
    pub fn without_jitter(self) -> Self {
        match self {
            Backoff::Exponential { base, cap, .. } => Backoff::Exponential {
                base,
                cap,
                jitter: false,
            },
            other => other,
        }
    }

    /// Delay before retry number `attempt`, counting from zero.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Immediate => Duration::ZERO,
            Backoff::Exponential { base, cap, jitter } => {
                let delay = base.saturating_mul(2u32.saturating_pow(attempt)).min(cap);
                if jitter {
                    // deterministic spread of at most 25%
                    let spread = (f64::from(attempt) * 0.7).sin().abs() * 0.25;
                    delay + delay.mul_f64(spread)
                } else {
                    delay
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::exponential(Duration::from_millis(100))
    }
}

/// How often, how long and on which codes a remote call is repeated.
#[derive(Debug, Clone)]
pub struct RetryConfig<P: RetryPolicy = TransientCodes> {
    max_retries: u32,
    backoff: Backoff,
    budget: Option<Duration>,
    policy: P,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

impl RetryConfig {
    /// Up to `max_retries` retries of transient failures within 20 seconds.
    /// Zero disables retries.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::default(),
            budget: Some(Duration::from_secs(20)),
            policy: TransientCodes,
        }
    }
}

impl<P: RetryPolicy> RetryConfig<P> {
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Stop retrying once this much time has passed since the first attempt.
    #[must_use]
    pub fn with_budget(mut self, budget: Option<Duration>) -> Self {
        self.budget = budget;
        self
    }

    #[must_use]
    pub fn with_policy<Q: RetryPolicy>(self, policy: Q) -> RetryConfig<Q> {
        RetryConfig {
            max_retries: self.max_retries,
            backoff: self.backoff,
            budget: self.budget,
            policy,
        }
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Run `call` until it succeeds, fails with a code the policy does not
    /// retry, or the retries or the time budget are used up.
    pub async fn execute<T, E, F, Fut>(&self, mut call: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: AsGrpcStatus,
    {
        let started = Instant::now();
        let mut retries = 0;

        loop {
            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let code = err.grpc_code();
            let out_of_budget = self.budget.is_some_and(|budget| started.elapsed() >= budget);
            if retries >= self.max_retries || out_of_budget || !self.policy.should_retry(code) {
                return Err(err);
            }

            let delay = self.backoff.delay_for(retries);
            retries += 1;
            debug!(?code, retry = retries, ?delay, "retrying remote call");
            tokio::time::sleep(delay).await;
        }
    }
}

/// Errors that carry a gRPC status code.
pub trait AsGrpcStatus {
    fn grpc_code(&self) -> tonic::Code;
}

impl AsGrpcStatus for tonic::Status {
    fn grpc_code(&self) -> tonic::Code {
        self.code()
    }
}

impl AsGrpcStatus for ExporterError {
    fn grpc_code(&self) -> tonic::Code {
        match self {
            ExporterError::UpstreamList { source, .. }
            | ExporterError::UpstreamDescribe { source, .. } => source.code(),
            ExporterError::PartialBatch { source, .. } => source.grpc_code(),
            ExporterError::Transport(_) | ExporterError::Io(_) => tonic::Code::Unavailable,
            ExporterError::Config(_) => tonic::Code::InvalidArgument,
            ExporterError::Auth { .. } => tonic::Code::Unauthenticated,
            ExporterError::Unknown(_) => tonic::Code::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn immediate(max_retries: u32) -> RetryConfig {
        RetryConfig::new(max_retries).with_backoff(Backoff::Immediate)
    }

    async fn failing_n_times(calls: &AtomicU32, failures: u32, status: fn() -> tonic::Status) -> Result<u32, tonic::Status> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(status())
        } else {
            Ok(n)
        }
    }

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let backoff = Backoff::exponential(Duration::from_millis(100))
            .capped_at(Duration::from_millis(1000))
            .without_jitter();

        let delays: Vec<u128> = (0..6).map(|a| backoff.delay_for(a).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
        assert_eq!(Backoff::Immediate.delay_for(4), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let backoff = Backoff::exponential(Duration::from_millis(200)).capped_at(Duration::from_millis(400));
        for attempt in 0..10 {
            let plain = backoff.without_jitter().delay_for(attempt);
            let jittered = backoff.delay_for(attempt);
            assert!(jittered >= plain);
            assert!(jittered <= plain.mul_f64(1.25));
        }
    }

    #[test]
    fn test_transient_codes() {
        for code in [
            tonic::Code::Unavailable,
            tonic::Code::ResourceExhausted,
            tonic::Code::DeadlineExceeded,
        ] {
            assert!(TransientCodes.should_retry(code), "{code:?}");
        }
        for code in [
            tonic::Code::PermissionDenied,
            tonic::Code::Unauthenticated,
            tonic::Code::InvalidArgument,
            tonic::Code::NotFound,
        ] {
            assert!(!TransientCodes.should_retry(code), "{code:?}");
        }
        assert!(!NeverRetry.should_retry(tonic::Code::Unavailable));
    }

    #[test]
    fn test_exporter_error_codes() {
        let throttled = ExporterError::list("ListServices", tonic::Status::resource_exhausted("Rate exceeded"));
        assert_eq!(throttled.grpc_code(), tonic::Code::ResourceExhausted);

        let partial = ExporterError::PartialBatch {
            cluster: "prod".to_string(),
            batch: 1,
            total: 2,
            source: Box::new(throttled),
        };
        assert_eq!(partial.grpc_code(), tonic::Code::ResourceExhausted);

        let auth = ExporterError::Auth {
            island: "blue".to_string(),
            reason: "denied".to_string(),
        };
        assert_eq!(auth.grpc_code(), tonic::Code::Unauthenticated);
    }

    #[tokio::test]
    async fn test_throttled_call_succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let result = immediate(3)
            .execute(|| failing_n_times(&calls, 2, || tonic::Status::resource_exhausted("Rate exceeded")))
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let calls = AtomicU32::new(0);
        let result = immediate(2)
            .execute(|| failing_n_times(&calls, u32::MAX, || tonic::Status::unavailable("gateway restarting")))
            .await;

        assert_eq!(result.unwrap_err().code(), tonic::Code::Unavailable);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_zero_retries_and_permanent_codes_fail_at_once() {
        let calls = AtomicU32::new(0);
        let result = immediate(0)
            .execute(|| failing_n_times(&calls, u32::MAX, || tonic::Status::unavailable("down")))
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let calls = AtomicU32::new(0);
        let result = immediate(5)
            .execute(|| failing_n_times(&calls, u32::MAX, || tonic::Status::permission_denied("not authorized to assume role")))
            .await;
        assert_eq!(result.unwrap_err().code(), tonic::Code::PermissionDenied);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_budget_stops_retries() {
        let calls = AtomicU32::new(0);
        let result = immediate(10)
            .with_budget(Some(Duration::ZERO))
            .execute(|| failing_n_times(&calls, u32::MAX, || tonic::Status::unavailable("down")))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_never_retry_policy() {
        let calls = AtomicU32::new(0);
        let result = immediate(3)
            .with_policy(NeverRetry)
            .execute(|| failing_n_times(&calls, u32::MAX, || tonic::Status::unavailable("down")))
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
