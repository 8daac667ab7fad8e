// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runtime support for the collector: retries, call limits and logging.

mod limit;
mod logging;
mod retry;

pub use limit::RequestLimit;
pub use logging::{init_logging, CallCounters, LogFormat, RequestLogger, RequestSpan};
pub use retry::{AsGrpcStatus, Backoff, NeverRetry, RetryConfig, RetryPolicy, TransientCodes};
