// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global cap on in-flight remote calls.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared limit on concurrent remote calls across all tenants of a scrape.
///
/// A permit covers exactly one remote call. Tasks never hold a permit while
/// waiting on other tasks, so a cap of one still completes.
#[derive(Debug, Clone, Default)]
pub struct RequestLimit {
    semaphore: Option<Arc<Semaphore>>,
}

impl RequestLimit {
    /// No cap.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// At most `max_in_flight` calls at once. Zero is treated as one.
    #[must_use]
    pub fn new(max_in_flight: usize) -> Self {
        Self {
            semaphore: Some(Arc::new(Semaphore::new(max_in_flight.max(1)))),
        }
    }

    /// Build from an optional setting; `None` means unbounded.
    #[must_use]
    pub fn from_setting(max_in_flight: Option<usize>) -> Self {
        max_in_flight.map_or_else(Self::unbounded, Self::new)
    }

    #[must_use]
    pub fn is_bounded(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Permits currently free, `None` when unbounded.
    #[must_use]
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|s| s.available_permits())
    }

    /// Wait for a slot. The returned guard releases it on drop.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        match &self.semaphore {
            // the semaphore is never closed
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        }
    }
}
