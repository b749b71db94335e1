//! Pending/error status for user-triggered operations.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;

/// Observable status of a service's operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionStatus {
    /// At least one operation is in flight.
    pub pending: bool,
    /// User-facing message from the most recent failure, cleared when the
    /// next operation starts.
    pub error: Option<String>,
}

#[derive(Debug, Default)]
struct Counters {
    in_flight: u32,
    error: Option<String>,
}

/// Tracks in-flight operations and the last failure for one service.
#[derive(Debug, Default)]
pub struct ActionState {
    inner: Mutex<Counters>,
}

impl ActionState {
    #[must_use]
    pub fn status(&self) -> ActionStatus {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        ActionStatus {
            pending: inner.in_flight > 0,
            error: inner.error.clone(),
        }
    }

    /// Run `operation`, marking the service pending until it finishes and
    /// recording its error message on failure.
    pub async fn track<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let guard = self.begin();
        let result = operation.await;
        if let Err(e) = &result {
            e.report();
            guard.fail(e.user_message());
        }
        result
    }

    fn begin(&self) -> PendingGuard<'_> {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.in_flight += 1;
        inner.error = None;
        PendingGuard { state: self }
    }
}

/// Decrements the in-flight count when dropped, including when the
/// tracked future is dropped mid-flight.
struct PendingGuard<'a> {
    state: &'a ActionState,
}

impl PendingGuard<'_> {
    fn fail(&self, message: String) {
        self.state
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .error = Some(message);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self
            .state
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }
}
