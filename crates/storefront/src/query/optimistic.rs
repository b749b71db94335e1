//! Optimistic mutation with rollback.

use std::future::Future;

use super::{QueryCache, QueryData, QueryKey};

/// Apply an expected value to `key`, then reconcile with the server.
///
/// 1. Snapshot the current entry (possibly absent).
/// 2. Write `optimistic(current)` to the cache if it yields a value.
/// 3. Await `request`.
/// 4. On success, cache the server's value; on failure, restore the snapshot
///    exactly, including removing the key if it was absent.
/// 5. Mark the key stale either way.
///
/// # Errors
///
/// Returns the request's error after rolling back.
pub async fn mutate_optimistically<T, E, Fut>(
    cache: &QueryCache,
    key: QueryKey,
    optimistic: impl FnOnce(Option<T>) -> Option<T>,
    request: Fut,
) -> Result<T, E>
where
    T: Into<QueryData> + TryFrom<QueryData> + Clone,
    Fut: Future<Output = Result<T, E>>,
{
    let snapshot = cache.entry(key).await;

    let current = snapshot
        .clone()
        .and_then(|entry| T::try_from(entry.data).ok());
    if let Some(expected) = optimistic(current) {
        cache.set(key, expected).await;
    }

    let result = request.await;

    match &result {
        Ok(confirmed) => cache.set(key, confirmed.clone()).await,
        Err(_) => {
            tracing::debug!(key = %key, "Rolling back optimistic update");
            cache.restore(key, snapshot).await;
        }
    }

    cache.invalidate(key).await;
    result
}
