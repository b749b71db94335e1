//! Server-state query cache.
//!
//! Caches the last known server value for each logical resource
//! ([`QueryKey`]) together with when it was fetched. A value is fresh for
//! the key's staleness window unless explicitly invalidated; stale values
//! stay readable but the next [`QueryCache::fetch`] goes to the server.
//! Entries untouched for the gc window are evicted entirely.
//!
//! Writes through [`QueryCache::set`] are visible immediately to every
//! clone of the cache, which is what optimistic updates rely on.

mod optimistic;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;

pub use optimistic::mutate_optimistically;

use crate::backend::{BackendError, Cart, Identity};
use crate::config::QueryConfig;
use crate::stores::WishlistItem;

/// Upper bound for a single retry delay.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Logical server resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Cart,
    Wishlist,
    AuthSession,
}

impl QueryKey {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cart => "cart",
            Self::Wishlist => "wishlist",
            Self::AuthSession => "auth-session",
        }
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cached server data.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Cart(Box<Cart>),
    Wishlist(Vec<WishlistItem>),
    Session(Box<Identity>),
}

macro_rules! query_data {
    ($variant:ident, $ty:ty) => {
        impl From<$ty> for QueryData {
            fn from(value: $ty) -> Self {
                Self::$variant(value)
            }
        }

        impl TryFrom<QueryData> for $ty {
            type Error = QueryData;

            fn try_from(data: QueryData) -> Result<Self, Self::Error> {
                match data {
                    QueryData::$variant(value) => Ok(value),
                    other => Err(other),
                }
            }
        }
    };
    (boxed $variant:ident, $ty:ty) => {
        impl From<$ty> for QueryData {
            fn from(value: $ty) -> Self {
                Self::$variant(Box::new(value))
            }
        }

        impl TryFrom<QueryData> for $ty {
            type Error = QueryData;

            fn try_from(data: QueryData) -> Result<Self, Self::Error> {
                match data {
                    QueryData::$variant(value) => Ok(*value),
                    other => Err(other),
                }
            }
        }
    };
}

query_data!(boxed Cart, Cart);
query_data!(Wishlist, Vec<WishlistItem>);
query_data!(boxed Session, Identity);

/// A cache entry.
#[derive(Debug, Clone)]
pub struct CachedValue {
    pub data: QueryData,
    pub updated_at: Instant,
    pub invalidated: bool,
}

impl CachedValue {
    fn new(data: QueryData) -> Self {
        Self {
            data,
            updated_at: Instant::now(),
            invalidated: false,
        }
    }

    /// Whether the value can be served without refetching.
    #[must_use]
    pub fn is_fresh(&self, stale_time: Duration) -> bool {
        !self.invalidated && self.updated_at.elapsed() < stale_time
    }
}

/// Shared query cache. Cheap to clone.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<QueryCacheInner>,
}

struct QueryCacheInner {
    entries: Cache<QueryKey, CachedValue>,
    config: QueryConfig,
}

impl QueryCache {
    #[must_use]
    pub fn new(config: QueryConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(16)
            .time_to_idle(config.gc_time)
            .build();

        Self {
            inner: Arc::new(QueryCacheInner { entries, config }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &QueryConfig {
        &self.inner.config
    }

    /// Staleness window for `key`.
    #[must_use]
    pub fn stale_time(&self, key: QueryKey) -> Duration {
        let config = &self.inner.config;
        match key {
            QueryKey::Cart => config.cart_stale,
            QueryKey::Wishlist => config.wishlist_stale,
            QueryKey::AuthSession => config.session_stale,
        }
    }

    /// Raw entry, fresh or stale.
    pub async fn entry(&self, key: QueryKey) -> Option<CachedValue> {
        self.inner.entries.get(&key).await
    }

    /// Cached value, fresh or stale.
    pub async fn get<T: TryFrom<QueryData>>(&self, key: QueryKey) -> Option<T> {
        let entry = self.entry(key).await?;
        T::try_from(entry.data).ok()
    }

    /// Whether `key` holds a value inside its staleness window.
    pub async fn is_fresh(&self, key: QueryKey) -> bool {
        self.entry(key)
            .await
            .is_some_and(|entry| entry.is_fresh(self.stale_time(key)))
    }

    /// Store a value as freshly fetched.
    pub async fn set(&self, key: QueryKey, value: impl Into<QueryData>) {
        self.inner
            .entries
            .insert(key, CachedValue::new(value.into()))
            .await;
    }

    /// Put back an entry captured by [`Self::entry`], or remove the key if
    /// there was none.
    pub async fn restore(&self, key: QueryKey, snapshot: Option<CachedValue>) {
        match snapshot {
            Some(entry) => self.inner.entries.insert(key, entry).await,
            None => self.inner.entries.invalidate(&key).await,
        }
    }

    /// Mark `key` stale, keeping its data readable.
    pub async fn invalidate(&self, key: QueryKey) {
        if let Some(mut entry) = self.entry(key).await {
            entry.invalidated = true;
            self.inner.entries.insert(key, entry).await;
        }
    }

    /// Drop `key` entirely.
    pub async fn remove(&self, key: QueryKey) {
        self.inner.entries.invalidate(&key).await;
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.inner.entries.invalidate_all();
    }

    /// Serve `key` from cache if fresh, otherwise run `fetcher` and cache the
    /// result.
    ///
    /// Retryable failures (network, 5xx, 429) are retried up to
    /// `max_retries` times with exponential backoff. On final failure the
    /// previous entry is left as it was.
    ///
    /// # Errors
    ///
    /// Returns the last fetch error.
    pub async fn fetch<T, F, Fut>(&self, key: QueryKey, mut fetcher: F) -> Result<T, BackendError>
    where
        T: Into<QueryData> + TryFrom<QueryData> + Clone,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        if let Some(entry) = self.entry(key).await
            && entry.is_fresh(self.stale_time(key))
            && let Ok(value) = T::try_from(entry.data)
        {
            tracing::trace!(key = %key, "Query cache hit");
            return Ok(value);
        }

        let max_retries = self.inner.config.max_retries;
        let mut retries = 0;

        loop {
            match fetcher().await {
                Ok(value) => {
                    self.set(key, value.clone()).await;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        BackendError::RateLimited(Some(retry_after)) => *retry_after,
                        _ => self
                            .inner
                            .config
                            .retry_base_delay
                            .saturating_mul(2_u32.saturating_pow(retries)),
                    };
                    let backoff = backoff.min(MAX_RETRY_DELAY);

                    tracing::warn!(
                        key = %key,
                        error = %e,
                        retry = retries,
                        max_retries,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Retrying query"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
