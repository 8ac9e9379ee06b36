//! Cache orchestration: lookup, single-flight fetch on miss, cleanup on failure

use crate::error::{FetchError, Result, ServeError};
use crate::fetcher::UpstreamFetcher;
use crate::key::{SymbolKey, UpstreamLocation};
use crate::store::LocalStore;
use crate::types::{CacheOrigin, CacheStats, CachedSymbol, SymbolCacheConfig};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Bytes written on success, shared by every requester of a key
type FetchResult = std::result::Result<u64, FetchError>;
type InFlightFetch = Shared<BoxFuture<'static, FetchResult>>;

/// Symbol file cache backed by a local directory and an upstream server.
///
/// Cheap to clone; clones share the same in-flight map and counters.
#[derive(Clone)]
pub struct SymbolCache {
    inner: Arc<Inner>,
}

struct Inner {
    store: LocalStore,
    fetcher: UpstreamFetcher,
    upstream_url: String,
    /// At most one download per key; entries are removed when it finishes
    in_flight: Mutex<HashMap<SymbolKey, InFlightFetch>>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetches: AtomicU64,
    fetch_failures: AtomicU64,
    coalesced: AtomicU64,
}

impl SymbolCache {
    /// Create a new symbol cache
    pub fn new(config: SymbolCacheConfig) -> Result<Self> {
        let fetcher = UpstreamFetcher::new(&config)?;
        Ok(Self::with_fetcher(config, fetcher))
    }

    /// Create a symbol cache around an existing fetcher
    pub fn with_fetcher(config: SymbolCacheConfig, fetcher: UpstreamFetcher) -> Self {
        Self {
            inner: Arc::new(Inner {
                store: LocalStore::new(config.storage_root),
                fetcher,
                upstream_url: config.upstream_url.trim_end_matches('/').to_string(),
                in_flight: Mutex::new(HashMap::new()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
                fetches: AtomicU64::new(0),
                fetch_failures: AtomicU64::new(0),
                coalesced: AtomicU64::new(0),
            }),
        }
    }

    /// Initialize the cache by ensuring the storage root exists
    pub async fn init(&self) -> Result<()> {
        self.inner.store.init().await?;
        Ok(())
    }

    pub fn upstream_url(&self) -> &str {
        &self.inner.upstream_url
    }

    /// Serve a symbol file by name and hash, downloading it on a miss
    pub async fn serve(
        &self,
        name: &str,
        hash: &str,
    ) -> std::result::Result<CachedSymbol, ServeError> {
        let key = SymbolKey::new(name, hash).inspect_err(|e| {
            debug!(name, hash, error = %e, "Rejected symbol key");
        })?;
        self.serve_key(&key).await
    }

    /// Serve a symbol file for an already validated key
    pub async fn serve_key(
        &self,
        key: &SymbolKey,
    ) -> std::result::Result<CachedSymbol, ServeError> {
        let paths = key.resolve();
        let dest = self.inner.store.path_for(&paths);

        if self.inner.store.exists(&dest).await {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Cache hit");
            return self.open(key, &dest, CacheOrigin::Hit).await;
        }

        self.inner.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = %key, "Cache miss");

        let fetch = self.join_or_start_fetch(key);
        match fetch.await {
            Ok(_) => self.open(key, &dest, CacheOrigin::Fetched).await,
            Err(_) => Err(ServeError::NotFound),
        }
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            fetches: self.inner.fetches.load(Ordering::Relaxed),
            fetch_failures: self.inner.fetch_failures.load(Ordering::Relaxed),
            coalesced: self.inner.coalesced.load(Ordering::Relaxed),
        }
    }

    /// Attach to the key's running download, or spawn one.
    ///
    /// The download runs in its own task so it completes and populates the
    /// store even if every requester goes away.
    fn join_or_start_fetch(&self, key: &SymbolKey) -> InFlightFetch {
        let mut in_flight = self.inner.in_flight();

        if let Some(fetch) = in_flight.get(key) {
            self.inner.coalesced.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "Joining in-flight fetch");
            return fetch.clone();
        }

        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        let handle = tokio::spawn(async move { inner.populate(task_key).await });

        let fetch = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string())))
        }
        .boxed()
        .shared();

        // The task cannot remove its entry before this insert: it needs the lock we hold
        in_flight.insert(key.clone(), fetch.clone());
        fetch
    }

    async fn open(
        &self,
        key: &SymbolKey,
        path: &Path,
        origin: CacheOrigin,
    ) -> std::result::Result<CachedSymbol, ServeError> {
        match self.inner.store.open(path).await {
            Ok((file, len)) => Ok(CachedSymbol {
                file,
                len,
                path: path.to_path_buf(),
                origin,
            }),
            Err(e) => {
                warn!(key = %key, path = ?path, error = %e, "Failed to open cached symbol");
                Err(ServeError::NotFound)
            }
        }
    }
}

impl Inner {
    fn in_flight(&self) -> MutexGuard<'_, HashMap<SymbolKey, InFlightFetch>> {
        // The map is only touched in short non-panicking sections
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Body of the per-key download task
    async fn populate(&self, key: SymbolKey) -> FetchResult {
        let guard = InFlightGuard { inner: self, key };
        let result = self.fetch_into_store(&guard.key).await;
        drop(guard);
        result
    }

    async fn fetch_into_store(&self, key: &SymbolKey) -> FetchResult {
        let paths = key.resolve();
        let dest = self.store.path_for(&paths);

        // A download that finished between our lookup and taking the lock
        if self.store.exists(&dest).await {
            debug!(key = %key, "Symbol appeared before fetch started");
            return Ok(0);
        }

        let location = UpstreamLocation::new(&self.upstream_url, &paths);
        let url = location.url();
        self.fetches.fetch_add(1, Ordering::Relaxed);

        match self.fetcher.fetch(&url, &dest).await {
            Ok(outcome) => {
                info!(
                    key = %key,
                    size = outcome.bytes_written,
                    "Cached symbol from upstream"
                );
                Ok(outcome.bytes_written)
            }
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    key = %key,
                    url = %url,
                    kind = e.kind(),
                    error = %e,
                    "Upstream fetch failed"
                );
                LocalStore::discard(&dest).await;
                Err(e)
            }
        }
    }
}

/// Removes a key's in-flight entry when its download task ends, panics included
struct InFlightGuard<'a> {
    inner: &'a Inner,
    key: SymbolKey,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.inner.in_flight().remove(&self.key);
    }
}
