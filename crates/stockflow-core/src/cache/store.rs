//! Query cache implementation
//!
//! Stores the last server response per `QueryKey` as an opaque JSON value.
//! The cache is never patched locally: after a mutation or a realtime event
//! the affected domains are marked stale and re-fetched from the server.
//!
//! Every key has at most one fetch in flight, whether it was started by a
//! reader or by a background re-fetch. Readers arriving meanwhile wait for it
//! instead of sending a second request.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::Value;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::key::{DomainTag, QueryKey};
use crate::error::ApiResult;

/// Default freshness window
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(60);

/// Boxed future produced by a fetcher
pub type FetchFuture = BoxFuture<'static, ApiResult<Value>>;

/// Re-runnable fetch function registered for a key
pub type Fetcher = Arc<dyn Fn() -> FetchFuture + Send + Sync>;

#[derive(Default)]
struct CacheEntry {
    data: Option<Value>,
    stale: bool,
    fetched_at: Option<Instant>,
    observers: usize,
    /// A fetch for this key is running
    in_flight: bool,
    /// Invalidated again while a fetch was running
    refetch_queued: bool,
    fetcher: Option<Fetcher>,
}

impl CacheEntry {
    fn fresh_data(&self, stale_time: Duration) -> Option<Value> {
        let fetched_at = self.fetched_at?;
        if self.stale || fetched_at.elapsed() >= stale_time {
            return None;
        }
        self.data.clone()
    }

    /// Claim the single re-fetch slot
    ///
    /// Returns the fetcher to run, or None when a fetch is already running
    /// (in which case one more run is queued behind it).
    fn claim_refetch(&mut self) -> Option<Fetcher> {
        let fetcher = self.fetcher.clone()?;
        if self.in_flight {
            self.refetch_queued = true;
            return None;
        }
        self.in_flight = true;
        Some(fetcher)
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<QueryKey, CacheEntry>,
    /// Bumped by `clear`; results of fetches started earlier are discarded
    generation: u64,
}

/// Shared, cloneable query cache
#[derive(Clone)]
pub struct QueryCache {
    state: Arc<Mutex<CacheState>>,
    stale_time: Duration,
    updates: broadcast::Sender<QueryKey>,
    /// Ticks whenever a fetch settles, for readers waiting on one
    settled: Arc<watch::Sender<()>>,
}

impl QueryCache {
    pub fn new() -> Self {
        Self::with_stale_time(DEFAULT_STALE_TIME)
    }

    pub fn with_stale_time(stale_time: Duration) -> Self {
        let (updates, _) = broadcast::channel(64);
        let (settled, _) = watch::channel(());
        Self {
            state: Arc::new(Mutex::new(CacheState::default())),
            stale_time,
            updates,
            settled: Arc::new(settled),
        }
    }

    /// Serve `key` from the cache, or fetch it
    ///
    /// Fresh data is returned without calling `fetcher`. If a fetch for the
    /// key is already running, this waits for it and serves its result.
    /// Otherwise the fetcher runs and its result replaces the cached value.
    /// The fetcher is kept for background re-fetches. On failure the previous
    /// value is left in place.
    pub async fn fetch<F, Fut>(&self, key: &QueryKey, fetcher: F) -> ApiResult<Value>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<Value>> + Send + 'static,
    {
        let fetcher: Fetcher = Arc::new(move || -> FetchFuture { Box::pin(fetcher()) });

        loop {
            let claim = {
                let mut state = self.lock();
                let generation = state.generation;
                let entry = state.entries.entry(key.clone()).or_default();
                entry.fetcher = Some(fetcher.clone());
                if let Some(data) = entry.fresh_data(self.stale_time) {
                    return Ok(data);
                }
                if entry.in_flight {
                    // Subscribed under the lock so the settle cannot be missed
                    Err(self.settled.subscribe())
                } else {
                    entry.in_flight = true;
                    Ok(generation)
                }
            };

            match claim {
                Ok(generation) => return self.run_fetch(key, generation, &fetcher).await,
                Err(mut settled) => {
                    debug!("Waiting for in-flight fetch of {}", key);
                    // The sender lives as long as `self`
                    let _ = settled.changed().await;
                }
            }
        }
    }

    /// Register interest in `key`
    ///
    /// Observed keys are re-fetched in the background when invalidated. If
    /// the key is already stale, a re-fetch starts right away. Interest ends
    /// when the returned guard is dropped.
    pub fn observe(&self, key: &QueryKey) -> QueryObserver {
        let (generation, refetch) = {
            let mut state = self.lock();
            let generation = state.generation;
            let entry = state.entries.entry(key.clone()).or_default();
            entry.observers += 1;
            let refetch = if entry.stale {
                entry.claim_refetch()
            } else {
                None
            };
            (generation, refetch)
        };

        if let Some(fetcher) = refetch {
            self.spawn_refetch(key.clone(), generation, fetcher);
        }

        QueryObserver {
            cache: self.clone(),
            key: key.clone(),
            generation,
        }
    }

    /// Mark every cached query of `tag` stale
    ///
    /// Observed queries are re-fetched in the background; their current data
    /// stays readable until the new response lands. At most one fetch per
    /// key runs at a time. Returns the number of keys marked.
    pub fn invalidate(&self, tag: DomainTag) -> usize {
        let mut refetches = Vec::new();
        let (generation, marked) = {
            let mut state = self.lock();
            let generation = state.generation;
            let mut marked = 0;
            for (key, entry) in state.entries.iter_mut().filter(|(k, _)| k.domain() == tag) {
                entry.stale = true;
                marked += 1;
                if entry.observers > 0 {
                    if let Some(fetcher) = entry.claim_refetch() {
                        refetches.push((key.clone(), fetcher));
                    }
                }
            }
            (generation, marked)
        };

        debug!(
            "Invalidated {} ({} keys, {} re-fetches)",
            tag,
            marked,
            refetches.len()
        );
        for (key, fetcher) in refetches {
            self.spawn_refetch(key, generation, fetcher);
        }
        marked
    }

    /// Invalidate several domains
    pub fn invalidate_all(&self, tags: &[DomainTag]) -> usize {
        tags.iter().map(|tag| self.invalidate(*tag)).sum()
    }

    /// Cached value for `key`, fresh or not
    pub fn get(&self, key: &QueryKey) -> Option<Value> {
        self.lock().entries.get(key).and_then(|e| e.data.clone())
    }

    /// Whether `key` is cached and marked stale
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .map(|e| e.stale)
            .unwrap_or(false)
    }

    /// Whether a fetch for `key` is running
    pub fn is_fetching(&self, key: &QueryKey) -> bool {
        self.lock()
            .entries
            .get(key)
            .map(|e| e.in_flight)
            .unwrap_or(false)
    }

    /// Keys currently cached for `tag`
    pub fn keys(&self, tag: DomainTag) -> Vec<QueryKey> {
        self.lock()
            .entries
            .keys()
            .filter(|k| k.domain() == tag)
            .cloned()
            .collect()
    }

    /// Number of cached keys
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry
    ///
    /// Fetches still running are orphaned: their results are thrown away,
    /// even if the same key has been cached again in the meantime.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.entries.clear();
            state.generation += 1;
        }
        self.settled.send_replace(());
    }

    /// Receive the key of every query whose data was replaced
    pub fn subscribe(&self) -> broadcast::Receiver<QueryKey> {
        self.updates.subscribe()
    }

    async fn run_fetch(
        &self,
        key: &QueryKey,
        generation: u64,
        fetcher: &Fetcher,
    ) -> ApiResult<Value> {
        let mut pending = PendingFetch {
            cache: self,
            key,
            generation,
            finished: false,
        };
        let result = fetcher().await;
        pending.finished = true;

        if let Some(next) = self.complete(key, generation, &result) {
            self.spawn_refetch(key.clone(), generation, next);
        }
        result
    }

    fn spawn_refetch(&self, key: QueryKey, generation: u64, fetcher: Fetcher) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                // Stays stale; the next fetch will go to the server
                debug!("No runtime for background re-fetch of {}", key);
                self.abandon(&key, generation);
                return;
            }
        };

        let cache = self.clone();
        handle.spawn(async move {
            let result = fetcher().await;
            if let Some(next) = cache.complete(&key, generation, &result) {
                cache.spawn_refetch(key, generation, next);
            }
        });
    }

    /// Store the result of a fetch started in `generation`
    ///
    /// Returns the fetcher of a queued follow-up, which the caller must run.
    fn complete(
        &self,
        key: &QueryKey,
        generation: u64,
        result: &ApiResult<Value>,
    ) -> Option<Fetcher> {
        let mut next = None;
        let updated = {
            let mut state = self.lock();
            if state.generation != generation {
                debug!("Discarding {} fetched before the cache was cleared", key);
                return None;
            }
            let entry = state.entries.get_mut(key)?;

            match result {
                Ok(value) => {
                    entry.data = Some(value.clone());
                    entry.fetched_at = Some(Instant::now());
                    // Invalidated during the fetch: this data may predate the
                    // event, so it stays stale and one more run follows
                    let queued = std::mem::take(&mut entry.refetch_queued);
                    if queued && entry.observers > 0 {
                        next = entry.fetcher.clone();
                    }
                    if next.is_none() {
                        entry.stale = queued;
                        entry.in_flight = false;
                    }
                    true
                }
                Err(e) => {
                    warn!("Fetch of {} failed: {}", key, e);
                    entry.in_flight = false;
                    entry.refetch_queued = false;
                    false
                }
            }
        };

        if updated {
            let _ = self.updates.send(key.clone());
        }
        self.settled.send_replace(());
        next
    }

    /// Release the fetch slot of a fetch that will never complete
    fn abandon(&self, key: &QueryKey, generation: u64) {
        {
            let mut state = self.lock();
            if state.generation == generation {
                if let Some(entry) = state.entries.get_mut(key) {
                    entry.in_flight = false;
                    entry.refetch_queued = false;
                }
            }
        }
        self.settled.send_replace(());
    }

    fn release(&self, key: &QueryKey, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        if let Some(entry) = state.entries.get_mut(key) {
            entry.observers = entry.observers.saturating_sub(1);
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Frees the fetch slot if a reader's fetch is dropped before it finishes
struct PendingFetch<'a> {
    cache: &'a QueryCache,
    key: &'a QueryKey,
    generation: u64,
    finished: bool,
}

impl Drop for PendingFetch<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.abandon(self.key, self.generation);
        }
    }
}

/// Interest in one query; dropping it stops background re-fetches
pub struct QueryObserver {
    cache: QueryCache,
    key: QueryKey,
    generation: u64,
}

impl QueryObserver {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Current cached value
    pub fn data(&self) -> Option<Value> {
        self.cache.get(&self.key)
    }
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        self.cache.release(&self.key, self.generation);
    }
}
