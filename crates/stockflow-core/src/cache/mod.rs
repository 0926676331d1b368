//! Cached query layer
//!
//! Keys each server fetch by a `QueryKey` (domain tag + ordered filter
//! parameters), serves cached results, tracks staleness, and re-fetches
//! observed queries in the background after invalidation.
//!
//! ## Usage
//!
//! ```ignore
//! let cache = QueryCache::new();
//! let key = QueryKey::new(DomainTag::Products).with("page", 1);
//! let data = cache.fetch(&key, move || fetch_products()).await?;
//! let _observer = cache.observe(&key);
//! cache.invalidate(DomainTag::Products);
//! ```

mod key;
mod store;

pub use key::{DomainTag, QueryKey};
pub use store::{FetchFuture, Fetcher, QueryCache, QueryObserver, DEFAULT_STALE_TIME};
