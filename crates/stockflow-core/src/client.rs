//! Client entry point
//!
//! `StockFlow` wires the shared pieces together: one session, one API client
//! and one query cache per process. Reads, writes and realtime sync are all
//! handed out from here so they share the same cache.
//!
//! ## Usage
//!
//! ```ignore
//! let client = StockFlow::open()?;
//!
//! let page = client.queries().products(&ProductQuery::page(1, 10)).await?;
//!
//! let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
//! let notifier = Arc::new(tx);
//! client.mutations(notifier.clone()).create_product(&product).await?;
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::cache::QueryCache;
use crate::config::Config;
use crate::mutations::Mutations;
use crate::notify::Notifier;
use crate::queries::Queries;
use crate::realtime::WebSocketConnector;
use crate::session::SessionStore;
use crate::sync::SyncCoordinator;

/// A configured StockFlow client
pub struct StockFlow {
    config: Config,
    session: Arc<SessionStore>,
    api: ApiClient,
    cache: QueryCache,
}

impl StockFlow {
    /// Open a client with the default configuration
    pub fn open() -> Result<Self> {
        let config = Config::load().context("Failed to load configuration")?;
        Ok(Self::open_with_config(config))
    }

    /// Open a client with a specific configuration
    ///
    /// Restores a persisted session if one exists. The cache is cleared
    /// whenever the session ends, so nothing fetched for one user is served
    /// to the next.
    pub fn open_with_config(config: Config) -> Self {
        let session = SessionStore::with_path(config.session_path()).shared();
        if session.hydrate() {
            if let Some(user) = session.user() {
                info!("Restored session for {}", user.email);
            }
        }

        let cache = QueryCache::with_stale_time(config.stale_time());
        {
            let cache = cache.clone();
            session.on_session_end(move |reason| {
                debug!("Session ended ({:?}), clearing query cache", reason);
                cache.clear();
            });
        }

        let api = ApiClient::new(&config.api_url, session.clone());

        Self {
            config,
            session,
            api,
            cache,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    /// Cached reads
    pub fn queries(&self) -> Queries {
        Queries::new(self.api.clone(), self.cache.clone())
    }

    /// Invalidating writes reporting to `notifier`
    pub fn mutations(&self, notifier: Arc<dyn Notifier>) -> Mutations {
        Mutations::new(self.api.clone(), self.cache.clone(), notifier)
    }

    /// Sync coordinator over this client's cache
    pub fn coordinator(&self, notifier: Arc<dyn Notifier>) -> SyncCoordinator {
        SyncCoordinator::new(self.cache.clone(), notifier)
    }

    /// Realtime connector for the configured server
    pub fn connector(&self) -> WebSocketConnector {
        WebSocketConnector::new(&self.config.realtime_url())
    }
}
