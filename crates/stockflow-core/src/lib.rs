//! StockFlow Core Library
//!
//! This crate provides the client side of StockFlow, an inventory and order
//! management service: a typed REST client, a query cache, and the realtime
//! sync coordinator that keeps the cache in step with changes made by other
//! users.
//!
//! # Architecture
//!
//! - **Server is the source of truth**: the cache only ever stores server
//!   responses. Writes and realtime events mark domains stale and the data is
//!   re-fetched; nothing is patched locally.
//! - **Realtime events** are classified, de-duplicated for notification
//!   purposes, and always invalidate the domains they touch.
//!
//! # Modules
//!
//! - `client`: Shared client entry point (main entry point)
//! - `api`: REST API client and list filters
//! - `cache`: Query cache keyed by domain and filters
//! - `queries`: Cached typed reads
//! - `mutations`: Writes with invalidation and notifications
//! - `realtime`: Realtime channel and event types
//! - `sync`: Sync coordinator and dedup ledger
//! - `session`: Persisted authentication session
//! - `notify`: User-facing notifications
//! - `models`: API data structures
//! - `config`: Application configuration

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod mutations;
pub mod notify;
pub mod queries;
pub mod realtime;
pub mod session;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use api::ApiClient;
pub use cache::{DomainTag, QueryCache, QueryKey};
pub use client::StockFlow;
pub use config::Config;
pub use error::{ApiError, ApiResult, SessionError};
pub use mutations::Mutations;
pub use notify::{Notification, NotificationLevel, Notifier};
pub use queries::Queries;
pub use realtime::{ChannelConnector, RealtimeEvent, WebSocketConnector};
pub use session::{SessionEndReason, SessionStore};
pub use sync::{ChannelState, SyncCoordinator};
