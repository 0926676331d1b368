//! REST API client
//!
//! Provides authenticated access to the StockFlow HTTP API.
//!
//! ## Usage
//!
//! ```ignore
//! let api = ApiClient::new("http://localhost:3000", session.clone());
//! api.login(&credentials).await?;
//! let page = api.list_products(&ProductQuery::page(1, 10)).await?;
//! ```

mod client;
mod params;
mod resources;

pub use client::ApiClient;
pub use params::{AdjustmentQuery, OrderQuery, Params, ProductQuery, SortOrder};
