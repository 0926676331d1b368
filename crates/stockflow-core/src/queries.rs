//! Cached reads
//!
//! Typed wrappers that route API reads through the query cache. Each read
//! has a fixed query key so that invalidating a domain reaches every view of
//! it, whatever filters were used.

use std::future::Future;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api::{AdjustmentQuery, ApiClient, OrderQuery, ProductQuery};
use crate::cache::{DomainTag, QueryCache, QueryKey};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AdjustmentsPage, DashboardData, InventoryAdjustment, LowStockProducts, Order, OrdersPage,
    Product, ProductsPage, TodaysOrders,
};

/// Cached read access to the API
#[derive(Clone)]
pub struct Queries {
    api: ApiClient,
    cache: QueryCache,
}

impl Queries {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self { api, cache }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    // ==================== Keys ====================

    pub fn products_key(query: &ProductQuery) -> QueryKey {
        QueryKey::new(DomainTag::Products).with_params(&query.to_params())
    }

    pub fn product_key(id: &str) -> QueryKey {
        QueryKey::new(DomainTag::Products).with("id", id)
    }

    pub fn low_stock_key() -> QueryKey {
        QueryKey::new(DomainTag::Products).with("view", "low-stock")
    }

    pub fn orders_key(query: &OrderQuery) -> QueryKey {
        QueryKey::new(DomainTag::Orders).with_params(&query.to_params())
    }

    pub fn order_key(id: &str) -> QueryKey {
        QueryKey::new(DomainTag::Orders).with("id", id)
    }

    pub fn todays_orders_key() -> QueryKey {
        QueryKey::new(DomainTag::Orders).with("view", "today")
    }

    pub fn adjustments_key(query: &AdjustmentQuery) -> QueryKey {
        QueryKey::new(DomainTag::Inventory).with_params(&query.to_params())
    }

    pub fn product_adjustments_key(product_id: &str) -> QueryKey {
        QueryKey::new(DomainTag::Inventory).with("product", product_id)
    }

    pub fn dashboard_key() -> QueryKey {
        QueryKey::new(DomainTag::DashboardStats)
    }

    // ==================== Reads ====================

    pub async fn products(&self, query: &ProductQuery) -> ApiResult<ProductsPage> {
        let q = query.clone();
        self.cached(Self::products_key(query), move |api| {
            let q = q.clone();
            async move { api.list_products(&q).await }
        })
        .await
    }

    pub async fn product(&self, id: &str) -> ApiResult<Product> {
        let id = id.to_string();
        self.cached(Self::product_key(&id), move |api| {
            let id = id.clone();
            async move { api.get_product(&id).await }
        })
        .await
    }

    pub async fn low_stock_products(&self) -> ApiResult<LowStockProducts> {
        self.cached(Self::low_stock_key(), |api| async move {
            api.low_stock_products().await
        })
        .await
    }

    pub async fn orders(&self, query: &OrderQuery) -> ApiResult<OrdersPage> {
        let q = query.clone();
        self.cached(Self::orders_key(query), move |api| {
            let q = q.clone();
            async move { api.list_orders(&q).await }
        })
        .await
    }

    pub async fn order(&self, id: &str) -> ApiResult<Order> {
        let id = id.to_string();
        self.cached(Self::order_key(&id), move |api| {
            let id = id.clone();
            async move { api.get_order(&id).await }
        })
        .await
    }

    pub async fn todays_orders(&self) -> ApiResult<TodaysOrders> {
        self.cached(Self::todays_orders_key(), |api| async move {
            api.todays_orders().await
        })
        .await
    }

    pub async fn adjustments(&self, query: &AdjustmentQuery) -> ApiResult<AdjustmentsPage> {
        let q = query.clone();
        self.cached(Self::adjustments_key(query), move |api| {
            let q = q.clone();
            async move { api.list_adjustments(&q).await }
        })
        .await
    }

    pub async fn product_adjustments(
        &self,
        product_id: &str,
    ) -> ApiResult<Vec<InventoryAdjustment>> {
        let id = product_id.to_string();
        self.cached(Self::product_adjustments_key(&id), move |api| {
            let id = id.clone();
            async move { api.product_adjustments(&id).await }
        })
        .await
    }

    pub async fn dashboard(&self) -> ApiResult<DashboardData> {
        self.cached(Self::dashboard_key(), |api| async move { api.dashboard().await })
            .await
    }

    /// Fetch through the cache and decode the cached JSON
    async fn cached<T, F, Fut>(&self, key: QueryKey, fetch: F) -> ApiResult<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(ApiClient) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let api = self.api.clone();
        let value = self
            .cache
            .fetch(&key, move || {
                let call = fetch(api.clone());
                async move {
                    let data = call.await?;
                    serde_json::to_value(data).map_err(|e| ApiError::Validation(e.to_string()))
                }
            })
            .await?;

        serde_json::from_value(value).map_err(|e| ApiError::Decode {
            url: key.to_string(),
            details: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use crate::test_support::respond;
    use serde_json::json;
    use wiremock::MockServer;

    fn stats_body(total_products: u64) -> String {
        json!({
            "stats": {
                "totalProducts": total_products,
                "activeOrders": 3,
                "lowStockItems": 1,
                "revenueThisMonth": 42.5
            },
            "recentOrders": [],
            "lowStockProducts": [],
            "charts": {}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_fresh_read_is_served_from_cache() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/api/dashboard/stats", 200, &stats_body(10), 1).await;
        let api = ApiClient::new(&server.uri(), SessionStore::new().shared());
        let queries = Queries::new(api, QueryCache::new());

        let first = queries.dashboard().await.unwrap();
        let second = queries.dashboard().await.unwrap();

        assert_eq!(first.stats.total_products, 10);
        assert_eq!(first, second);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalidated_read_goes_back_to_server() {
        let server = MockServer::start().await;
        let api = ApiClient::new(&server.uri(), SessionStore::new().shared());
        let cache = QueryCache::new();
        let queries = Queries::new(api, cache.clone());

        respond(&server, "GET", "/api/dashboard/stats", 200, &stats_body(10), 1).await;
        queries.dashboard().await.unwrap();
        server.verify().await;
        server.reset().await;
        respond(&server, "GET", "/api/dashboard/stats", 200, &stats_body(11), 1).await;

        assert_eq!(cache.invalidate(DomainTag::DashboardStats), 1);
        assert!(cache.is_stale(&Queries::dashboard_key()));

        let refreshed = queries.dashboard().await.unwrap();
        assert_eq!(refreshed.stats.total_products, 11);
        assert!(!cache.is_stale(&Queries::dashboard_key()));
    }

    #[test]
    fn test_keys_follow_filters() {
        let page_one = Queries::products_key(&ProductQuery::page(1, 10));
        let page_two = Queries::products_key(&ProductQuery::page(2, 10));
        assert_ne!(page_one, page_two);
        assert_eq!(page_one.domain(), DomainTag::Products);
        assert_eq!(Queries::low_stock_key().domain(), DomainTag::Products);
        assert_eq!(
            Queries::product_adjustments_key("p1").domain(),
            DomainTag::Inventory
        );
    }
}
