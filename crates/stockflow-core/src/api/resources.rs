//! Endpoint methods
//!
//! One method per REST endpoint. These are raw calls: they neither touch the
//! query cache nor emit notifications. See `queries` and `mutations` for the
//! cached and invalidating wrappers.

use serde_json::Value;

use super::client::ApiClient;
use super::params::{AdjustmentQuery, OrderQuery, ProductQuery};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    AdjustmentsPage, AuthResponse, CreateAdjustment, CreateOrder, CreateProduct,
    DashboardData, InventoryAdjustment, LoginCredentials, LowStockProducts, Order, OrderStatus,
    OrdersPage, Product, ProductsPage, RegisterCredentials, TodaysOrders, UpdateOrderStatus,
    UpdateProduct, User,
};

fn to_body<T: serde::Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::Validation(e.to_string()))
}

impl ApiClient {
    // ==================== Auth ====================

    /// Log in and store the returned session
    pub async fn login(&self, credentials: &LoginCredentials) -> ApiResult<User> {
        let auth: AuthResponse = self.post("/api/auth/login", to_body(credentials)?).await?;
        self.store_auth(auth)
    }

    /// Register a new account and store the returned session
    pub async fn register(&self, credentials: &RegisterCredentials) -> ApiResult<User> {
        let auth: AuthResponse = self
            .post("/api/auth/register", to_body(credentials)?)
            .await?;
        self.store_auth(auth)
    }

    fn store_auth(&self, auth: AuthResponse) -> ApiResult<User> {
        let user = auth.user.clone();
        self.session()
            .set_auth(auth.user, auth.token)
            .map_err(|e| ApiError::Validation(format!("Signed in but could not save session: {}", e)))?;
        Ok(user)
    }

    // ==================== Products ====================

    pub async fn list_products(&self, query: &ProductQuery) -> ApiResult<ProductsPage> {
        self.get("/api/products", &query.to_params()).await
    }

    pub async fn get_product(&self, id: &str) -> ApiResult<Product> {
        self.get(&format!("/api/products/{}", id), &[]).await
    }

    pub async fn low_stock_products(&self) -> ApiResult<LowStockProducts> {
        self.get("/api/products/low-stock", &[]).await
    }

    pub async fn create_product(&self, product: &CreateProduct) -> ApiResult<Product> {
        self.post("/api/products", to_body(product)?).await
    }

    pub async fn update_product(&self, id: &str, update: &UpdateProduct) -> ApiResult<Product> {
        self.put(&format!("/api/products/{}", id), to_body(update)?)
            .await
    }

    pub async fn delete_product(&self, id: &str) -> ApiResult<Value> {
        self.delete(&format!("/api/products/{}", id)).await
    }

    // ==================== Orders ====================

    pub async fn list_orders(&self, query: &OrderQuery) -> ApiResult<OrdersPage> {
        self.get("/api/orders", &query.to_params()).await
    }

    pub async fn get_order(&self, id: &str) -> ApiResult<Order> {
        self.get(&format!("/api/orders/{}", id), &[]).await
    }

    pub async fn todays_orders(&self) -> ApiResult<TodaysOrders> {
        self.get("/api/orders/today", &[]).await
    }

    pub async fn create_order(&self, order: &CreateOrder) -> ApiResult<Order> {
        self.post("/api/orders", to_body(order)?).await
    }

    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> ApiResult<Order> {
        self.patch(
            &format!("/api/orders/{}/status", id),
            to_body(&UpdateOrderStatus { status })?,
        )
        .await
    }

    // ==================== Inventory ====================

    pub async fn list_adjustments(&self, query: &AdjustmentQuery) -> ApiResult<AdjustmentsPage> {
        self.get("/api/inventory", &query.to_params()).await
    }

    pub async fn product_adjustments(&self, product_id: &str) -> ApiResult<Vec<InventoryAdjustment>> {
        self.get(&format!("/api/inventory/product/{}", product_id), &[])
            .await
    }

    pub async fn create_adjustment(&self, adjustment: &CreateAdjustment) -> ApiResult<Value> {
        self.post("/api/inventory", to_body(adjustment)?).await
    }

    // ==================== Dashboard ====================

    pub async fn dashboard(&self) -> ApiResult<DashboardData> {
        self.get("/api/dashboard/stats", &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::session::SessionStore;
    use crate::test_support::{respond, user_json};
    use chrono::Utc;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user() -> User {
        User {
            id: "u1".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            role: Role::Staff,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_login_stores_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .and(body_json(serde_json::json!({
                "email": "alice@example.com",
                "password": "secret"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "user": user_json(), "token": "jwt-1" })),
            )
            .expect(1)
            .mount(&server)
            .await;
        let session = SessionStore::new().shared();
        let api = ApiClient::new(&server.uri(), session.clone());

        let user = api
            .login(&LoginCredentials {
                email: "alice@example.com".to_string(),
                password: "secret".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(user.name, "Alice");
        assert_eq!(session.token().as_deref(), Some("jwt-1"));
    }

    #[tokio::test]
    async fn test_bearer_token_and_query_are_sent() {
        let body = serde_json::json!({
            "products": [],
            "pagination": { "page": 2, "limit": 5, "total": 0, "totalPages": 0 }
        });
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .and(query_param("page", "2"))
            .and(query_param("limit", "5"))
            .and(header("authorization", "Bearer tok-abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        let session = SessionStore::new().shared();
        session.set_auth(user(), "tok-abc".to_string()).unwrap();
        let api = ApiClient::new(&server.uri(), session);

        let page = api.list_products(&ProductQuery::page(2, 5)).await.unwrap();
        assert_eq!(page.pagination.page, 2);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests[0].url.query(), Some("page=2&limit=5"));
    }

    #[tokio::test]
    async fn test_unauthorized_expires_session() {
        let server = MockServer::start().await;
        respond(&server, "GET", "/api/dashboard/stats", 401, r#"{"error":"Token expired"}"#, 1).await;
        let session = SessionStore::new().shared();
        session.set_auth(user(), "stale".to_string()).unwrap();
        let api = ApiClient::new(&server.uri(), session.clone());

        let err = api.dashboard().await.unwrap_err();
        assert!(err.is_auth_failure());
        assert_eq!(err.user_message("x"), "Token expired");
        assert!(!session.is_authenticated());
    }

    #[tokio::test]
    async fn test_unauthorized_on_login_keeps_session_untouched() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/api/auth/login", 401, r#"{"error":"Invalid credentials"}"#, 1)
            .await;
        let session = SessionStore::new().shared();
        session.set_auth(user(), "existing".to_string()).unwrap();
        let api = ApiClient::new(&server.uri(), session.clone());

        let err = api
            .login(&LoginCredentials {
                email: "alice@example.com".to_string(),
                password: "wrong".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(err.user_message("Login failed"), "Invalid credentials");
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_rejected_carries_server_error() {
        let server = MockServer::start().await;
        respond(&server, "POST", "/api/products", 400, r#"{"error":"SKU already exists"}"#, 1).await;
        let api = ApiClient::new(&server.uri(), SessionStore::new().shared());

        let err = api
            .create_product(&CreateProduct {
                name: "Widget".to_string(),
                sku: "W-1".to_string(),
                price: 1.0,
                ..Default::default()
            })
            .await
            .unwrap_err();

        match err {
            ApiError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message.as_deref(), Some("SKU already exists"));
            }
            other => panic!("Expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_delete_body() {
        let server = MockServer::start().await;
        respond(&server, "DELETE", "/api/products/p1", 200, "", 1).await;
        let api = ApiClient::new(&server.uri(), SessionStore::new().shared());

        let value = api.delete_product("p1").await.unwrap();
        assert!(value.is_null());
    }
}
