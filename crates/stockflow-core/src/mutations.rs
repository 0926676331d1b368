//! Mutation flows
//!
//! Writes go to the server first. Only a confirmed write invalidates the
//! affected domains; the cache is never patched with local guesses. Every
//! flow reports its outcome through exactly one notification.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use crate::api::ApiClient;
use crate::cache::{DomainTag, QueryCache};
use crate::error::{ApiError, ApiResult};
use crate::models::{
    CreateAdjustment, CreateOrder, CreateProduct, Order, OrderStatus, Product, UpdateProduct,
};
use crate::notify::{Notification, Notifier};

const PRODUCT_TARGETS: &[DomainTag] = &[DomainTag::Products, DomainTag::DashboardStats];
const ORDER_TARGETS: &[DomainTag] = &[DomainTag::Orders, DomainTag::DashboardStats];
const ADJUSTMENT_TARGETS: &[DomainTag] = &[
    DomainTag::Products,
    DomainTag::Inventory,
    DomainTag::DashboardStats,
];

/// Invalidating write access to the API
#[derive(Clone)]
pub struct Mutations {
    api: ApiClient,
    cache: QueryCache,
    notifier: Arc<dyn Notifier>,
}

impl Mutations {
    pub fn new(api: ApiClient, cache: QueryCache, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            api,
            cache,
            notifier,
        }
    }

    // ==================== Products ====================

    pub async fn create_product(&self, product: &CreateProduct) -> ApiResult<Product> {
        const FAILED: &str = "Failed to create product";
        if let Err(e) = product.validate() {
            return self.reject(e, FAILED);
        }
        self.apply(
            PRODUCT_TARGETS,
            "Product created successfully",
            FAILED,
            self.api.create_product(product),
        )
        .await
    }

    pub async fn update_product(&self, id: &str, update: &UpdateProduct) -> ApiResult<Product> {
        const FAILED: &str = "Failed to update product";
        if update.is_empty() {
            return self.reject(
                ApiError::Validation("Nothing to update".to_string()),
                FAILED,
            );
        }
        self.apply(
            PRODUCT_TARGETS,
            "Product updated successfully",
            FAILED,
            self.api.update_product(id, update),
        )
        .await
    }

    pub async fn delete_product(&self, id: &str) -> ApiResult<Value> {
        self.apply(
            PRODUCT_TARGETS,
            "Product deleted successfully",
            "Failed to delete product",
            self.api.delete_product(id),
        )
        .await
    }

    // ==================== Orders ====================

    pub async fn create_order(&self, order: &CreateOrder) -> ApiResult<Order> {
        const FAILED: &str = "Failed to create order";
        if let Err(e) = order.validate() {
            return self.reject(e, FAILED);
        }
        self.apply(
            ORDER_TARGETS,
            "Order created successfully",
            FAILED,
            self.api.create_order(order),
        )
        .await
    }

    pub async fn update_order_status(&self, id: &str, status: OrderStatus) -> ApiResult<Order> {
        self.apply(
            ORDER_TARGETS,
            "Order status updated successfully",
            "Failed to update status",
            self.api.update_order_status(id, status),
        )
        .await
    }

    // ==================== Inventory ====================

    pub async fn create_adjustment(&self, adjustment: &CreateAdjustment) -> ApiResult<Value> {
        self.apply(
            ADJUSTMENT_TARGETS,
            "Adjustment created successfully",
            "Failed to create adjustment",
            self.api.create_adjustment(adjustment),
        )
        .await
    }

    /// Report a locally rejected input as a failed mutation
    pub fn reject<T>(&self, err: ApiError, fallback: &str) -> ApiResult<T> {
        self.notifier
            .notify(Notification::error(err.user_message(fallback)));
        Err(err)
    }

    async fn apply<T, Fut>(
        &self,
        targets: &[DomainTag],
        success: &str,
        failure: &str,
        request: Fut,
    ) -> ApiResult<T>
    where
        Fut: Future<Output = ApiResult<T>>,
    {
        match request.await {
            Ok(value) => {
                let invalidated = self.cache.invalidate_all(targets);
                info!("{} ({} cached queries invalidated)", success, invalidated);
                self.notifier.notify(Notification::success(success, None));
                Ok(value)
            }
            Err(e) => {
                warn!("{}: {}", failure, e);
                self.reject(e, failure)
            }
        }
    }
}
