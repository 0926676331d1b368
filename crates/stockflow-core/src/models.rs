//! Data models for StockFlow
//!
//! Mirrors the JSON payloads of the StockFlow API. Field names are camelCase
//! on the wire. The query cache treats all of these as opaque values; the
//! typed forms are used by the CLI and by client-side validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Admin,
    Staff,
}

/// An authenticated user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Login request body
#[derive(Debug, Clone, Serialize)]
pub struct LoginCredentials {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Debug, Clone, Serialize)]
pub struct RegisterCredentials {
    pub email: String,
    pub name: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
}

/// Response of login and register
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Pagination block attached to every list response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u32,
}

impl Pagination {
    /// Whether a following page exists
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

// ==================== Products ====================

/// A product in the catalogue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock_level: i64,
    pub low_stock_threshold: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether stock is at or below the low-stock threshold
    pub fn is_low_stock(&self) -> bool {
        self.stock_level <= self.low_stock_threshold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductsPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowStockProducts {
    pub count: u64,
    pub products: Vec<Product>,
}

/// Body of a product creation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<i64>,
}

impl CreateProduct {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::Validation("Product name is required".to_string()));
        }
        if self.sku.trim().is_empty() {
            return Err(ApiError::Validation("SKU is required".to_string()));
        }
        if self.price < 0.0 {
            return Err(ApiError::Validation("Price cannot be negative".to_string()));
        }
        Ok(())
    }
}

/// Body of a product update; unset fields are left alone
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_stock_threshold: Option<i64>,
}

impl UpdateProduct {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.sku.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.stock_level.is_none()
            && self.low_stock_threshold.is_none()
    }
}

// ==================== Orders ====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(OrderStatus::Pending),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CANCELLED" => Ok(OrderStatus::Cancelled),
            other => Err(format!(
                "Unknown order status '{}'. Use PENDING, COMPLETED or CANCELLED.",
                other
            )),
        }
    }
}

/// Name and email of the user attached to an order or adjustment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: String,
    pub order_id: String,
    pub product_id: String,
    pub quantity: i64,
    pub price_at_time: f64,
    pub created_at: DateTime<Utc>,
    pub product: ProductSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user: UserSummary,
    #[serde(default)]
    pub order_items: Vec<OrderItem>,
}

impl Order {
    pub fn item_count(&self) -> i64 {
        self.order_items.iter().map(|item| item.quantity).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersPage {
    pub orders: Vec<Order>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaysOrders {
    pub count: u64,
    pub total_revenue: f64,
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderItem {
    pub product_id: String,
    pub quantity: i64,
}

/// Body of an order creation
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateOrder {
    pub items: Vec<CreateOrderItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
}

impl CreateOrder {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.items.is_empty() {
            return Err(ApiError::Validation(
                "An order needs at least one item".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|item| item.product_id.is_empty()) {
            return Err(ApiError::Validation(format!(
                "Item with quantity {} has no product",
                item.quantity
            )));
        }
        if self.items.iter().any(|item| item.quantity <= 0) {
            return Err(ApiError::Validation(
                "Item quantities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Estimated total from known catalogue prices
    ///
    /// Items whose product is not in `products` contribute nothing.
    pub fn estimated_total(&self, products: &[Product]) -> f64 {
        self.items
            .iter()
            .filter_map(|item| {
                products
                    .iter()
                    .find(|p| p.id == item.product_id)
                    .map(|p| p.price * item.quantity as f64)
            })
            .sum()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateOrderStatus {
    pub status: OrderStatus,
}

// ==================== Inventory ====================

/// Direction of a stock movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustmentType {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::In => "IN",
            AdjustmentType::Out => "OUT",
        }
    }

    /// Apply the direction's sign to a quantity
    ///
    /// IN is always positive and OUT always negative, whatever sign the
    /// caller typed.
    pub fn signed(&self, quantity: i64) -> i64 {
        match self {
            AdjustmentType::In => quantity.abs(),
            AdjustmentType::Out => -quantity.abs(),
        }
    }
}

impl std::str::FromStr for AdjustmentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(AdjustmentType::In),
            "OUT" => Ok(AdjustmentType::Out),
            other => Err(format!("Unknown adjustment type '{}'. Use IN or OUT.", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryAdjustment {
    pub id: String,
    pub product_id: String,
    pub user_id: String,
    pub quantity: i64,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub product: ProductSummary,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentsPage {
    pub adjustments: Vec<InventoryAdjustment>,
    pub pagination: Pagination,
}

/// Body of an inventory adjustment
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdjustment {
    pub product_id: String,
    /// Signed quantity: positive for IN, negative for OUT
    pub quantity: i64,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CreateAdjustment {
    /// Build an adjustment from an unsigned quantity
    ///
    /// `current_stock` is the stock level the user was shown, when known.
    /// Removing more than that is rejected before anything is sent.
    pub fn new(
        product_id: impl Into<String>,
        kind: AdjustmentType,
        quantity: i64,
        reason: Option<String>,
        current_stock: Option<i64>,
    ) -> Result<Self, ApiError> {
        let product_id = product_id.into();
        if product_id.is_empty() {
            return Err(ApiError::Validation("Select a product".to_string()));
        }
        if quantity <= 0 {
            return Err(ApiError::Validation(
                "Quantity must be greater than zero".to_string(),
            ));
        }
        if let (AdjustmentType::Out, Some(stock)) = (kind, current_stock) {
            if quantity > stock {
                return Err(ApiError::Validation(format!(
                    "Cannot remove {} units. Only {} in stock.",
                    quantity, stock
                )));
            }
        }

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        Ok(Self {
            product_id,
            quantity: kind.signed(quantity),
            kind,
            reason,
        })
    }
}

// ==================== Dashboard ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_products: u64,
    pub active_orders: u64,
    pub low_stock_items: u64,
    pub revenue_this_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentOrderItem {
    pub id: String,
    pub quantity: i64,
    pub product: ProductSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: String,
    pub user_id: String,
    pub status: OrderStatus,
    pub total_amount: f64,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
    #[serde(default)]
    pub order_items: Vec<RecentOrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockProduct {
    pub id: String,
    pub name: String,
    pub sku: String,
    pub stock_level: i64,
    pub low_stock_threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub date: String,
    pub revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockLevelPoint {
    pub name: String,
    pub stock_level: i64,
    pub low_stock_threshold: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    #[serde(default)]
    pub revenue_chart: Vec<RevenuePoint>,
    #[serde(default)]
    pub stock_levels_chart: Vec<StockLevelPoint>,
    #[serde(default)]
    pub order_status_chart: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub stats: DashboardStats,
    #[serde(default)]
    pub recent_orders: Vec<RecentOrder>,
    #[serde(default)]
    pub low_stock_products: Vec<LowStockProduct>,
    #[serde(default)]
    pub charts: DashboardCharts,
}
