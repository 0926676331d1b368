//! Realtime event types
//!
//! Server-originated events, narrowed from untyped payloads at the boundary.
//! Anything that is not a recognized event with the expected shape is
//! dropped here and never reaches the coordinator.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::cache::DomainTag;
use crate::models::AdjustmentType;
use crate::notify::Notification;

/// Event name of a newly placed order
pub const ORDER_CREATED: &str = "order:created";

/// Event name of a stock level change
pub const STOCK_UPDATED: &str = "stock:updated";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: String,
    pub user_name: String,
    pub item_count: u64,
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockUpdated {
    pub product_id: String,
    pub product_name: String,
    #[serde(rename = "type")]
    pub kind: AdjustmentType,
    pub change: i64,
    pub new_stock: i64,
}

/// A recognized realtime event
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    OrderCreated(OrderCreated),
    StockUpdated(StockUpdated),
}

impl RealtimeEvent {
    /// Narrow a raw message into a typed event
    ///
    /// Unknown names are ignored so the server can add event types without
    /// breaking older clients. Known names with a malformed payload are
    /// ignored too.
    pub fn classify(name: &str, payload: &Value) -> Option<Self> {
        let event = match name {
            ORDER_CREATED => OrderCreated::deserialize(payload).map(RealtimeEvent::OrderCreated),
            STOCK_UPDATED => StockUpdated::deserialize(payload).map(RealtimeEvent::StockUpdated),
            _ => {
                debug!("Ignoring unrecognized event '{}'", name);
                return None;
            }
        };

        match event {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Ignoring malformed '{}' payload: {}", name, e);
                None
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RealtimeEvent::OrderCreated(_) => ORDER_CREATED,
            RealtimeEvent::StockUpdated(_) => STOCK_UPDATED,
        }
    }

    /// Key identifying "the same notification" for de-duplication
    ///
    /// Stock events key on the resulting stock level, not on the adjustment:
    /// two adjustments landing on the same level share one notification.
    pub fn fingerprint(&self) -> String {
        match self {
            RealtimeEvent::OrderCreated(e) => format!("order-{}", e.order_id),
            RealtimeEvent::StockUpdated(e) => format!("stock-{}-{}", e.product_id, e.new_stock),
        }
    }

    /// Domains whose cached data this event makes stale
    pub fn invalidation_targets(&self) -> &'static [DomainTag] {
        match self {
            RealtimeEvent::OrderCreated(_) => &[DomainTag::Orders, DomainTag::DashboardStats],
            RealtimeEvent::StockUpdated(_) => &[
                DomainTag::Products,
                DomainTag::Inventory,
                DomainTag::DashboardStats,
            ],
        }
    }

    /// User-facing summary
    pub fn notification(&self) -> Notification {
        match self {
            RealtimeEvent::OrderCreated(e) => Notification::success(
                format!("New order from {}!", e.user_name),
                Some(format!(
                    "{} item(s) - ${:.2}",
                    e.item_count, e.total_amount
                )),
            ),
            RealtimeEvent::StockUpdated(e) => {
                let verb = match e.kind {
                    AdjustmentType::In => "added",
                    AdjustmentType::Out => "removed",
                };
                Notification::info(
                    format!("Stock {}: {}", verb, e.product_name),
                    Some(format!(
                        "{} units (Now: {})",
                        e.change.unsigned_abs(),
                        e.new_stock
                    )),
                )
            }
        }
    }
}
