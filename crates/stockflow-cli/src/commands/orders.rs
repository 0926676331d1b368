//! Order command handlers

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::debug;

use stockflow_core::api::OrderQuery;
use stockflow_core::models::{CreateOrder, CreateOrderItem, OrderStatus};
use stockflow_core::StockFlow;

use super::{read_error, reported, require_login, ConsoleNotifier};
use crate::output::Output;

/// List orders
pub async fn list(
    client: &StockFlow,
    page: u32,
    limit: u32,
    status: Option<OrderStatus>,
    user_id: Option<String>,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let query = OrderQuery {
        page: Some(page),
        limit: Some(limit),
        status,
        user_id,
    };
    let orders = client
        .queries()
        .orders(&query)
        .await
        .map_err(|e| read_error(e, "Failed to load orders"))?;
    output.print_orders(&orders);
    Ok(())
}

/// Show one order
pub async fn show(client: &StockFlow, id: String, output: &Output) -> Result<()> {
    require_login(client)?;

    let order = client
        .queries()
        .order(&id)
        .await
        .map_err(|e| read_error(e, "Failed to load order"))?;
    output.print_order(&order);
    Ok(())
}

/// Show today's orders
pub async fn today(client: &StockFlow, output: &Output) -> Result<()> {
    require_login(client)?;

    let today = client
        .queries()
        .todays_orders()
        .await
        .map_err(|e| read_error(e, "Failed to load today's orders"))?;
    output.print_todays_orders(&today);
    Ok(())
}

/// Place an order from `PRODUCT_ID:QUANTITY` items
pub async fn create(client: &StockFlow, items: Vec<String>, output: &Output) -> Result<()> {
    require_login(client)?;

    let order = CreateOrder {
        items: items
            .iter()
            .map(|item| parse_item(item))
            .collect::<Result<Vec<_>>>()?,
        status: None,
    };

    if output.should_prompt() {
        let queries = client.queries();
        let mut known = Vec::new();
        for item in &order.items {
            match queries.product(&item.product_id).await {
                Ok(product) => known.push(product),
                Err(e) => debug!("No price for {}: {}", item.product_id, e),
            }
        }
        output.message(&format!(
            "Estimated total: ${:.2}",
            order.estimated_total(&known)
        ));
    }

    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    let created = mutations.create_order(&order).await.map_err(reported)?;

    if !output.is_quiet() {
        output.print_order(&created);
    }
    Ok(())
}

/// Change an order's status
pub async fn set_status(
    client: &StockFlow,
    id: String,
    status: OrderStatus,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    let order = mutations
        .update_order_status(&id, status)
        .await
        .map_err(reported)?;

    if output.is_json() {
        output.print_order(&order);
    }
    Ok(())
}

/// Parse `PRODUCT_ID:QUANTITY`
fn parse_item(raw: &str) -> Result<CreateOrderItem> {
    let Some((product_id, quantity)) = raw.rsplit_once(':') else {
        bail!("Invalid item '{}'. Use PRODUCT_ID:QUANTITY", raw);
    };
    let product_id = product_id.trim();
    if product_id.is_empty() {
        bail!("Invalid item '{}'. Missing product ID", raw);
    }
    let quantity = quantity
        .trim()
        .parse()
        .with_context(|| format!("Invalid quantity in '{}'", raw))?;

    Ok(CreateOrderItem {
        product_id: product_id.to_string(),
        quantity,
    })
}
