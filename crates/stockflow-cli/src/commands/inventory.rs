//! Inventory command handlers

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use stockflow_core::api::AdjustmentQuery;
use stockflow_core::models::{AdjustmentType, CreateAdjustment};
use stockflow_core::StockFlow;

use super::{read_error, reported, require_login, ConsoleNotifier};
use crate::output::Output;

/// List adjustments
pub async fn list(
    client: &StockFlow,
    page: u32,
    limit: u32,
    product_id: Option<String>,
    kind: Option<AdjustmentType>,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let query = AdjustmentQuery {
        page: Some(page),
        limit: Some(limit),
        product_id,
        kind,
    };
    let page = client
        .queries()
        .adjustments(&query)
        .await
        .map_err(|e| read_error(e, "Failed to load adjustments"))?;
    output.print_adjustments(&page.adjustments, Some(&page.pagination));
    Ok(())
}

/// Adjustment history of one product
pub async fn product(client: &StockFlow, product_id: String, output: &Output) -> Result<()> {
    require_login(client)?;

    let adjustments = client
        .queries()
        .product_adjustments(&product_id)
        .await
        .map_err(|e| read_error(e, "Failed to load adjustments"))?;
    output.print_adjustments(&adjustments, None);
    Ok(())
}

/// Add or remove stock
///
/// Removing more than the current stock is refused before anything is sent.
pub async fn adjust(
    client: &StockFlow,
    product_id: String,
    kind: AdjustmentType,
    quantity: i64,
    reason: Option<String>,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let current_stock = match kind {
        AdjustmentType::Out => match client.queries().product(&product_id).await {
            Ok(product) => Some(product.stock_level),
            Err(e) => {
                debug!("Stock level of {} unknown: {}", product_id, e);
                None
            }
        },
        AdjustmentType::In => None,
    };

    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    let adjustment =
        match CreateAdjustment::new(product_id, kind, quantity, reason, current_stock) {
            Ok(adjustment) => adjustment,
            Err(e) => {
                return mutations
                    .reject(e, "Failed to create adjustment")
                    .map_err(reported)
            }
        };

    let response = mutations
        .create_adjustment(&adjustment)
        .await
        .map_err(reported)?;

    if output.is_json() {
        output.print_json(&response);
    }
    Ok(())
}
