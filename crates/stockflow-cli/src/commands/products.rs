//! Product command handlers

use std::sync::Arc;

use anyhow::{anyhow, Result};

use stockflow_core::api::{ProductQuery, SortOrder};
use stockflow_core::models::{CreateProduct, UpdateProduct};
use stockflow_core::StockFlow;

use super::{read_error, reported, require_login, ConsoleNotifier};
use crate::output::Output;
use crate::prompt::confirm;

/// Product fields as given on the command line
#[derive(Debug, Clone, Default)]
pub struct ProductInput {
    pub name: Option<String>,
    pub sku: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock_level: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

impl ProductInput {
    fn into_create(self) -> Result<CreateProduct> {
        Ok(CreateProduct {
            name: self.name.ok_or_else(|| anyhow!("--name is required"))?,
            sku: self.sku.ok_or_else(|| anyhow!("--sku is required"))?,
            description: self.description,
            price: self.price.ok_or_else(|| anyhow!("--price is required"))?,
            stock_level: self.stock_level,
            low_stock_threshold: self.low_stock_threshold,
        })
    }

    fn into_update(self) -> UpdateProduct {
        UpdateProduct {
            name: self.name,
            sku: self.sku,
            description: self.description,
            price: self.price,
            stock_level: self.stock_level,
            low_stock_threshold: self.low_stock_threshold,
        }
    }
}

/// List products
pub async fn list(
    client: &StockFlow,
    page: u32,
    limit: u32,
    search: Option<String>,
    sort_by: Option<String>,
    desc: bool,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let query = ProductQuery {
        search,
        sort_order: sort_by
            .as_ref()
            .map(|_| if desc { SortOrder::Desc } else { SortOrder::Asc }),
        sort_by,
        ..ProductQuery::page(page, limit)
    };

    let products = client
        .queries()
        .products(&query)
        .await
        .map_err(|e| read_error(e, "Failed to load products"))?;
    output.print_products(&products);
    Ok(())
}

/// Show one product
pub async fn show(client: &StockFlow, id: String, output: &Output) -> Result<()> {
    require_login(client)?;

    let product = client
        .queries()
        .product(&id)
        .await
        .map_err(|e| read_error(e, "Failed to load product"))?;
    output.print_product(&product);
    Ok(())
}

/// List products at or below their threshold
pub async fn low_stock(client: &StockFlow, output: &Output) -> Result<()> {
    require_login(client)?;

    let low = client
        .queries()
        .low_stock_products()
        .await
        .map_err(|e| read_error(e, "Failed to load low stock products"))?;
    output.print_low_stock(&low);
    Ok(())
}

/// Create a product
pub async fn create(client: &StockFlow, input: ProductInput, output: &Output) -> Result<()> {
    require_login(client)?;

    let product = input.into_create()?;
    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    let created = mutations
        .create_product(&product)
        .await
        .map_err(reported)?;

    if !output.is_quiet() {
        output.print_product(&created);
    }
    Ok(())
}

/// Update a product
pub async fn update(
    client: &StockFlow,
    id: String,
    input: ProductInput,
    output: &Output,
) -> Result<()> {
    require_login(client)?;

    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    let updated = mutations
        .update_product(&id, &input.into_update())
        .await
        .map_err(reported)?;

    if !output.is_quiet() {
        output.print_product(&updated);
    }
    Ok(())
}

/// Delete a product, asking first unless `yes`
pub async fn delete(client: &StockFlow, id: String, yes: bool, output: &Output) -> Result<()> {
    require_login(client)?;

    if !yes && output.should_prompt() {
        let product = client
            .queries()
            .product(&id)
            .await
            .map_err(|e| read_error(e, "Failed to load product"))?;
        let prompt = format!("Delete product '{}' ({})?", product.name, product.sku);
        if !confirm(&prompt)? {
            output.message("Cancelled.");
            return Ok(());
        }
    }

    let mutations = client.mutations(Arc::new(ConsoleNotifier::new(*output)));
    mutations.delete_product(&id).await.map_err(reported)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_requires_core_fields() {
        let input = ProductInput {
            name: Some("Widget".to_string()),
            price: Some(2.5),
            ..Default::default()
        };
        let err = input.into_create().unwrap_err();
        assert!(err.to_string().contains("--sku"));

        let input = ProductInput {
            name: Some("Widget".to_string()),
            sku: Some("W-1".to_string()),
            price: Some(2.5),
            stock_level: Some(4),
            ..Default::default()
        };
        let product = input.into_create().unwrap();
        assert_eq!(product.sku, "W-1");
        assert_eq!(product.stock_level, Some(4));
        assert_eq!(product.low_stock_threshold, None);
    }

    #[test]
    fn test_update_keeps_only_given_fields() {
        let update = ProductInput {
            price: Some(9.0),
            ..Default::default()
        }
        .into_update();
        assert_eq!(update.price, Some(9.0));
        assert!(update.name.is_none());
        assert!(!update.is_empty());

        assert!(ProductInput::default().into_update().is_empty());
    }
}
