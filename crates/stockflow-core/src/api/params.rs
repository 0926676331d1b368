//! List filters
//!
//! Each filter renders to an ordered list of `(name, value)` pairs. The same
//! list is sent as the request query string and used as the cache key's
//! parameters, so two fetches share a cache slot exactly when they would send
//! the same request.

use crate::models::{AdjustmentType, OrderStatus};

pub type Params = Vec<(&'static str, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// Filters for `GET /api/products`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl ProductQuery {
    pub fn page(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        push(&mut params, "page", self.page);
        push(&mut params, "limit", self.limit);
        // A blank search is the same request as no search
        if let Some(search) = self.search.as_deref().map(str::trim) {
            if !search.is_empty() {
                params.push(("search", search.to_string()));
            }
        }
        push(&mut params, "sortBy", self.sort_by.clone());
        push(&mut params, "sortOrder", self.sort_order.map(|o| o.as_str()));
        params
    }
}

/// Filters for `GET /api/orders`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<OrderStatus>,
    pub user_id: Option<String>,
}

impl OrderQuery {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        push(&mut params, "page", self.page);
        push(&mut params, "limit", self.limit);
        push(&mut params, "status", self.status.map(|s| s.as_str()));
        push(&mut params, "userId", self.user_id.clone());
        params
    }
}

/// Filters for `GET /api/inventory`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub product_id: Option<String>,
    pub kind: Option<AdjustmentType>,
}

impl AdjustmentQuery {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        push(&mut params, "page", self.page);
        push(&mut params, "limit", self.limit);
        push(&mut params, "productId", self.product_id.clone());
        push(&mut params, "type", self.kind.map(|k| k.as_str()));
        params
    }
}

fn push<T: ToString>(params: &mut Params, name: &'static str, value: Option<T>) {
    if let Some(value) = value {
        params.push((name, value.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_params_order() {
        let query = ProductQuery {
            page: Some(2),
            limit: Some(10),
            search: Some(" widget ".to_string()),
            sort_by: Some("name".to_string()),
            sort_order: Some(SortOrder::Desc),
        };
        assert_eq!(
            query.to_params(),
            vec![
                ("page", "2".to_string()),
                ("limit", "10".to_string()),
                ("search", "widget".to_string()),
                ("sortBy", "name".to_string()),
                ("sortOrder", "desc".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_search_is_omitted() {
        let mut query = ProductQuery::page(1, 10);
        query.search = Some("   ".to_string());
        assert_eq!(query.to_params(), ProductQuery::page(1, 10).to_params());
    }

    #[test]
    fn test_order_and_adjustment_params() {
        let orders = OrderQuery {
            status: Some(OrderStatus::Pending),
            ..Default::default()
        };
        assert_eq!(orders.to_params(), vec![("status", "PENDING".to_string())]);

        let adjustments = AdjustmentQuery {
            page: Some(1),
            kind: Some(AdjustmentType::Out),
            ..Default::default()
        };
        assert_eq!(
            adjustments.to_params(),
            vec![("page", "1".to_string()), ("type", "OUT".to_string())]
        );
    }
}
