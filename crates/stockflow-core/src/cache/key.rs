//! Query keys and domain tags

use std::fmt;

/// Coarse category of cached data
///
/// Invalidation works at this granularity: marking a tag stale affects every
/// cached query of that domain, whatever its filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DomainTag {
    Products,
    Orders,
    Inventory,
    DashboardStats,
}

impl DomainTag {
    pub const ALL: [DomainTag; 4] = [
        DomainTag::Products,
        DomainTag::Orders,
        DomainTag::Inventory,
        DomainTag::DashboardStats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainTag::Products => "products",
            DomainTag::Orders => "orders",
            DomainTag::Inventory => "inventory",
            DomainTag::DashboardStats => "dashboard-stats",
        }
    }
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of one cached fetch
///
/// Parameters are compared as an ordered list: the same pairs in a different
/// order are a different key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    domain: DomainTag,
    params: Vec<(String, String)>,
}

impl QueryKey {
    pub fn new(domain: DomainTag) -> Self {
        Self {
            domain,
            params: Vec::new(),
        }
    }

    /// Append one filter parameter
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Append request parameters in order
    pub fn with_params<'a, I>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = &'a (&'static str, String)>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.to_string(), v.clone())));
        self
    }

    pub fn domain(&self) -> DomainTag {
        self.domain
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.domain)?;
        for (name, value) in &self.params {
            write!(f, ", {}={}", name, value)?;
        }
        f.write_str("]")
    }
}
