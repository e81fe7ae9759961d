//! Catalog browsing and back-office product and category management.

mod service;

pub use service::CatalogService;

use common::{CategoryId, Money};
use serde::{Deserialize, Serialize};
use store::Product;

use crate::pagination::{self, Pagination};

/// Query parameters of the product listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub min_price: Option<Money>,
    #[serde(default)]
    pub max_price: Option<Money>,
}

impl ProductFilter {
    /// Returns the resolved 1-based page and page size.
    pub fn paging(&self) -> (usize, usize) {
        pagination::resolve(self.page, self.limit)
    }
}

/// One page of a product listing.
#[derive(Debug, Clone, Serialize)]
pub struct ProductListing {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}
