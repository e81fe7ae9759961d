//! Catalog service over the store.

use common::{CategoryId, ProductId};
use store::{
    Category, CommerceStore, NewCategory, NewProduct, Product, ProductQuery, ProductUpdate,
    error::CATEGORIES_NAME_KEY,
};

use crate::error::CommerceError;
use crate::pagination::Pagination;

use super::{ProductFilter, ProductListing};

/// Service for reading and maintaining the product catalog.
///
/// Products are never deleted because order and cart lines reference them;
/// removing a product deactivates it.
pub struct CatalogService<S: CommerceStore> {
    store: S,
}

impl<S: CommerceStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Lists active products for customers.
    #[tracing::instrument(skip(self))]
    pub async fn list_active(&self, filter: ProductFilter) -> Result<ProductListing, CommerceError> {
        self.list(ProductQuery::active(), filter).await
    }

    /// Lists every product, deactivated ones included.
    #[tracing::instrument(skip(self))]
    pub async fn list_all(&self, filter: ProductFilter) -> Result<ProductListing, CommerceError> {
        self.list(ProductQuery::all(), filter).await
    }

    async fn list(
        &self,
        mut query: ProductQuery,
        filter: ProductFilter,
    ) -> Result<ProductListing, CommerceError> {
        let (page, limit) = filter.paging();
        query = query
            .price_range(filter.min_price, filter.max_price)
            .page(page, limit);
        if let Some(category_id) = filter.category_id {
            query = query.category(category_id);
        }
        if let Some(search) = filter.search {
            query = query.search(search);
        }

        let result = self.store.list_products(query).await?;
        Ok(ProductListing {
            products: result.products,
            pagination: Pagination::new(page, limit, result.total),
        })
    }

    /// Loads a product customers may see.
    #[tracing::instrument(skip(self))]
    pub async fn get_active(&self, id: ProductId) -> Result<Product, CommerceError> {
        self.store
            .get_product(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CommerceError::NotFound(format!("Product not found: {id}")))
    }

    #[tracing::instrument(skip(self, product), fields(name = %product.name))]
    pub async fn create(&self, mut product: NewProduct) -> Result<Product, CommerceError> {
        product.name = product.name.trim().to_string();
        if product.name.is_empty() {
            return Err(CommerceError::validation("Product name is required"));
        }
        if product.price.is_negative() {
            return Err(CommerceError::validation("Price cannot be negative"));
        }
        self.check_category(product.category_id).await?;

        let product = self.store.insert_product(product).await?;
        tracing::info!(product_id = %product.id, "product created");
        Ok(product)
    }

    /// Applies a partial update. Fields left out keep their value.
    #[tracing::instrument(skip(self, update))]
    pub async fn update(
        &self,
        id: ProductId,
        mut update: ProductUpdate,
    ) -> Result<Product, CommerceError> {
        if let Some(name) = update.name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(CommerceError::validation("Product name cannot be empty"));
            }
            update.name = Some(name);
        }
        if update.price.is_some_and(|p| p.is_negative()) {
            return Err(CommerceError::validation("Price cannot be negative"));
        }
        self.check_category(update.category_id).await?;

        let product = self.store.update_product(id, update).await?;
        tracing::info!(product_id = %id, "product updated");
        Ok(product)
    }

    /// Hides a product from customers. Idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn deactivate(&self, id: ProductId) -> Result<Product, CommerceError> {
        let product = self
            .store
            .update_product(
                id,
                ProductUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        tracing::info!(product_id = %id, "product deactivated");
        Ok(product)
    }

    /// Lists active categories by name.
    #[tracing::instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<Category>, CommerceError> {
        Ok(self.store.list_categories(true).await?)
    }

    #[tracing::instrument(skip(self, category), fields(name = %category.name))]
    pub async fn create_category(
        &self,
        mut category: NewCategory,
    ) -> Result<Category, CommerceError> {
        category.name = category.name.trim().to_string();
        if category.name.is_empty() {
            return Err(CommerceError::validation("Category name is required"));
        }

        let category = self
            .store
            .insert_category(category)
            .await
            .map_err(|e| match e {
                e if e.is_unique_violation(CATEGORIES_NAME_KEY) => {
                    CommerceError::Conflict("Category already exists".to_string())
                }
                other => other.into(),
            })?;
        tracing::info!(category_id = %category.id, "category created");
        Ok(category)
    }

    async fn check_category(&self, category_id: Option<CategoryId>) -> Result<(), CommerceError> {
        let Some(id) = category_id else {
            return Ok(());
        };
        match self.store.get_category(id).await? {
            Some(category) if category.is_active => Ok(()),
            _ => Err(CommerceError::Validation(format!("Category not found: {id}"))),
        }
    }
}
