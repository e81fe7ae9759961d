//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{ProductFilter, ProductListing};
use store::{Category, CommerceStore, NewCategory, NewProduct, Product, ProductUpdate};

use super::MessageResponse;
use crate::error::ApiError;
use crate::extract::AdminUser;
use crate::state::AppState;

/// GET /products: paginated active products.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<ProductFilter>, QueryRejection>,
) -> Result<Json<ProductListing>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(state.catalog.list_active(filter).await?))
}

/// GET /products/{id}: one active product.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.catalog.get_active(ProductId::new(id)).await?))
}

/// GET /categories: active categories by name.
#[tracing::instrument(skip(state))]
pub async fn categories<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Category>>, ApiError> {
    Ok(Json(state.catalog.categories().await?))
}

/// GET /admin/products: every product, deactivated ones included.
#[tracing::instrument(skip(state))]
pub async fn admin_list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    query: Result<Query<ProductFilter>, QueryRejection>,
) -> Result<Json<ProductListing>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(state.catalog.list_all(filter).await?))
}

/// POST /admin/products: add a product to the catalog.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let Json(product) = body?;
    let product = state.catalog.create(product).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PUT /admin/products/{id}: change product fields.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<ProductUpdate>, JsonRejection>,
) -> Result<Json<Product>, ApiError> {
    let Path(id) = path?;
    let Json(update) = body?;
    Ok(Json(state.catalog.update(ProductId::new(id), update).await?))
}

/// DELETE /admin/products/{id}: hide a product from the catalog.
///
/// Products stay in the store because orders and carts reference them.
#[tracing::instrument(skip(state))]
pub async fn delete<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = path?;
    state.catalog.deactivate(ProductId::new(id)).await?;
    Ok(Json(MessageResponse::new("Product deleted successfully")))
}

/// POST /admin/categories: add a category.
#[tracing::instrument(skip(state, body))]
pub async fn create_category<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<NewCategory>, JsonRejection>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let Json(category) = body?;
    let category = state.catalog.create_category(category).await?;
    Ok((StatusCode::CREATED, Json(category)))
}
