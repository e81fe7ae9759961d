//! Cart endpoints for the signed-in user.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CartItemId, ProductId};
use domain::{CartSummary, CartView};
use serde::Deserialize;
use store::{CartItem, CommerceStore};

use super::{MessageResponse, quantity};
use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

/// GET /cart: the active cart with product details.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.get_cart(user.id()).await?))
}

/// POST /cart/add: add a product or increase its quantity.
#[tracing::instrument(skip(state, body))]
pub async fn add<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Result<Json<AddToCartRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let Json(req) = body?;
    let qty = quantity(req.quantity)?;

    let item = state
        .carts
        .add_item(user.id(), ProductId::new(req.product_id), qty)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PUT /cart/items/{id}: overwrite a line's quantity.
#[tracing::instrument(skip(state, body))]
pub async fn update_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<UpdateQuantityRequest>, JsonRejection>,
) -> Result<Json<CartItem>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    let qty = quantity(req.quantity)?;

    let item = state
        .carts
        .update_item(user.id(), CartItemId::new(id), qty)
        .await?;
    Ok(Json(item))
}

/// DELETE /cart/items/{id}: remove a line.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = path?;
    state.carts.remove_item(user.id(), CartItemId::new(id)).await?;
    Ok(Json(MessageResponse::new("Item removed from cart")))
}

/// DELETE /cart/clear: empty the cart.
#[tracing::instrument(skip(state))]
pub async fn clear<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.carts.clear(user.id()).await?;
    Ok(Json(MessageResponse::new("Cart cleared")))
}

/// GET /cart/summary: advisory totals at current prices.
#[tracing::instrument(skip(state))]
pub async fn summary<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<CartSummary>, ApiError> {
    Ok(Json(state.carts.summary(user.id()).await?))
}
