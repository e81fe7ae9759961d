//! Checkout and customer order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{CheckoutReceipt, CheckoutRequest};
use serde::Serialize;
use store::{CommerceStore, Order};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub message: &'static str,
    #[serde(flatten)]
    pub receipt: CheckoutReceipt,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: &'static str,
    pub order: Order,
}

/// POST /checkout: place an order for the active cart.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    body: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let Json(request) = body?;
    let receipt = state.checkout.checkout(user.id(), request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            message: "Order created successfully",
            receipt,
        }),
    ))
}

/// GET /checkout/history: the user's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.history(user.id()).await?))
}

/// GET /checkout/orders/{id}: one of the user's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = path?;
    Ok(Json(
        state.orders.get_for_user(user.id(), OrderId::new(id)).await?,
    ))
}

/// PUT /checkout/orders/{id}/cancel: cancel a pending order.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<CancelResponse>, ApiError> {
    let Path(id) = path?;
    let order = state.orders.cancel(user.id(), OrderId::new(id)).await?;

    Ok(Json(CancelResponse {
        message: "Order cancelled successfully",
        order,
    }))
}
