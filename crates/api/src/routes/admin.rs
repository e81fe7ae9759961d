//! Back-office order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use common::{OrderId, PaymentStatus};
use domain::{OrderFilter, OrderListing, StatusUpdate};
use serde::Deserialize;
use store::{CommerceStore, Order};

use crate::error::ApiError;
use crate::extract::AdminUser;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PaymentUpdateRequest {
    pub payment_status: PaymentStatus,
}

/// GET /admin/orders: filtered, paginated order listing.
#[tracing::instrument(skip(state))]
pub async fn list_orders<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    query: Result<Query<OrderFilter>, QueryRejection>,
) -> Result<Json<OrderListing>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(state.orders.list(filter).await?))
}

/// GET /admin/orders/{id}: any order.
#[tracing::instrument(skip(state))]
pub async fn get_order<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.orders.get(OrderId::new(id)).await?))
}

/// PUT /admin/orders/{id}/status: overwrite fulfillment status.
#[tracing::instrument(skip(state, body))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = path?;
    let Json(update) = body?;
    tracing::debug!(admin_id = %admin.id(), "admin status update");

    Ok(Json(
        state.orders.update_status(OrderId::new(id), update).await?,
    ))
}

/// PUT /admin/orders/{id}/payment: overwrite payment status.
#[tracing::instrument(skip(state, body))]
pub async fn update_payment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<PaymentUpdateRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = path?;
    let Json(req) = body?;
    tracing::debug!(admin_id = %admin.id(), "admin payment update");

    Ok(Json(
        state
            .orders
            .update_payment_status(OrderId::new(id), req.payment_status)
            .await?,
    ))
}
