//! Back-office user endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::UserId;
use domain::{AccountUpdate, NewAccount, UserFilter, UserListing};
use store::{CommerceStore, User};

use super::MessageResponse;
use crate::error::ApiError;
use crate::extract::AdminUser;
use crate::state::AppState;

/// GET /admin/users: filtered, paginated user listing.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    query: Result<Query<UserFilter>, QueryRejection>,
) -> Result<Json<UserListing>, ApiError> {
    let Query(filter) = query?;
    Ok(Json(state.users.list(filter).await?))
}

/// GET /admin/users/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(id) = path?;
    Ok(Json(state.users.get(UserId::new(id)).await?))
}

/// POST /admin/users: create an account with any role.
#[tracing::instrument(skip(state, body))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    body: Result<Json<NewAccount>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let Json(account) = body?;
    let user = state.users.create(account).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /admin/users/{id}: change account fields.
#[tracing::instrument(skip(state, body))]
pub async fn update<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
    body: Result<Json<AccountUpdate>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let Path(id) = path?;
    let Json(update) = body?;
    Ok(Json(
        state
            .users
            .update(admin.id(), UserId::new(id), update)
            .await?,
    ))
}

/// DELETE /admin/users/{id}: deactivate an account.
#[tracing::instrument(skip(state))]
pub async fn delete<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminUser,
    path: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = path?;
    state.users.deactivate(admin.id(), UserId::new(id)).await?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}
