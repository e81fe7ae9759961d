//! Registration, login and profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::{AuthResponse, Credentials, Registration};
use store::{CommerceStore, User};

use crate::error::ApiError;
use crate::extract::AuthUser;
use crate::state::AppState;

/// POST /auth/register: create a customer account.
#[tracing::instrument(skip(state, body))]
pub async fn register<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<Registration>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let Json(registration) = body?;
    let response = state.auth.register(registration).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// POST /auth/login: sign in, folding any `guest_cart` into the user's cart.
#[tracing::instrument(skip(state, body))]
pub async fn login<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> Result<Json<AuthResponse>, ApiError> {
    let Json(credentials) = body?;
    Ok(Json(state.auth.login(credentials).await?))
}

/// GET /auth/profile: the signed-in user.
#[tracing::instrument(skip(state))]
pub async fn profile<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: AuthUser,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.auth.profile(user.id()).await?))
}
