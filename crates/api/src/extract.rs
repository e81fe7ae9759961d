//! Bearer-token extractors.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use domain::{Claims, CommerceError};
use store::CommerceStore;

use crate::error::ApiError;
use crate::state::AppState;

/// The caller authenticated by an `Authorization: Bearer <token>` header.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> UserId {
        self.0.user_id()
    }
}

/// An authenticated caller with the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl AdminUser {
    pub fn id(&self) -> UserId {
        self.0.user_id()
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for AuthUser
where
    S: CommerceStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or_else(|| {
            metrics::counter!("auth_rejections_total", "reason" => "missing_token").increment(1);
            CommerceError::Unauthorized("Access token required".to_string())
        })?;

        let claims = state.auth.authenticate(token).inspect_err(|_| {
            metrics::counter!("auth_rejections_total", "reason" => "invalid_token").increment(1);
        })?;
        Ok(AuthUser(claims))
    }
}

impl<S> FromRequestParts<Arc<AppState<S>>> for AdminUser
where
    S: CommerceStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if !claims.is_admin() {
            metrics::counter!("auth_rejections_total", "reason" => "not_admin").increment(1);
            return Err(CommerceError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(AdminUser(claims))
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
