//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::CommerceError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed request that never reached the domain.
    BadRequest(String),
    /// Domain error.
    Domain(CommerceError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Domain(err) => domain_status(err),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Domain(err) => err.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();

        let message = match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Domain(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, "internal server error");
                "Internal server error".to_string()
            }
            ApiError::Domain(err) => err.to_string(),
        };

        let body = serde_json::json!({ "error": message, "code": code });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_status(err: &CommerceError) -> StatusCode {
    match err {
        CommerceError::Validation(_)
        | CommerceError::EmptyCart
        | CommerceError::InsufficientStock { .. }
        | CommerceError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        CommerceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        CommerceError::Forbidden(_) => StatusCode::FORBIDDEN,
        CommerceError::NotFound(_) => StatusCode::NOT_FOUND,
        CommerceError::Conflict(_)
        | CommerceError::InvalidState(_)
        | CommerceError::Store(StoreError::ConcurrencyConflict { .. }) => StatusCode::CONFLICT,
        CommerceError::Internal(_) | CommerceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CommerceError> for ApiError {
    fn from(err: CommerceError) -> Self {
        ApiError::Domain(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Domain(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, OrderStatus};

    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (CommerceError::EmptyCart, StatusCode::BAD_REQUEST),
            (
                CommerceError::InvalidTransition {
                    order_id: OrderId::new(1),
                    current: OrderStatus::Shipped,
                    action: "cancel",
                },
                StatusCode::BAD_REQUEST,
            ),
            (
                CommerceError::Unauthorized("no".into()),
                StatusCode::UNAUTHORIZED,
            ),
            (CommerceError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (CommerceError::NotFound("no".into()), StatusCode::NOT_FOUND),
            (CommerceError::Conflict("no".into()), StatusCode::CONFLICT),
            (CommerceError::InvalidState("no".into()), StatusCode::CONFLICT),
            (
                CommerceError::Store(StoreError::Decode("bad".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status(), expected);
        }
    }

    #[tokio::test]
    async fn test_internal_errors_hide_details() {
        let response =
            ApiError::from(CommerceError::Internal("secret detail".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert_eq!(json["code"], "internal");
    }
}
