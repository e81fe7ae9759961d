//! HTTP route handlers.

pub mod admin;
pub mod auth;
pub mod cart;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod products;
pub mod users;

use domain::CommerceError;
use serde::Serialize;

use crate::error::ApiError;

/// Body of endpoints that only confirm an action.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

impl MessageResponse {
    pub fn new(message: &'static str) -> Self {
        Self { message }
    }
}

/// Converts a client-supplied quantity, rejecting zero, negatives and
/// values beyond `u32`.
pub(crate) fn quantity(value: i64) -> Result<u32, ApiError> {
    if value <= 0 {
        return Err(CommerceError::Validation("Quantity must be greater than 0".to_string()).into());
    }
    u32::try_from(value)
        .map_err(|_| CommerceError::Validation("Quantity is too large".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantity_bounds() {
        assert_eq!(quantity(3).unwrap(), 3);
        assert!(quantity(0).is_err());
        assert!(quantity(-1).is_err());
        assert!(quantity(i64::from(u32::MAX) + 1).is_err());
    }
}
