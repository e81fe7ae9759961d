//! Application configuration loaded from environment variables.

use std::str::FromStr;

use common::Money;
use domain::auth::{DEFAULT_TOKEN_TTL_HOURS, MAX_TOKEN_TTL_HOURS};
use domain::{PricingPolicy, ShippingPolicy};

const DEFAULT_JWT_SECRET: &str = "development-secret-change-me";

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `JWT_SECRET`: token signing secret (development default)
/// - `TOKEN_TTL_HOURS`: token lifetime, 1 hour to 10 years (default: `168`)
/// - `CHECKOUT_TAX_BPS`: checkout tax in basis points (default: `1000`)
/// - `CHECKOUT_SHIPPING_FLAT`: checkout shipping in minor units (default: `10000`)
/// - `SUMMARY_TAX_BPS`: cart summary tax in basis points (default: `1100`)
/// - `ADMIN_EMAIL` / `ADMIN_PASSWORD`: bootstrap administrator, created when both are set
///
/// Unparseable or out-of-range numbers fall back to their defaults.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub checkout_tax_bps: u32,
    pub checkout_shipping_flat: i64,
    pub summary_tax_bps: u32,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: text("HOST").unwrap_or(defaults.host),
            port: number(text("PORT")).unwrap_or(defaults.port),
            log_level: text("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: text("DATABASE_URL"),
            database_max_connections: number(text("DATABASE_MAX_CONNECTIONS"))
                .unwrap_or(defaults.database_max_connections),
            jwt_secret: text("JWT_SECRET").unwrap_or(defaults.jwt_secret),
            token_ttl_hours: number(text("TOKEN_TTL_HOURS"))
                .filter(|hours| (1..=MAX_TOKEN_TTL_HOURS).contains(hours))
                .unwrap_or(defaults.token_ttl_hours),
            checkout_tax_bps: number(text("CHECKOUT_TAX_BPS")).unwrap_or(defaults.checkout_tax_bps),
            checkout_shipping_flat: number(text("CHECKOUT_SHIPPING_FLAT"))
                .unwrap_or(defaults.checkout_shipping_flat),
            summary_tax_bps: number(text("SUMMARY_TAX_BPS")).unwrap_or(defaults.summary_tax_bps),
            admin_email: text("ADMIN_EMAIL"),
            admin_password: text("ADMIN_PASSWORD"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns true if the default signing secret is in use.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        let hours = self.token_ttl_hours.clamp(1, MAX_TOKEN_TTL_HOURS);
        chrono::Duration::hours(hours)
    }

    /// Pricing applied when an order is placed.
    pub fn checkout_pricing(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_bps: self.checkout_tax_bps,
            shipping: ShippingPolicy::Flat(Money::new(self.checkout_shipping_flat)),
        }
    }

    /// Pricing shown by the cart summary.
    pub fn summary_pricing(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_bps: self.summary_tax_bps,
            ..PricingPolicy::cart_summary()
        }
    }
}

fn number<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        let checkout = PricingPolicy::checkout();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
            checkout_tax_bps: checkout.tax_rate_bps,
            checkout_shipping_flat: checkout.shipping.cost().amount(),
            summary_tax_bps: PricingPolicy::cart_summary().tax_rate_bps,
            admin_email: None,
            admin_password: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.token_ttl_hours, 168);
        assert_eq!(config.checkout_tax_bps, 1000);
        assert_eq!(config.checkout_shipping_flat, 10_000);
        assert_eq!(config.summary_tax_bps, 1100);
        assert!(config.database_url.is_none());
        assert!(config.uses_default_secret());
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_lookup_overrides() {
        let config = from_pairs(&[
            ("PORT", "8081"),
            ("DATABASE_URL", "postgres://localhost/shop"),
            ("CHECKOUT_TAX_BPS", "1200"),
            ("JWT_SECRET", "s3cret"),
        ]);
        assert_eq!(config.port, 8081);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/shop")
        );
        assert_eq!(config.checkout_pricing().tax_rate_bps, 1200);
        assert!(!config.uses_default_secret());
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = from_pairs(&[
            ("PORT", "eighty"),
            ("SUMMARY_TAX_BPS", "-5"),
            ("DATABASE_URL", " "),
        ]);
        assert_eq!(config.port, 3000);
        assert_eq!(config.summary_tax_bps, 1100);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_token_ttl_out_of_range_falls_back() {
        for value in ["0", "-3", "9223372036854775807", "87601"] {
            let config = from_pairs(&[("TOKEN_TTL_HOURS", value)]);
            assert_eq!(config.token_ttl_hours, 168, "TOKEN_TTL_HOURS={value}");
        }

        let config = from_pairs(&[("TOKEN_TTL_HOURS", "87600")]);
        assert_eq!(config.token_ttl(), chrono::Duration::hours(87_600));

        let config = Config {
            token_ttl_hours: i64::MAX,
            ..Config::default()
        };
        assert_eq!(config.token_ttl(), chrono::Duration::hours(87_600));
    }

    #[test]
    fn test_pricing_policies() {
        let config = Config::default();
        assert_eq!(config.checkout_pricing(), PricingPolicy::checkout());
        assert_eq!(config.summary_pricing(), PricingPolicy::cart_summary());
    }
}
