//! Settlement configuration.
//!
//! Loaded from `SHOPFRONT_*` environment variables with fallback to defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use shopfront_core::{MAX_CART_LINES, MAX_LINE_QUANTITY, PAYMENT_TOLERANCE_CENTS};

/// Settlement configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementConfig {
    /// Allowed |total - paid| in cents (default: 1)
    pub payment_tolerance_cents: i64,

    /// How often a commit that lost a stock race is retried (default: 1)
    pub conflict_retries: u32,

    /// Distinct variants per cart (default: 100)
    pub max_cart_lines: usize,

    /// Quantity per variant (default: 999)
    pub max_line_quantity: i64,

    /// ISO 4217 code recorded on every order (default: EUR)
    pub currency: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        SettlementConfig {
            payment_tolerance_cents: PAYMENT_TOLERANCE_CENTS,
            conflict_retries: 1,
            max_cart_lines: MAX_CART_LINES,
            max_line_quantity: MAX_LINE_QUANTITY,
            currency: "EUR".to_string(),
        }
    }
}

impl SettlementConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let defaults = SettlementConfig::default();

        let config = SettlementConfig {
            payment_tolerance_cents: parse_var(
                "SHOPFRONT_PAYMENT_TOLERANCE_CENTS",
                defaults.payment_tolerance_cents,
            )?,

            conflict_retries: parse_var("SHOPFRONT_CONFLICT_RETRIES", defaults.conflict_retries)?,

            max_cart_lines: parse_var("SHOPFRONT_MAX_CART_LINES", defaults.max_cart_lines)?,

            max_line_quantity: parse_var(
                "SHOPFRONT_MAX_LINE_QUANTITY",
                defaults.max_line_quantity,
            )?,

            currency: env::var("SHOPFRONT_CURRENCY").unwrap_or(defaults.currency),
        };

        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load), but falls back to defaults on bad values.
    pub fn from_env() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Invalid settlement configuration, using defaults");
                SettlementConfig::default()
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.payment_tolerance_cents < 0 {
            return Err(ConfigError::InvalidValue(
                "SHOPFRONT_PAYMENT_TOLERANCE_CENTS".to_string(),
            ));
        }
        if self.max_cart_lines == 0 {
            return Err(ConfigError::InvalidValue("SHOPFRONT_MAX_CART_LINES".to_string()));
        }
        if self.max_line_quantity < 1 {
            return Err(ConfigError::InvalidValue(
                "SHOPFRONT_MAX_LINE_QUANTITY".to_string(),
            ));
        }
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidValue("SHOPFRONT_CURRENCY".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SettlementConfig::default();
        assert_eq!(config.payment_tolerance_cents, 1);
        assert_eq!(config.conflict_retries, 1);
        assert_eq!(config.max_cart_lines, 100);
        assert_eq!(config.max_line_quantity, 999);
        assert_eq!(config.currency, "EUR");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = SettlementConfig {
            currency: "euro".to_string(),
            ..SettlementConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue(_))));

        let config = SettlementConfig {
            payment_tolerance_cents: -1,
            ..SettlementConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_var_default_when_unset() {
        let value: u32 = parse_var("SHOPFRONT_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
