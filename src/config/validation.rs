//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (fee rate, tolerance, gas limit)
//! - Check that every endpoint URL parses
//!
//! Returns all validation errors, not just the first.

use rust_decimal::Decimal;

use crate::config::schema::{ServiceConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_url(&mut errors, "chain.rpc_url", &config.chain.rpc_url);
    for url in &config.chain.failover_urls {
        check_url(&mut errors, "chain.failover_urls", url);
    }
    check_url(&mut errors, "chain.explorer_url", &config.chain.explorer_url);
    check_url(&mut errors, "signer.url", &config.signer.url);
    check_url(&mut errors, "derivation.url", &config.derivation.url);

    if config.chain.chain_id == 0 {
        errors.push(ValidationError::new("chain.chain_id", "must be non-zero"));
    }
    if config.chain.gas_limit == 0 {
        errors.push(ValidationError::new("chain.gas_limit", "must be non-zero"));
    }
    if config.chain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("chain.rpc_timeout_secs", "must be non-zero"));
    }
    if config.signer.timeout_secs == 0 {
        errors.push(ValidationError::new("signer.timeout_secs", "must be non-zero"));
    }

    let fee = config.settlement.platform_fee_rate;
    if fee < Decimal::ZERO || fee >= Decimal::ONE {
        errors.push(ValidationError::new(
            "settlement.platform_fee_rate",
            format!("{} is outside [0, 1)", fee),
        ));
    }
    if config.settlement.amount_tolerance < Decimal::ZERO {
        errors.push(ValidationError::new(
            "settlement.amount_tolerance",
            "must not be negative",
        ));
    }

    if config.admin.enabled && config.admin.api_key == PLACEHOLDER_API_KEY {
        errors.push(ValidationError::new(
            "admin.api_key",
            "placeholder key must be replaced when the admin API is enabled",
        ));
    }
    if config.admin.enabled && config.admin.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new("admin.bind_address", "not a socket address"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_url(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if let Err(e) = value.parse::<url::Url>() {
        errors.push(ValidationError::new(field, format!("invalid URL '{}': {}", value, e)));
    }
}
