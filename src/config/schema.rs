//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the settlement
//! service. All types derive Serde traits for deserialization from config files.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Environment variable that overrides `admin.api_key`.
pub const ADMIN_API_KEY_ENV_VAR: &str = "WAGER_ADMIN_API_KEY";

/// Placeholder key shipped in the defaults. Rejected when the admin API is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

/// Root configuration for the settlement service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Chain RPC and transaction defaults.
    pub chain: ChainConfig,

    /// Remote threshold-signing service.
    pub signer: SignerConfig,

    /// Remote address-derivation service.
    pub derivation: DerivationConfig,

    /// Broadcast retry policy.
    pub broadcast: BroadcastConfig,

    /// Payout computation and record store.
    pub settlement: SettlementConfig,

    /// Transfer observer.
    pub observer: ObserverConfig,

    /// Operator API.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Chain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (84532 for Base Sepolia, 8453 for Base).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Block explorer base URL, used for `{explorer_url}/tx/{hash}` links.
    pub explorer_url: String,

    /// Native currency symbol for log output.
    pub currency: String,

    /// Gas limit for plain value transfers.
    pub gas_limit: u64,

    /// Interval between polls for new blocks in milliseconds.
    pub poll_interval_ms: u64,

    /// Consecutive failed polls before the block stream gives up.
    pub max_consecutive_poll_errors: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://base-sepolia-rpc.publicnode.com".to_string(),
            failover_urls: Vec::new(),
            chain_id: 84532,
            rpc_timeout_secs: 10,
            explorer_url: "https://sepolia.basescan.org".to_string(),
            currency: "ETH".to_string(),
            gas_limit: 21_000,
            poll_interval_ms: 2_000,
            max_consecutive_poll_errors: 10,
        }
    }
}

/// Remote signer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SignerConfig {
    /// Endpoint accepting `{path, payload}` signature requests.
    pub url: String,

    /// Upper bound on a single signing round-trip in seconds.
    pub timeout_secs: u64,
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3140/signature".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Address derivation service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DerivationConfig {
    /// Endpoint accepting derivation requests.
    pub url: String,

    /// Root public key of the threshold signer.
    pub public_key: String,

    /// Account the derivation is scoped to.
    pub account_id: String,

    /// Chain tag passed to the derivation service.
    pub chain_tag: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for DerivationConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3140/address".to_string(),
            public_key: String::new(),
            account_id: String::new(),
            chain_tag: "evm".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Broadcast retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Fixed delay before the single retry of a transient failure.
    pub retry_delay_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            retry_delay_secs: 15,
        }
    }
}

/// Settlement configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SettlementConfig {
    /// Fraction of the pool retained by the platform.
    pub platform_fee_rate: Decimal,

    /// Absolute tolerance when matching a transfer amount to a bet.
    pub amount_tolerance: Decimal,

    /// JSON file backing the match store. Empty keeps the store in memory.
    pub store_path: String,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            platform_fee_rate: dec!(0.001),
            amount_tolerance: dec!(0.0001),
            store_path: "data/matches.json".to_string(),
        }
    }
}

/// Transfer observer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObserverConfig {
    /// Watch blocks for incoming bet transfers.
    pub enabled: bool,

    /// Seconds between deposit address snapshot refreshes. 0 disables refresh.
    pub snapshot_refresh_secs: u64,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            snapshot_refresh_secs: 60,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
