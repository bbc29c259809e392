//! Address derivation collaborator.
//!
//! Maps a derivation path to the chain address whose key the remote signer
//! holds. Results are memoized since the mapping never changes.

use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::DerivationConfig;
use crate::signer::types::DerivationPath;

#[derive(Debug, Error)]
pub enum DerivationError {
    #[error("Derivation service unavailable: {0}")]
    Unavailable(String),

    #[error("Derivation service returned an invalid response: {0}")]
    InvalidResponse(String),
}

pub type DerivationResult<T> = Result<T, DerivationError>;

/// Remote key-derivation service.
#[async_trait]
pub trait AddressDeriver: Send + Sync {
    async fn derive_address(&self, path: &DerivationPath) -> DerivationResult<Address>;
}

#[derive(Debug, Serialize)]
struct DeriveRequest<'a> {
    public_key: &'a str,
    account_id: &'a str,
    path: &'a str,
    chain: &'a str,
}

#[derive(Debug, Deserialize)]
struct DeriveResponse {
    address: String,
}

/// HTTP client for the derivation service.
#[derive(Clone)]
pub struct HttpAddressDeriver {
    client: reqwest::Client,
    config: DerivationConfig,
    cache: Arc<DashMap<DerivationPath, Address>>,
}

impl HttpAddressDeriver {
    pub fn new(config: DerivationConfig) -> DerivationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DerivationError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            config,
            cache: Arc::new(DashMap::new()),
        })
    }
}

#[async_trait]
impl AddressDeriver for HttpAddressDeriver {
    async fn derive_address(&self, path: &DerivationPath) -> DerivationResult<Address> {
        if let Some(address) = self.cache.get(path) {
            return Ok(*address);
        }

        let request = DeriveRequest {
            public_key: &self.config.public_key,
            account_id: &self.config.account_id,
            path: path.as_str(),
            chain: &self.config.chain_tag,
        };

        let response = self
            .client
            .post(&self.config.url)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DerivationError::Unavailable(e.to_string()))?;

        let body: DeriveResponse = response
            .json()
            .await
            .map_err(|e| DerivationError::InvalidResponse(e.to_string()))?;

        let address: Address = body
            .address
            .parse()
            .map_err(|e| DerivationError::InvalidResponse(format!("'{}': {}", body.address, e)))?;

        tracing::debug!(path = %path, address = %address, "Derived address");
        self.cache.insert(path.clone(), address);
        Ok(address)
    }
}
