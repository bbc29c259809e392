//! HTTP bridge to the threshold signer.

use async_trait::async_trait;
use std::time::Duration;

use crate::blockchain::transaction::SigningHash;
use crate::config::SignerConfig;
use crate::observability::metrics;
use crate::resilience::timeouts::with_deadline;
use crate::signer::types::{
    DerivationPath, SignatureRequest, SignatureResponse, SignatureShare, SignerError, SignerResult,
};
use crate::signer::RemoteSigner;

/// Signer client posting `{path, payload}` and parsing `{big_r, s, recovery_id}`.
#[derive(Clone)]
pub struct HttpSigner {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpSigner {
    pub fn new(config: &SignerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config.url.clone(),
            timeout_secs: config.timeout_secs,
        }
    }

    async fn round_trip(&self, request: &SignatureRequest) -> SignerResult<SignatureShare> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(SignerError::Unavailable(format!("signer returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SignerError::Rejected(format!("signer returned {}: {}", status, body)));
        }

        let parsed: SignatureResponse = response
            .json()
            .await
            .map_err(|e| SignerError::Rejected(format!("malformed signer response: {}", e)))?;

        parsed.into_share()
    }
}

#[async_trait]
impl RemoteSigner for HttpSigner {
    async fn request_signature(
        &self,
        hash: SigningHash,
        path: &DerivationPath,
    ) -> SignerResult<SignatureShare> {
        let request = SignatureRequest::new(hash, path);
        tracing::debug!(path = %path, hash = %hash, "Requesting signature");

        let result = match with_deadline(
            Duration::from_secs(self.timeout_secs),
            self.round_trip(&request),
        )
        .await
        {
            Some(result) => result,
            None => Err(SignerError::Timeout(self.timeout_secs)),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(SignerError::Rejected(_)) => "rejected",
            Err(_) => "unavailable",
        };
        metrics::record_signer_request(outcome);

        if let Err(e) = &result {
            tracing::warn!(path = %path, error = %e, "Signature request failed");
        }
        result
    }
}

impl std::fmt::Debug for HttpSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSigner")
            .field("url", &self.url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::B256;

    #[tokio::test]
    async fn test_unreachable_signer_is_unavailable() {
        let signer = HttpSigner::new(&SignerConfig {
            url: "http://127.0.0.1:1/signature".to_string(),
            timeout_secs: 5,
        });
        let err = signer
            .request_signature(B256::ZERO, &DerivationPath::new("m1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SignerError::Unavailable(_) | SignerError::Timeout(_)));
    }
}
