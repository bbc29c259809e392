//! Raw transaction submission with classified retry.
//!
//! # Classification
//! - "already known" → the node holds these bytes, reported as submitted
//! - "nonce too low" → terminal; already-submitted only when a receipt for
//!   this hash exists, otherwise another transaction took the nonce
//! - "gas too low" / "underpriced" → terminal, caller must re-fee
//! - anything else → one resubmission of the identical bytes after a fixed delay

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::blockchain::assembler::SignedTransaction;
use crate::blockchain::client::ChainRpc;
use crate::blockchain::types::{BlockchainError, BlockchainResult, RejectionKind};
use crate::observability::metrics;
use crate::resilience::retries::{BroadcastRetryPolicy, RetryDecision};

/// Reason string reported when the node has already seen the transaction.
pub const ALREADY_SUBMITTED: &str = "already-submitted";

/// Successful end states of a broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Accepted by the node.
    Submitted { tx_hash: TxHash, explorer_link: String },
    /// These bytes were mined by an earlier submission.
    AlreadySubmitted { tx_hash: TxHash },
}

/// Structured, serializable broadcast report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explorer_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&BlockchainResult<BroadcastOutcome>> for BroadcastResult {
    fn from(result: &BlockchainResult<BroadcastOutcome>) -> Self {
        match result {
            Ok(BroadcastOutcome::Submitted { tx_hash, explorer_link }) => Self {
                success: true,
                tx_hash: Some(*tx_hash),
                explorer_link: Some(explorer_link.clone()),
                reason: None,
                error: None,
            },
            Ok(BroadcastOutcome::AlreadySubmitted { tx_hash }) => Self {
                success: false,
                tx_hash: Some(*tx_hash),
                explorer_link: None,
                reason: Some(ALREADY_SUBMITTED.to_string()),
                error: None,
            },
            Err(BlockchainError::BroadcastRejected { kind, message }) => Self {
                success: false,
                tx_hash: None,
                explorer_link: None,
                reason: Some(kind.to_string()),
                error: Some(message.clone()),
            },
            Err(e) => Self {
                success: false,
                tx_hash: None,
                explorer_link: None,
                reason: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Classify a node error message.
pub fn classify_rejection(message: &str) -> RejectionKind {
    let lower = message.to_lowercase();
    if lower.contains("already known")
        || lower.contains("known transaction")
        || lower.contains("already imported")
    {
        RejectionKind::AlreadyKnown
    } else if lower.contains("nonce too low") {
        RejectionKind::NonceTooLow
    } else if lower.contains("gas too low") || lower.contains("underpriced") {
        RejectionKind::Underpriced
    } else {
        RejectionKind::Other
    }
}

/// Submits signed transactions through a [`ChainRpc`].
#[derive(Clone)]
pub struct Broadcaster {
    rpc: Arc<dyn ChainRpc>,
    explorer_url: String,
    retry_delay: Duration,
}

impl Broadcaster {
    pub fn new(rpc: Arc<dyn ChainRpc>, explorer_url: impl Into<String>, retry_delay: Duration) -> Self {
        Self {
            rpc,
            explorer_url: explorer_url.into().trim_end_matches('/').to_string(),
            retry_delay,
        }
    }

    /// Explorer link for a transaction hash.
    pub fn explorer_link(&self, tx_hash: &TxHash) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }

    /// Submit `tx`, retrying a transient failure exactly once with the same bytes.
    pub async fn broadcast(&self, tx: &SignedTransaction) -> BlockchainResult<BroadcastOutcome> {
        let mut policy = BroadcastRetryPolicy::new(self.retry_delay);

        loop {
            tracing::debug!(tx_hash = %tx.hash, raw = %tx.raw, "Broadcasting transaction");

            let message = match self.rpc.send_raw_transaction(&tx.raw).await {
                Ok(tx_hash) => return Ok(self.submitted(tx_hash, policy.attempts() + 1)),
                Err(e) => e.to_string(),
            };

            let kind = classify_rejection(&message);
            match kind {
                RejectionKind::AlreadyKnown => {
                    tracing::info!(tx_hash = %tx.hash, "Node already holds transaction");
                    return Ok(self.submitted(tx.hash, policy.attempts() + 1));
                }
                RejectionKind::NonceTooLow => return self.resolve_used_nonce(tx, message).await,
                _ => {}
            }

            match policy.on_failure(kind) {
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        tx_hash = %tx.hash,
                        error = %message,
                        delay_secs = delay.as_secs(),
                        "Broadcast failed, retrying once"
                    );
                    sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::error!(
                        tx_hash = %tx.hash,
                        error = %message,
                        kind = %kind,
                        attempts = policy.attempts(),
                        "Broadcast failed"
                    );
                    metrics::record_broadcast("rejected");
                    return Err(BlockchainError::BroadcastRejected { kind, message });
                }
            }
        }
    }

    fn submitted(&self, tx_hash: TxHash, attempts: u32) -> BroadcastOutcome {
        let explorer_link = self.explorer_link(&tx_hash);
        tracing::info!(
            tx_hash = %tx_hash,
            explorer_link = %explorer_link,
            attempts,
            "Transaction broadcast"
        );
        metrics::record_broadcast("submitted");
        BroadcastOutcome::Submitted { tx_hash, explorer_link }
    }

    /// The sender's nonce is behind this transaction. It was either mined
    /// from an earlier submission or taken by some other transaction.
    async fn resolve_used_nonce(
        &self,
        tx: &SignedTransaction,
        message: String,
    ) -> BlockchainResult<BroadcastOutcome> {
        if self.rpc.is_transaction_mined(tx.hash).await? {
            tracing::info!(tx_hash = %tx.hash, "Transaction already submitted");
            metrics::record_broadcast(ALREADY_SUBMITTED);
            return Ok(BroadcastOutcome::AlreadySubmitted { tx_hash: tx.hash });
        }

        tracing::error!(
            tx_hash = %tx.hash,
            nonce = tx.unsigned.nonce,
            error = %message,
            "Nonce used by a different transaction"
        );
        metrics::record_broadcast("rejected");
        Err(BlockchainError::BroadcastRejected {
            kind: RejectionKind::NonceTooLow,
            message,
        })
    }
}
