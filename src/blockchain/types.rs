//! Chain-specific types and error definitions.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::ChainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl ChainId {
    /// EIP-155 offset added to a recovery id: `chain_id * 2 + 35`.
    pub fn eip155_offset(self) -> u64 {
        self.0 * 2 + 35
    }
}

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Why the node refused a raw transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// The nonce was consumed by a transaction other than this one.
    NonceTooLow,
    /// The node already holds these exact bytes.
    AlreadyKnown,
    /// Fee or gas too low for the node to accept.
    Underpriced,
    /// Anything else that survived the single retry.
    Other,
}

impl std::fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionKind::NonceTooLow => write!(f, "nonce too low"),
            RejectionKind::AlreadyKnown => write!(f, "already known"),
            RejectionKind::Underpriced => write!(f, "underpriced"),
            RejectionKind::Other => write!(f, "other"),
        }
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Amount could not be converted to the smallest unit.
    #[error("Invalid amount '{input}': {reason}")]
    AmountFormat { input: String, reason: String },

    /// Field out of range for a transaction.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Recovered signer does not match the expected deposit address.
    #[error("Signature integrity check failed: expected {expected}, recovered {recovered}")]
    SignatureIntegrity { expected: Address, recovered: String },

    /// Node refused the raw transaction.
    #[error("Broadcast rejected ({kind}): {message}")]
    BroadcastRejected { kind: RejectionKind, message: String },
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// EIP-1559 fee parameters reported by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeData {
    /// Maximum total fee per gas in wei.
    pub max_fee_per_gas: u128,
    /// Maximum priority fee (tip) per gas in wei.
    pub max_priority_fee_per_gas: u128,
}

/// A value transfer as seen inside a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: TxHash,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub value: U256,
}

/// A block with its full transaction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    pub number: u64,
    pub transactions: Vec<ChainTransaction>,
}
