//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! payment intent
//!     → transaction.rs (amount → wei, type-2 tx, signing hash)
//!     → [remote signer]
//!     → assembler.rs (attach signature, verify signer, serialize)
//!     → broadcast.rs (submit, classify errors, single retry)
//!     → client.rs (RPC with failover and timeouts)
//!
//! client.rs → subscription.rs (ordered block stream) → settlement observer
//! ```
//!
//! # Security Constraints
//! - No private keys in this process; signatures come from the remote signer
//! - A signature that does not recover to the expected address is never broadcast
//! - All RPC calls have configurable timeouts

pub mod assembler;
pub mod broadcast;
pub mod client;
pub mod nonce;
pub mod subscription;
pub mod transaction;
pub mod types;

pub use assembler::SignedTransaction;
pub use broadcast::{BroadcastOutcome, BroadcastResult, Broadcaster};
pub use client::{BlockchainClient, ChainRpc};
pub use nonce::NonceManager;
pub use transaction::{SigningHash, UnsignedTransaction};
pub use types::{BlockchainError, BlockchainResult, ChainBlock, ChainId, ChainTransaction, FeeData};
