//! Transaction building and signing-hash computation.
//!
//! # Responsibilities
//! - Convert human amounts (major units) to wei with a fixed 18-decimal scale
//! - Build canonical type-2 (EIP-1559) unsigned transactions
//! - Compute the signing hash the remote signer must sign
//!
//! The signing hash is `keccak256(0x02 || rlp(fields))`; any implementation
//! encoding the same fields produces byte-identical output.

use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::primitives::{Address, TxKind, B256, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::blockchain::types::{BlockchainError, BlockchainResult, ChainId, FeeData};

/// Decimal places of the chain's native unit.
pub const NATIVE_DECIMALS: u32 = 18;

/// EIP-2718 type byte of fee-market transactions.
pub const EIP1559_TX_TYPE: u8 = 2;

/// Digest of the canonical unsigned encoding.
pub type SigningHash = B256;

/// A fully specified, not yet signed, value transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub to: Address,
    pub nonce: u64,
    /// Value in wei.
    pub value: U256,
    pub gas_limit: u64,
    pub max_priority_fee_per_gas: u128,
    pub max_fee_per_gas: u128,
    pub chain_id: ChainId,
    pub tx_type: u8,
}

impl UnsignedTransaction {
    /// The consensus representation used for hashing and serialization.
    pub fn to_eip1559(&self) -> TxEip1559 {
        TxEip1559 {
            chain_id: self.chain_id.0,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            max_fee_per_gas: self.max_fee_per_gas,
            max_priority_fee_per_gas: self.max_priority_fee_per_gas,
            to: TxKind::Call(self.to),
            value: self.value,
            ..Default::default()
        }
    }
}

/// Build an unsigned type-2 transfer from a minimal intent.
///
/// `amount` is in major units (e.g. "0.05" ETH) and is converted with
/// [`NATIVE_DECIMALS`]. Fails with `AmountFormat` on non-numeric, negative,
/// or over-precise input.
pub fn build(
    destination: Address,
    amount: &str,
    gas_limit: u64,
    fee_data: FeeData,
    nonce: u64,
    chain_id: ChainId,
) -> BlockchainResult<UnsignedTransaction> {
    let value = parse_amount(amount)?;

    if gas_limit == 0 {
        return Err(BlockchainError::InvalidTransaction("gas limit is zero".to_string()));
    }
    if fee_data.max_priority_fee_per_gas > fee_data.max_fee_per_gas {
        return Err(BlockchainError::InvalidTransaction(format!(
            "priority fee {} exceeds max fee {}",
            fee_data.max_priority_fee_per_gas, fee_data.max_fee_per_gas
        )));
    }

    Ok(UnsignedTransaction {
        to: destination,
        nonce,
        value,
        gas_limit,
        max_priority_fee_per_gas: fee_data.max_priority_fee_per_gas,
        max_fee_per_gas: fee_data.max_fee_per_gas,
        chain_id,
        tx_type: EIP1559_TX_TYPE,
    })
}

/// Hash of the canonical unsigned encoding. Pure and deterministic.
pub fn compute_signing_hash(tx: &UnsignedTransaction) -> SigningHash {
    tx.to_eip1559().signature_hash()
}

/// Parse a major-unit amount string into wei.
pub fn parse_amount(input: &str) -> BlockchainResult<U256> {
    let trimmed = input.trim();
    let amount = Decimal::from_str(trimmed).map_err(|e| BlockchainError::AmountFormat {
        input: input.to_string(),
        reason: e.to_string(),
    })?;
    decimal_to_wei(amount).map_err(|e| match e {
        BlockchainError::AmountFormat { reason, .. } => BlockchainError::AmountFormat {
            input: input.to_string(),
            reason,
        },
        other => other,
    })
}

/// Convert a major-unit decimal into wei.
pub fn decimal_to_wei(amount: Decimal) -> BlockchainResult<U256> {
    let format_err = |reason: &str| BlockchainError::AmountFormat {
        input: amount.to_string(),
        reason: reason.to_string(),
    };

    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(format_err("amount is negative"));
    }

    let normalized = amount.normalize();
    let scale = normalized.scale();
    if scale > NATIVE_DECIMALS {
        return Err(format_err("more than 18 decimal places"));
    }

    let mantissa = normalized.mantissa().unsigned_abs();
    let factor = U256::from(10u64).pow(U256::from(NATIVE_DECIMALS - scale));
    Ok(U256::from(mantissa) * factor)
}

/// Convert wei into a major-unit decimal.
///
/// Returns `None` when the value exceeds what a `Decimal` can carry at
/// 18-decimal scale (about 7.9e10 units).
pub fn wei_to_decimal(wei: U256) -> Option<Decimal> {
    let raw = i128::try_from(u128::try_from(wei).ok()?).ok()?;
    Decimal::try_from_i128_with_scale(raw, NATIVE_DECIMALS)
        .ok()
        .map(|d| d.normalize())
}
