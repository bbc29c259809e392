//! Signature assembly.
//!
//! Attaches a remote signature to an unsigned transaction, proves the
//! signature came from the expected key, and produces the raw bytes to
//! broadcast. A transaction whose signer cannot be confirmed is never
//! serialized.

use alloy::consensus::{SignableTransaction, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, Signature, TxHash, U256};
use serde::{Deserialize, Serialize};

use crate::blockchain::transaction::{compute_signing_hash, SigningHash, UnsignedTransaction};
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::signer::SignatureShare;

/// A signed, serialized, verified transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub unsigned: UnsignedTransaction,
    pub r: U256,
    pub s: U256,
    /// Chain-bound `v = recovery_id + chain_id * 2 + 35`.
    pub v: u64,
    /// Address recovered from the signature.
    pub signer: Address,
    /// Hash of the raw encoding, as the chain will report it.
    pub hash: TxHash,
    /// EIP-2718 encoded bytes.
    pub raw: Bytes,
}

impl SignedTransaction {
    /// y-parity recovered from the chain-bound `v`.
    pub fn y_parity(&self) -> bool {
        self.v - self.unsigned.chain_id.eip155_offset() == 1
    }
}

/// Attach `share` to `tx` after proving it recovers to `expected_signer`.
pub fn finalize(
    tx: &UnsignedTransaction,
    signing_hash: SigningHash,
    share: &SignatureShare,
    expected_signer: Address,
) -> BlockchainResult<SignedTransaction> {
    if compute_signing_hash(tx) != signing_hash {
        return Err(BlockchainError::InvalidTransaction(
            "signing hash does not belong to this transaction".to_string(),
        ));
    }

    let offset = tx.chain_id.eip155_offset();
    let v = u64::from(share.recovery_id) + offset;
    let signature = Signature::new(share.r, share.s, v - offset == 1);

    let recovered = signature
        .recover_address_from_prehash(&signing_hash)
        .map_err(|e| BlockchainError::SignatureIntegrity {
            expected: expected_signer,
            recovered: format!("<unrecoverable: {}>", e),
        })?;

    if recovered != expected_signer {
        return Err(BlockchainError::SignatureIntegrity {
            expected: expected_signer,
            recovered: recovered.to_string(),
        });
    }

    let signed = tx.to_eip1559().into_signed(signature);
    let hash = *signed.hash();
    let raw: Bytes = TxEnvelope::from(signed).encoded_2718().into();

    tracing::debug!(
        tx_hash = %hash,
        signer = %recovered,
        nonce = tx.nonce,
        "Transaction finalized"
    );

    Ok(SignedTransaction {
        unsigned: tx.clone(),
        r: share.r,
        s: share.s,
        v,
        signer: recovered,
        hash,
        raw,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::transaction::build;
    use crate::blockchain::types::{ChainId, FeeData};
    use alloy::primitives::{address, keccak256, B256};
    use alloy::signers::local::PrivateKeySigner;
    use alloy::signers::{Signer, SignerSync};

    // Anvil account 0.
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn key() -> PrivateKeySigner {
        TEST_PRIVATE_KEY.parse().unwrap()
    }

    fn unsigned() -> UnsignedTransaction {
        build(
            address!("70997970C51812dc3A010C7d01b50e0d17dc79C8"),
            "0.25",
            21_000,
            FeeData {
                max_fee_per_gas: 3_000_000_000,
                max_priority_fee_per_gas: 1_000_000_000,
            },
            3,
            ChainId(84532),
        )
        .unwrap()
    }

    fn share_for(hash: B256) -> SignatureShare {
        let sig = key().sign_hash_sync(&hash).unwrap();
        SignatureShare::new(sig.r(), sig.s(), sig.v() as u8).unwrap()
    }

    #[test]
    fn test_finalize_recovers_expected_signer() {
        let tx = unsigned();
        let hash = compute_signing_hash(&tx);
        let share = share_for(hash);

        let signed = finalize(&tx, hash, &share, key().address()).unwrap();
        assert_eq!(signed.signer, key().address());
        assert_eq!(signed.v, u64::from(share.recovery_id) + 84532 * 2 + 35);
        assert_eq!(signed.y_parity(), share.y_parity());
        assert_eq!(signed.raw[0], 0x02);
        assert_eq!(signed.hash, keccak256(&signed.raw));
    }

    #[test]
    fn test_expected_address_compare_ignores_case() {
        let tx = unsigned();
        let hash = compute_signing_hash(&tx);
        let lower: Address = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266".parse().unwrap();
        assert!(finalize(&tx, hash, &share_for(hash), lower).is_ok());
    }

    #[test]
    fn test_signature_over_other_hash_fails_integrity() {
        let tx = unsigned();
        let hash = compute_signing_hash(&tx);
        let foreign = share_for(B256::repeat_byte(0x11));

        let err = finalize(&tx, hash, &foreign, key().address()).unwrap_err();
        assert!(matches!(err, BlockchainError::SignatureIntegrity { .. }));
    }

    #[test]
    fn test_wrong_expected_signer_fails_integrity() {
        let tx = unsigned();
        let hash = compute_signing_hash(&tx);
        let err = finalize(&tx, hash, &share_for(hash), Address::ZERO).unwrap_err();
        assert!(matches!(err, BlockchainError::SignatureIntegrity { .. }));
    }

    #[test]
    fn test_hash_from_another_transaction_rejected() {
        let tx = unsigned();
        let mut other = tx.clone();
        other.nonce += 1;
        let other_hash = compute_signing_hash(&other);

        let err = finalize(&tx, other_hash, &share_for(other_hash), key().address()).unwrap_err();
        assert!(matches!(err, BlockchainError::InvalidTransaction(_)));
    }
}
