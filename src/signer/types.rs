//! Signature request/response types and normalization.

use alloy::hex;
use alloy::primitives::{uint, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::blockchain::transaction::SigningHash;

/// Order of the secp256k1 group.
pub const SECP256K1_ORDER: U256 =
    uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

/// Errors from the remote signer round-trip.
#[derive(Debug, Error)]
pub enum SignerError {
    /// Transport failure or server-side error. Retry is the caller's call.
    #[error("Signer unavailable: {0}")]
    Unavailable(String),

    /// Response was malformed or the request was refused.
    #[error("Signer rejected: {0}")]
    Rejected(String),

    /// No response within the configured deadline.
    #[error("Signer timed out after {0} seconds")]
    Timeout(u64),
}

/// Result type for signer operations.
pub type SignerResult<T> = Result<T, SignerError>;

/// Identifies which key the remote signer uses.
///
/// The same path always derives the same address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivationPath(String);

impl DerivationPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Path of the deposit address for one team of a match.
    pub fn deposit(match_id: &str, team: &str) -> Self {
        Self(format!("{}{}", match_id, team))
    }

    /// Match-level path that payouts are signed with.
    pub fn settlement(match_id: &str) -> Self {
        Self(match_id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Body sent to the signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRequest {
    pub path: DerivationPath,
    /// The 32-byte signing hash as a plain byte array.
    pub payload: [u8; 32],
}

impl SignatureRequest {
    pub fn new(hash: SigningHash, path: &DerivationPath) -> Self {
        Self {
            path: path.clone(),
            payload: hash.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BigR {
    /// Compressed R point, hex, usually with a 02/03 marker byte.
    pub affine_point: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scalar {
    pub scalar: String,
}

/// Raw response of the signing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureResponse {
    pub big_r: BigR,
    pub s: Scalar,
    pub recovery_id: u8,
}

impl SignatureResponse {
    /// Normalize into a validated [`SignatureShare`].
    pub fn into_share(self) -> SignerResult<SignatureShare> {
        let r = normalize_scalar("r", &self.big_r.affine_point)?;
        let s = normalize_scalar("s", &self.s.scalar)?;
        SignatureShare::new(r, s, self.recovery_id)
    }
}

/// A detached ECDSA signature in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare {
    pub r: U256,
    pub s: U256,
    /// 0 or 1.
    pub recovery_id: u8,
}

impl SignatureShare {
    /// Validate components and fold a high `s` into the lower half-order.
    ///
    /// Nodes only accept `s <= n/2`; `(r, n - s)` with the flipped recovery
    /// id is the same signature.
    pub fn new(r: U256, s: U256, recovery_id: u8) -> SignerResult<Self> {
        if recovery_id > 1 {
            return Err(SignerError::Rejected(format!(
                "recovery id {} is not 0 or 1",
                recovery_id
            )));
        }
        check_range("r", r)?;
        check_range("s", s)?;

        let half_order = SECP256K1_ORDER >> 1;
        if s > half_order {
            return Ok(Self {
                r,
                s: SECP256K1_ORDER - s,
                recovery_id: recovery_id ^ 1,
            });
        }
        Ok(Self { r, s, recovery_id })
    }

    /// y-parity bit as used by typed transactions.
    pub fn y_parity(&self) -> bool {
        self.recovery_id == 1
    }
}

fn check_range(field: &str, value: U256) -> SignerResult<()> {
    if value.is_zero() {
        return Err(SignerError::Rejected(format!("{} is zero", field)));
    }
    if value >= SECP256K1_ORDER {
        return Err(SignerError::Rejected(format!("{} is not below the curve order", field)));
    }
    Ok(())
}

/// Interpret a loosely formatted hex scalar as a 32-byte big-endian integer.
///
/// Accepts an optional `0x` prefix, a 33-byte compressed-point form with a
/// 02/03 marker byte, and fewer than 64 hex digits (left-padded with zeros).
pub fn normalize_scalar(field: &str, raw: &str) -> SignerResult<U256> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let digits = if digits.len() == 66 && (digits.starts_with("02") || digits.starts_with("03")) {
        &digits[2..]
    } else {
        digits
    };

    if digits.is_empty() {
        return Err(SignerError::Rejected(format!("{} is empty", field)));
    }
    if digits.len() > 64 {
        return Err(SignerError::Rejected(format!(
            "{} has {} hex digits, expected at most 64",
            field,
            digits.len()
        )));
    }

    let padded = format!("{:0>64}", digits);
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(&padded, &mut bytes)
        .map_err(|e| SignerError::Rejected(format!("{} is not hex: {}", field, e)))?;
    Ok(U256::from_be_bytes(bytes))
}
