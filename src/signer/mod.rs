//! Remote signing subsystem.
//!
//! # Data Flow
//! ```text
//! SigningHash + DerivationPath
//!     → http.rs (POST to threshold signer, bounded by a deadline)
//!     → types.rs (normalize r/s, validate range, fold high s)
//!     → SignatureShare
//!
//! DerivationPath
//!     → derivation.rs (remote address derivation, memoized)
//!     → Address
//! ```
//!
//! No private key ever exists in this process. Neither call retries; the
//! caller decides what to do with `Unavailable`.

pub mod derivation;
pub mod http;
pub mod types;

use async_trait::async_trait;

use crate::blockchain::transaction::SigningHash;

pub use derivation::{AddressDeriver, DerivationError, HttpAddressDeriver};
pub use http::HttpSigner;
pub use types::{DerivationPath, SignatureShare, SignerError, SignerResult};

/// Threshold-signing service keyed by derivation path.
#[async_trait]
pub trait RemoteSigner: Send + Sync {
    /// Obtain a detached signature over `hash` from the key at `path`.
    async fn request_signature(
        &self,
        hash: SigningHash,
        path: &DerivationPath,
    ) -> SignerResult<SignatureShare>;
}
