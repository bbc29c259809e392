//! Per-address nonce serialization.
//!
//! Holding an [`AddressLease`] is the only way to pick a nonce for an
//! address. The lease stays held until the transaction using it has been
//! submitted, so two payouts from one address never race for a nonce.
//! The last submitted nonce is remembered in case the node reports a stale
//! count right after submission.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-address locks.
#[derive(Clone, Default)]
pub struct NonceManager {
    slots: Arc<DashMap<Address, Arc<Mutex<Option<u64>>>>>,
}

impl NonceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive use of `address`.
    pub async fn lease(&self, address: Address) -> AddressLease {
        let slot = self.slots.entry(address).or_default().clone();
        AddressLease {
            address,
            last_submitted: slot.lock_owned().await,
        }
    }
}

/// Exclusive right to assign the next nonce of one address.
pub struct AddressLease {
    address: Address,
    last_submitted: OwnedMutexGuard<Option<u64>>,
}

impl AddressLease {
    pub fn address(&self) -> Address {
        self.address
    }

    /// Next nonce given the count reported by the chain.
    pub fn next_nonce(&self, chain_count: u64) -> u64 {
        match *self.last_submitted {
            Some(last) if last >= chain_count => last + 1,
            _ => chain_count,
        }
    }

    /// Record that `nonce` has reached the node.
    pub fn mark_submitted(&mut self, nonce: u64) {
        let last = (*self.last_submitted).map_or(nonce, |last| last.max(nonce));
        *self.last_submitted = Some(last);
    }
}
