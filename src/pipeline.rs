//! Payment pipeline: intent → unsigned tx → remote signature → verified
//! raw tx → broadcast.
//!
//! The nonce lease for the sending address is held from the nonce read
//! until the node has accepted (or already knows) the transaction.
//! Preparing and submitting are separate steps so a caller can record the
//! signed bytes before they leave the process, and later resend exactly
//! those bytes instead of signing a second payment.

use alloy::primitives::Address;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::assembler::{finalize, SignedTransaction};
use crate::blockchain::transaction::{build, compute_signing_hash, wei_to_decimal};
use crate::blockchain::{
    BlockchainError, BroadcastOutcome, Broadcaster, ChainId, ChainRpc, NonceManager,
};
use crate::blockchain::nonce::AddressLease;
use crate::settlement::types::PayoutInstruction;
use crate::signer::{DerivationPath, RemoteSigner, SignerError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

/// A payment to make from a remotely held key.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    /// Key the remote signer signs with.
    pub path: DerivationPath,
    /// Address that `path` derives to.
    pub from: Address,
    pub to: Address,
    /// Major units, e.g. "0.05".
    pub amount: String,
}

/// A signed payment whose nonce is still reserved.
///
/// Dropping it without submitting releases the nonce unused.
pub struct PreparedPayment {
    pub signed: SignedTransaction,
    lease: AddressLease,
}

impl PreparedPayment {
    pub fn new(signed: SignedTransaction, lease: AddressLease) -> Self {
        Self { signed, lease }
    }
}

/// Sends payouts on behalf of the settlement engine.
#[async_trait]
pub trait PayoutSender: Send + Sync {
    /// Build and sign a payout without sending it.
    async fn prepare_payout(
        &self,
        instruction: &PayoutInstruction,
        from: Address,
    ) -> PipelineResult<PreparedPayment>;

    /// Broadcast a prepared payout.
    async fn submit_payout(&self, prepared: PreparedPayment) -> PipelineResult<BroadcastOutcome>;

    /// Resend bytes signed by an earlier attempt.
    async fn resubmit_payout(&self, signed: &SignedTransaction) -> PipelineResult<BroadcastOutcome>;
}

pub struct PaymentPipeline {
    rpc: Arc<dyn ChainRpc>,
    signer: Arc<dyn RemoteSigner>,
    broadcaster: Broadcaster,
    nonces: NonceManager,
    chain_id: ChainId,
    gas_limit: u64,
    currency: String,
}

impl PaymentPipeline {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn RemoteSigner>,
        broadcaster: Broadcaster,
        chain_id: ChainId,
        gas_limit: u64,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            rpc,
            signer,
            broadcaster,
            nonces: NonceManager::new(),
            chain_id,
            gas_limit,
            currency: currency.into(),
        }
    }

    /// Build, sign, verify and broadcast one payment.
    pub async fn send(&self, intent: &PaymentIntent) -> PipelineResult<BroadcastOutcome> {
        let prepared = self.prepare(intent).await?;
        self.submit(prepared).await
    }

    /// Build, sign and verify one payment, keeping its nonce reserved.
    pub async fn prepare(&self, intent: &PaymentIntent) -> PipelineResult<PreparedPayment> {
        let lease = self.nonces.lease(intent.from).await;

        match self.rpc.get_balance(intent.from).await {
            Ok(balance) => tracing::info!(
                from = %intent.from,
                balance = %wei_to_decimal(balance).unwrap_or_default(),
                currency = %self.currency,
                "Sender balance"
            ),
            Err(e) => tracing::warn!(from = %intent.from, error = %e, "Balance lookup failed"),
        }

        let chain_count = self.rpc.get_transaction_count(intent.from).await?;
        let nonce = lease.next_nonce(chain_count);
        let fee_data = self.rpc.get_fee_data().await?;

        let unsigned = build(
            intent.to,
            &intent.amount,
            self.gas_limit,
            fee_data,
            nonce,
            self.chain_id,
        )?;
        let signing_hash = compute_signing_hash(&unsigned);

        tracing::info!(
            path = %intent.path,
            from = %intent.from,
            to = %intent.to,
            amount = %intent.amount,
            currency = %self.currency,
            nonce,
            "Requesting payment signature"
        );
        let share = self.signer.request_signature(signing_hash, &intent.path).await?;
        let signed = finalize(&unsigned, signing_hash, &share, intent.from)?;

        Ok(PreparedPayment::new(signed, lease))
    }

    /// Broadcast a prepared payment and release its nonce.
    pub async fn submit(&self, prepared: PreparedPayment) -> PipelineResult<BroadcastOutcome> {
        let PreparedPayment { signed, mut lease } = prepared;
        let outcome = self.broadcaster.broadcast(&signed).await?;
        lease.mark_submitted(signed.unsigned.nonce);
        Ok(outcome)
    }

    /// Broadcast previously signed bytes again.
    pub async fn resubmit(&self, signed: &SignedTransaction) -> PipelineResult<BroadcastOutcome> {
        let mut lease = self.nonces.lease(signed.signer).await;
        let outcome = self.broadcaster.broadcast(signed).await?;
        lease.mark_submitted(signed.unsigned.nonce);
        Ok(outcome)
    }
}

#[async_trait]
impl PayoutSender for PaymentPipeline {
    async fn prepare_payout(
        &self,
        instruction: &PayoutInstruction,
        from: Address,
    ) -> PipelineResult<PreparedPayment> {
        let intent = PaymentIntent {
            path: instruction.source_path.clone(),
            from,
            to: instruction.recipient,
            amount: instruction.amount.normalize().to_string(),
        };
        self.prepare(&intent).await
    }

    async fn submit_payout(&self, prepared: PreparedPayment) -> PipelineResult<BroadcastOutcome> {
        self.submit(prepared).await
    }

    async fn resubmit_payout(&self, signed: &SignedTransaction) -> PipelineResult<BroadcastOutcome> {
        self.resubmit(signed).await
    }
}
