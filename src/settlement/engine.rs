//! Settlement engine.
//!
//! Sole writer of `Bet::verified` and `Match::completed`. Transfers are
//! reconciled against bets; distribution computes proportional payouts net
//! of the platform fee and routes each one through the payment pipeline.

use alloy::primitives::{Address, TxHash};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::blockchain::transaction::NATIVE_DECIMALS;
use crate::blockchain::types::RejectionKind;
use crate::blockchain::{BlockchainError, BroadcastOutcome};
use crate::config::SettlementConfig;
use crate::observability::metrics;
use crate::pipeline::{PayoutSender, PipelineError};
use crate::settlement::observer::TransferHandler;
use crate::settlement::store::MatchStore;
use crate::settlement::types::{
    Bet, BetRequest, DistributionResult, Match, ObservedTransfer, PayoutInstruction, PayoutRecord,
    PayoutStatus, SettlementError, SettlementResult, StoreError,
};
use crate::signer::{AddressDeriver, DerivationPath};

/// A bet flipped to verified by a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedBet {
    pub match_id: String,
    pub bet_index: usize,
    pub bettor_handle: String,
    pub team_name: String,
    pub amount: Decimal,
    pub tx_hash: TxHash,
}

/// Pool split for one distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutPlan {
    pub platform_fee: Decimal,
    pub distributable: Decimal,
    /// (bet index, amount) per winning bet.
    pub shares: Vec<(usize, Decimal)>,
}

/// Split `total_bet_amount` among `winning` bets in proportion to their size.
///
/// `pool = total × (1 − fee_rate)`, each winner gets `bet × pool / Σ winning`,
/// truncated to the chain's 18 decimals.
pub fn compute_payouts(
    total_bet_amount: Decimal,
    fee_rate: Decimal,
    winning: &[(usize, Decimal)],
) -> SettlementResult<PayoutPlan> {
    let overflow = || SettlementError::DistributionPrecondition("payout arithmetic overflow".to_string());

    let winning_total: Decimal = winning.iter().map(|(_, amount)| *amount).sum();
    if winning_total <= Decimal::ZERO {
        return Err(SettlementError::DistributionPrecondition(
            "winning bets sum to zero".to_string(),
        ));
    }

    let distributable = total_bet_amount
        .checked_mul(Decimal::ONE - fee_rate)
        .ok_or_else(overflow)?;

    let shares = winning
        .iter()
        .map(|(index, amount)| {
            amount
                .checked_mul(distributable)
                .and_then(|scaled| scaled.checked_div(winning_total))
                .map(|share| (*index, share.round_dp_with_strategy(NATIVE_DECIMALS, RoundingStrategy::ToZero)))
                .ok_or_else(overflow)
        })
        .collect::<SettlementResult<Vec<_>>>()?;

    Ok(PayoutPlan {
        platform_fee: total_bet_amount - distributable,
        distributable,
        shares,
    })
}

/// Reconciles transfers and distributes winnings.
pub struct SettlementEngine {
    store: MatchStore,
    deriver: Arc<dyn AddressDeriver>,
    sender: Arc<dyn PayoutSender>,
    platform_fee_rate: Decimal,
    amount_tolerance: Decimal,
    /// One distribution per match at a time.
    distribution_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SettlementEngine {
    pub fn new(
        store: MatchStore,
        deriver: Arc<dyn AddressDeriver>,
        sender: Arc<dyn PayoutSender>,
        config: &SettlementConfig,
    ) -> Self {
        Self {
            store,
            deriver,
            sender,
            platform_fee_rate: config.platform_fee_rate,
            amount_tolerance: config.amount_tolerance,
            distribution_locks: DashMap::new(),
        }
    }

    pub fn store(&self) -> &MatchStore {
        &self.store
    }

    pub fn platform_fee_rate(&self) -> Decimal {
        self.platform_fee_rate
    }

    /// Register a match and derive one deposit address per team.
    pub async fn register_match(
        &self,
        id: &str,
        name: &str,
        teams: &[String],
    ) -> SettlementResult<Match> {
        let id = id.trim();
        if id.is_empty() {
            return Err(SettlementError::InvalidMatch("match id is empty".to_string()));
        }
        if teams.len() < 2 {
            return Err(SettlementError::InvalidMatch(
                "a match needs at least two teams".to_string(),
            ));
        }
        let mut names: Vec<&str> = Vec::with_capacity(teams.len());
        for team in teams {
            let team = team.trim();
            if team.is_empty() {
                return Err(SettlementError::InvalidMatch("team name is empty".to_string()));
            }
            if names.iter().any(|t| t.eq_ignore_ascii_case(team)) {
                return Err(SettlementError::InvalidMatch(format!("duplicate team '{}'", team)));
            }
            names.push(team);
        }
        if self.store.get(id).is_some() {
            return Err(SettlementError::InvalidMatch(format!("match '{}' already registered", id)));
        }

        let mut deposit_addresses = BTreeMap::new();
        for team in names {
            let address = self
                .deriver
                .derive_address(&DerivationPath::deposit(id, team))
                .await?;
            deposit_addresses.insert(team.to_string(), address);
        }

        let record = Match::new(id, name.trim(), deposit_addresses);
        self.store.insert_new(record.clone()).await.map_err(|e| match e {
            StoreError::AlreadyExists(id) => {
                SettlementError::InvalidMatch(format!("match '{}' already registered", id))
            }
            other => other.into(),
        })?;

        tracing::info!(
            match_id = %record.id,
            name = %record.name,
            teams = record.deposit_addresses.len(),
            "Match registered"
        );
        Ok(record)
    }

    /// Append an unverified bet to a match.
    pub async fn record_bet(&self, match_id: &str, request: BetRequest) -> SettlementResult<Bet> {
        if request.amount <= Decimal::ZERO {
            return Err(SettlementError::InvalidBet("amount must be positive".to_string()));
        }
        if request.amount.scale() > NATIVE_DECIMALS {
            return Err(SettlementError::InvalidBet(format!(
                "amount has more than {} decimals",
                NATIVE_DECIMALS
            )));
        }
        if request.bettor_handle.trim().is_empty() {
            return Err(SettlementError::InvalidBet("bettor handle is empty".to_string()));
        }

        let bet = self.store.update(match_id, |m| {
            if m.completed {
                return Err(SettlementError::InvalidBet(format!(
                    "match '{}' is already completed",
                    m.id
                )));
            }
            let team = m.canonical_team(&request.team_name).ok_or_else(|| {
                SettlementError::InvalidBet(format!(
                    "team '{}' is not in match '{}'",
                    request.team_name, m.id
                ))
            })?;
            let bet = Bet {
                bettor_handle: request.bettor_handle.trim().to_string(),
                bettor_address: request.bettor_address,
                amount: request.amount,
                team_name: team.to_string(),
                verified: false,
                verified_by: None,
            };
            m.bets.push(bet.clone());
            Ok(bet)
        }).await??;

        tracing::info!(
            match_id = %match_id,
            bettor = %bet.bettor_handle,
            team = %bet.team_name,
            amount = %bet.amount,
            "Bet recorded"
        );
        Ok(bet)
    }

    /// Mark the first matching unverified bet as verified.
    ///
    /// Never fails: a transfer with no matching bet is logged and dropped.
    pub async fn reconcile(&self, transfer: &ObservedTransfer) -> Option<VerifiedBet> {
        match self.try_reconcile(transfer).await {
            Ok(verified) => {
                metrics::record_bet_verified();
                tracing::info!(
                    match_id = %verified.match_id,
                    bettor = %verified.bettor_handle,
                    team = %verified.team_name,
                    amount = %verified.amount,
                    tx_hash = %verified.tx_hash,
                    "Bet verified"
                );
                Some(verified)
            }
            Err(SettlementError::NoMatchingBet { tx_hash, from }) => {
                tracing::info!(
                    tx_hash = %tx_hash,
                    from = %from,
                    to = %transfer.to,
                    amount = %transfer.amount,
                    "No matching bet for transfer"
                );
                None
            }
            Err(e) => {
                tracing::warn!(tx_hash = %transfer.tx_hash, error = %e, "Reconcile failed");
                None
            }
        }
    }

    /// Reconcile, surfacing why nothing matched.
    pub async fn try_reconcile(&self, transfer: &ObservedTransfer) -> SettlementResult<VerifiedBet> {
        let no_match = || SettlementError::NoMatchingBet {
            tx_hash: transfer.tx_hash,
            from: transfer.from,
        };

        let target = self
            .store
            .list()
            .into_iter()
            .find(|m| !m.completed && m.has_deposit_address(&transfer.to))
            .ok_or_else(no_match)?;

        let tolerance = self.amount_tolerance;
        self.store
            .update(&target.id, |m| {
                if m.completed {
                    return None;
                }
                let index = m.bets.iter().position(|bet| {
                    !bet.verified
                        && bet.bettor_address == transfer.from
                        && (bet.amount - transfer.amount).abs() < tolerance
                })?;
                let bet = &mut m.bets[index];
                bet.verified = true;
                bet.verified_by = Some(transfer.tx_hash);
                let verified = VerifiedBet {
                    match_id: m.id.clone(),
                    bet_index: index,
                    bettor_handle: bet.bettor_handle.clone(),
                    team_name: bet.team_name.clone(),
                    amount: bet.amount,
                    tx_hash: transfer.tx_hash,
                };
                m.total_bet_amount += verified.amount;
                Some(verified)
            })
            .await?
            .ok_or_else(no_match)
    }

    /// Pay the verified bets on `winning_team`.
    ///
    /// Every winner is attempted; each attempt is persisted as a
    /// [`PayoutRecord`]. The match completes only when all winners are
    /// settled. Calling again with the same winner re-drives only the
    /// winners that are not settled yet, resending their recorded signed
    /// transaction when there is one.
    pub async fn distribute(
        &self,
        match_id: &str,
        winning_team: &str,
    ) -> SettlementResult<DistributionResult> {
        let lock = self
            .distribution_locks
            .entry(match_id.to_string())
            .or_default()
            .clone();
        let _guard = lock.lock().await;

        let result = self.distribute_locked(match_id, winning_team).await;
        if matches!(&result, Ok(r) if r.completed) {
            self.distribution_locks.remove(match_id);
        }
        result
    }

    async fn distribute_locked(
        &self,
        match_id: &str,
        winning_team: &str,
    ) -> SettlementResult<DistributionResult> {
        let record = self
            .store
            .get(match_id)
            .ok_or_else(|| SettlementError::MatchNotFound(match_id.to_string()))?;

        if record.completed {
            return Err(SettlementError::DistributionPrecondition(format!(
                "match '{}' is already completed",
                match_id
            )));
        }
        let winner = record
            .canonical_team(winning_team)
            .ok_or_else(|| {
                SettlementError::DistributionPrecondition(format!(
                    "team '{}' is not in match '{}'",
                    winning_team, match_id
                ))
            })?
            .to_string();
        if let Some(previous) = &record.winner {
            if previous != &winner {
                return Err(SettlementError::DistributionPrecondition(format!(
                    "match '{}' was already settled for '{}'",
                    match_id, previous
                )));
            }
        }

        let winning: Vec<(usize, Decimal)> = record
            .winning_bets(&winner)
            .into_iter()
            .map(|i| (i, record.bets[i].amount))
            .collect();
        if winning.is_empty() {
            return Err(SettlementError::DistributionPrecondition(format!(
                "no verified bets on '{}'",
                winner
            )));
        }
        let plan = compute_payouts(record.total_bet_amount, self.platform_fee_rate, &winning)?;

        let run_id = Uuid::new_v4();
        let mut store_errors = Vec::new();

        if record.winner.is_none() {
            let recorded = winner.clone();
            if let Err(e) = self.store.update(match_id, move |m| m.winner = Some(recorded)).await {
                self.note_store_error(run_id, match_id, e, &mut store_errors);
            }
        }

        tracing::info!(
            run_id = %run_id,
            match_id = %match_id,
            winner = %winner,
            total_pool = %record.total_bet_amount,
            distributable = %plan.distributable,
            winners = plan.shares.len(),
            "Distributing winnings"
        );

        let source_path = DerivationPath::settlement(&record.id);
        let source_address = self
            .deriver
            .derive_address(&source_path)
            .await
            .map_err(|e| format!("settlement address unavailable: {}", e));

        let mut payouts = Vec::with_capacity(plan.shares.len());
        for (index, amount) in &plan.shares {
            let bet = &record.bets[*index];
            let previous = record.payout_for(*index);
            if let Some(settled) = previous.filter(|p| p.status.is_settled()) {
                payouts.push(settled.clone());
                continue;
            }

            let payout = PayoutRecord {
                bet_index: *index,
                bettor_handle: bet.bettor_handle.clone(),
                bettor_address: bet.bettor_address,
                amount: *amount,
                status: PayoutStatus::Failed {
                    error: "not attempted".to_string(),
                },
                attempts: previous.map_or(0, |p| p.attempts) + 1,
                transaction: previous.and_then(|p| p.transaction.clone()),
            };
            let instruction = PayoutInstruction {
                recipient: bet.bettor_address,
                amount: *amount,
                source_path: source_path.clone(),
            };
            let payout = self
                .pay(run_id, match_id, payout, &instruction, &source_address, &mut store_errors)
                .await;
            payouts.push(payout);
        }

        let mut completed = payouts.iter().all(|p| p.status.is_settled());
        if completed {
            if let Err(e) = self.store.update(match_id, |m| m.completed = true).await {
                self.note_store_error(run_id, match_id, e, &mut store_errors);
                completed = false;
            }
        }

        let result = DistributionResult {
            run_id,
            match_id: record.id.clone(),
            match_name: record.name.clone(),
            winner,
            total_pool: record.total_bet_amount,
            platform_fee: plan.platform_fee,
            distributable: plan.distributable,
            payouts,
            completed,
            store_errors,
        };

        if completed {
            tracing::info!(run_id = %run_id, match_id = %match_id, "Match settled");
        } else {
            tracing::warn!(
                run_id = %run_id,
                match_id = %match_id,
                failed = result.failed_count(),
                store_errors = result.store_errors.len(),
                "Distribution incomplete, re-run to retry failed payouts"
            );
        }
        Ok(result)
    }

    /// Settle one winner and persist the outcome.
    ///
    /// A recorded signed transaction is resent as-is. A new one is signed
    /// only when there is none, or when the node refuses the recorded one
    /// for its nonce or its fee. New bytes are recorded before they are broadcast; if
    /// that record cannot be saved they are not sent.
    async fn pay(
        &self,
        run_id: Uuid,
        match_id: &str,
        mut payout: PayoutRecord,
        instruction: &PayoutInstruction,
        source_address: &Result<Address, String>,
        store_errors: &mut Vec<String>,
    ) -> PayoutRecord {
        if let Some(signed) = payout.transaction.clone() {
            match self.sender.resubmit_payout(&signed).await {
                Ok(outcome) => {
                    payout.status = self.settled(outcome);
                    return self.save_payout(run_id, match_id, payout, store_errors).await;
                }
                Err(PipelineError::Chain(BlockchainError::BroadcastRejected {
                    kind: kind @ (RejectionKind::NonceTooLow | RejectionKind::Underpriced),
                    ..
                })) => {
                    tracing::warn!(
                        run_id = %run_id,
                        tx_hash = %signed.hash,
                        nonce = signed.unsigned.nonce,
                        recipient = %instruction.recipient,
                        reason = %kind,
                        "Recorded payout can never land, signing a replacement"
                    );
                    payout.transaction = None;
                }
                Err(e) => {
                    payout.status = self.failed(run_id, instruction, e.to_string());
                    return self.save_payout(run_id, match_id, payout, store_errors).await;
                }
            }
        }

        let from = match source_address {
            Ok(from) => *from,
            Err(error) => {
                payout.status = self.failed(run_id, instruction, error.clone());
                return self.save_payout(run_id, match_id, payout, store_errors).await;
            }
        };

        let prepared = match self.sender.prepare_payout(instruction, from).await {
            Ok(prepared) => prepared,
            Err(e) => {
                payout.status = self.failed(run_id, instruction, e.to_string());
                return self.save_payout(run_id, match_id, payout, store_errors).await;
            }
        };

        payout.status = PayoutStatus::Pending {
            tx_hash: prepared.signed.hash,
        };
        payout.transaction = Some(prepared.signed.clone());
        let pending = payout.clone();
        if let Err(e) = self.store.update(match_id, move |m| m.upsert_payout(pending)).await {
            let error = format!("payout not sent, signed transaction could not be recorded: {}", e);
            self.note_store_error(run_id, match_id, e, store_errors);
            payout.status = self.failed(run_id, instruction, error);
            payout.transaction = None;
            return self.save_payout(run_id, match_id, payout, store_errors).await;
        }

        payout.status = match self.sender.submit_payout(prepared).await {
            Ok(outcome) => self.settled(outcome),
            Err(e) => self.failed(run_id, instruction, e.to_string()),
        };
        self.save_payout(run_id, match_id, payout, store_errors).await
    }

    fn settled(&self, outcome: BroadcastOutcome) -> PayoutStatus {
        match outcome {
            BroadcastOutcome::Submitted { tx_hash, explorer_link } => {
                metrics::record_payout("paid");
                PayoutStatus::Paid { tx_hash, explorer_link }
            }
            BroadcastOutcome::AlreadySubmitted { tx_hash } => {
                metrics::record_payout("already_submitted");
                PayoutStatus::AlreadySubmitted { tx_hash }
            }
        }
    }

    fn failed(&self, run_id: Uuid, instruction: &PayoutInstruction, error: String) -> PayoutStatus {
        metrics::record_payout("failed");
        tracing::error!(
            run_id = %run_id,
            recipient = %instruction.recipient,
            amount = %instruction.amount,
            error = %error,
            "Payout failed"
        );
        PayoutStatus::Failed { error }
    }

    async fn save_payout(
        &self,
        run_id: Uuid,
        match_id: &str,
        payout: PayoutRecord,
        store_errors: &mut Vec<String>,
    ) -> PayoutRecord {
        let persisted = payout.clone();
        if let Err(e) = self.store.update(match_id, move |m| m.upsert_payout(persisted)).await {
            self.note_store_error(run_id, match_id, e, store_errors);
        }
        payout
    }

    fn note_store_error(
        &self,
        run_id: Uuid,
        match_id: &str,
        error: StoreError,
        store_errors: &mut Vec<String>,
    ) {
        tracing::error!(run_id = %run_id, match_id = %match_id, error = %error, "Failed to save match");
        store_errors.push(error.to_string());
    }
}

#[async_trait]
impl TransferHandler for SettlementEngine {
    async fn handle(&self, transfer: ObservedTransfer) {
        self.reconcile(&transfer).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::nonce::NonceManager;
    use crate::blockchain::transaction::{build, compute_signing_hash, decimal_to_wei};
    use crate::blockchain::{ChainId, FeeData, SignedTransaction};
    use crate::pipeline::{PipelineResult, PreparedPayment};
    use crate::signer::derivation::DerivationResult;
    use alloy::primitives::{Bytes, U256};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    const BETTOR: Address = Address::repeat_byte(0xa1);
    const VAULT: Address = Address::repeat_byte(0x5e);

    struct FixedDeriver;

    #[async_trait]
    impl AddressDeriver for FixedDeriver {
        async fn derive_address(&self, _path: &DerivationPath) -> DerivationResult<Address> {
            Ok(VAULT)
        }
    }

    /// Signs nothing; hands back unsigned bytes and fails the first
    /// `failing_submits` broadcasts.
    struct RecordingSender {
        nonces: NonceManager,
        failing_submits: AtomicU32,
        prepared: AtomicU32,
        resubmitted: AtomicU32,
    }

    impl RecordingSender {
        fn new(failing_submits: u32) -> Arc<Self> {
            Arc::new(Self {
                nonces: NonceManager::new(),
                failing_submits: AtomicU32::new(failing_submits),
                prepared: AtomicU32::new(0),
                resubmitted: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl PayoutSender for RecordingSender {
        async fn prepare_payout(
            &self,
            instruction: &PayoutInstruction,
            from: Address,
        ) -> PipelineResult<PreparedPayment> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            let lease = self.nonces.lease(from).await;
            let fee_data = FeeData {
                max_fee_per_gas: 2,
                max_priority_fee_per_gas: 1,
            };
            let unsigned = build(
                instruction.recipient,
                &instruction.amount.normalize().to_string(),
                21_000,
                fee_data,
                lease.next_nonce(0),
                ChainId(1),
            )?;
            let hash = compute_signing_hash(&unsigned);
            let signed = SignedTransaction {
                unsigned,
                r: U256::ZERO,
                s: U256::ZERO,
                v: 37,
                signer: from,
                hash,
                raw: Bytes::new(),
            };
            Ok(PreparedPayment::new(signed, lease))
        }

        async fn submit_payout(&self, prepared: PreparedPayment) -> PipelineResult<BroadcastOutcome> {
            let failing = self
                .failing_submits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(BlockchainError::Rpc("request timed out".to_string()).into());
            }
            Ok(BroadcastOutcome::Submitted {
                tx_hash: prepared.signed.hash,
                explorer_link: String::new(),
            })
        }

        async fn resubmit_payout(&self, signed: &SignedTransaction) -> PipelineResult<BroadcastOutcome> {
            self.resubmitted.fetch_add(1, Ordering::SeqCst);
            Ok(BroadcastOutcome::AlreadySubmitted { tx_hash: signed.hash })
        }
    }

    async fn funded_engine(sender: Arc<RecordingSender>) -> SettlementEngine {
        let engine = SettlementEngine::new(
            MatchStore::new(None),
            Arc::new(FixedDeriver),
            sender,
            &SettlementConfig::default(),
        );
        let teams = vec!["Royals".to_string(), "Tigers".to_string()];
        engine.register_match("m1", "Royals vs Tigers", &teams).await.unwrap();
        engine
            .record_bet(
                "m1",
                BetRequest {
                    bettor_handle: "@alice".to_string(),
                    bettor_address: BETTOR,
                    amount: dec!(1),
                    team_name: "Royals".to_string(),
                },
            )
            .await
            .unwrap();
        let transfer = ObservedTransfer {
            from: BETTOR,
            to: VAULT,
            amount: dec!(1),
            amount_wei: decimal_to_wei(dec!(1)).unwrap(),
            tx_hash: TxHash::repeat_byte(1),
            block_number: 1,
        };
        assert!(engine.reconcile(&transfer).await.is_some());
        engine
    }

    #[tokio::test]
    async fn test_redrive_resends_recorded_transaction() {
        let sender = RecordingSender::new(1);
        let engine = funded_engine(sender.clone()).await;

        let first = engine.distribute("m1", "Royals").await.unwrap();
        assert!(!first.completed);
        let recorded = first.payouts[0].transaction.clone().unwrap();
        let stored = engine.store().get("m1").unwrap();
        assert_eq!(stored.payouts[0].transaction.as_ref(), Some(&recorded));

        let second = engine.distribute("m1", "Royals").await.unwrap();
        assert!(second.completed);
        assert_eq!(
            second.payouts[0].status,
            PayoutStatus::AlreadySubmitted { tx_hash: recorded.hash }
        );
        assert_eq!(second.payouts[0].attempts, 2);
        assert_eq!(sender.prepared.load(Ordering::SeqCst), 1);
        assert_eq!(sender.resubmitted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_distribution_lock_dropped_once_match_completes() {
        let engine = funded_engine(RecordingSender::new(1)).await;

        assert!(!engine.distribute("m1", "Royals").await.unwrap().completed);
        assert!(engine.distribution_locks.contains_key("m1"));

        assert!(engine.distribute("m1", "Royals").await.unwrap().completed);
        assert!(engine.distribution_locks.is_empty());
    }

    #[test]
    fn test_two_equal_winners_split_pool() {
        let plan = compute_payouts(dec!(100), dec!(0.001), &[(0, dec!(10)), (3, dec!(10))]).unwrap();
        assert_eq!(plan.distributable, dec!(99.9));
        assert_eq!(plan.platform_fee, dec!(0.1));
        assert_eq!(plan.shares, vec![(0, dec!(49.95)), (3, dec!(49.95))]);
    }

    #[test]
    fn test_shares_are_proportional() {
        let plan = compute_payouts(dec!(4), dec!(0), &[(0, dec!(1)), (1, dec!(3))]).unwrap();
        assert_eq!(plan.shares, vec![(0, dec!(1)), (1, dec!(3))]);
    }

    #[test]
    fn test_shares_truncate_never_exceed_pool() {
        let plan = compute_payouts(dec!(1), dec!(0), &[(0, dec!(1)), (1, dec!(1)), (2, dec!(1))]).unwrap();
        let paid: Decimal = plan.shares.iter().map(|(_, a)| *a).sum();
        assert!(paid <= plan.distributable);
        assert!(plan.shares.iter().all(|(_, a)| a.scale() <= NATIVE_DECIMALS));
        assert_eq!(plan.shares[0].1, dec!(0.333333333333333333));
    }

    #[test]
    fn test_zero_winning_total_rejected() {
        assert!(matches!(
            compute_payouts(dec!(1), dec!(0.001), &[]),
            Err(SettlementError::DistributionPrecondition(_))
        ));
    }
}
