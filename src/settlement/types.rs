//! Match, bet and payout records.

use alloy::primitives::{Address, TxHash, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::SignedTransaction;
use crate::signer::{DerivationError, DerivationPath};

/// A wager placed through the social front end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    pub bettor_handle: String,
    pub bettor_address: Address,
    /// Chain-native units (ETH, not wei).
    pub amount: Decimal,
    pub team_name: String,
    /// Flips to true once a matching on-chain transfer is seen. Never flips back.
    pub verified: bool,
    /// Transfer that verified this bet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_by: Option<TxHash>,
}

/// A match and its bets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    pub name: String,
    /// Team name → deposit address.
    pub deposit_addresses: BTreeMap<String, Address>,
    pub completed: bool,
    /// Running sum of verified bet amounts.
    pub total_bet_amount: Decimal,
    pub bets: Vec<Bet>,
    /// Set by the first distribution attempt.
    #[serde(default)]
    pub winner: Option<String>,
    #[serde(default)]
    pub payouts: Vec<PayoutRecord>,
}

impl Match {
    pub fn new(id: impl Into<String>, name: impl Into<String>, deposit_addresses: BTreeMap<String, Address>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            deposit_addresses,
            completed: false,
            total_bet_amount: Decimal::ZERO,
            bets: Vec::new(),
            winner: None,
            payouts: Vec::new(),
        }
    }

    /// Team name as registered, matched case-insensitively.
    pub fn canonical_team(&self, team: &str) -> Option<&str> {
        let team = team.trim();
        self.deposit_addresses
            .keys()
            .find(|name| name.eq_ignore_ascii_case(team))
            .map(String::as_str)
    }

    /// Whether `address` is one of this match's deposit addresses.
    pub fn has_deposit_address(&self, address: &Address) -> bool {
        self.deposit_addresses.values().any(|a| a == address)
    }

    /// Indices of verified bets on `team`, in insertion order.
    pub fn winning_bets(&self, team: &str) -> Vec<usize> {
        self.bets
            .iter()
            .enumerate()
            .filter(|(_, bet)| bet.verified && bet.team_name.eq_ignore_ascii_case(team))
            .map(|(i, _)| i)
            .collect()
    }

    /// Latest payout record for a bet.
    pub fn payout_for(&self, bet_index: usize) -> Option<&PayoutRecord> {
        self.payouts.iter().find(|p| p.bet_index == bet_index)
    }

    /// Insert or replace the payout record of a bet.
    pub fn upsert_payout(&mut self, record: PayoutRecord) {
        match self.payouts.iter_mut().find(|p| p.bet_index == record.bet_index) {
            Some(existing) => *existing = record,
            None => self.payouts.push(record),
        }
    }
}

/// A positive-value transfer into a known deposit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTransfer {
    pub from: Address,
    pub to: Address,
    pub amount: Decimal,
    pub amount_wei: U256,
    pub tx_hash: TxHash,
    pub block_number: u64,
}

/// One payment owed to a winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub recipient: Address,
    pub amount: Decimal,
    pub source_path: DerivationPath,
}

/// Outcome of the last payout attempt for a bet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PayoutStatus {
    Paid { tx_hash: TxHash, explorer_link: String },
    /// Mined from an earlier submission of the same bytes.
    AlreadySubmitted { tx_hash: TxHash },
    /// Signed and recorded; the broadcast outcome is not known yet.
    Pending { tx_hash: TxHash },
    Failed { error: String },
}

impl PayoutStatus {
    pub fn is_settled(&self) -> bool {
        matches!(self, PayoutStatus::Paid { .. } | PayoutStatus::AlreadySubmitted { .. })
    }
}

/// Payout attempt persisted on the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    /// Position of the winning bet in `Match::bets`.
    pub bet_index: usize,
    pub bettor_handle: String,
    pub bettor_address: Address,
    pub amount: Decimal,
    #[serde(flatten)]
    pub status: PayoutStatus,
    /// Number of distribution runs that tried this payout.
    pub attempts: u32,
    /// Signed transaction of the latest attempt. Re-drives resend these
    /// bytes rather than signing a new payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<SignedTransaction>,
}

/// Report of one `distribute` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    pub run_id: Uuid,
    pub match_id: String,
    pub match_name: String,
    pub winner: String,
    pub total_pool: Decimal,
    pub platform_fee: Decimal,
    pub distributable: Decimal,
    pub payouts: Vec<PayoutRecord>,
    /// True once every winner is settled.
    pub completed: bool,
    /// Record saves that failed during this run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub store_errors: Vec<String>,
}

impl DistributionResult {
    pub fn failed_count(&self) -> usize {
        self.payouts.iter().filter(|p| !p.status.is_settled()).count()
    }
}

/// Input for recording a new bet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetRequest {
    pub bettor_handle: String,
    pub bettor_address: Address,
    pub amount: Decimal,
    pub team_name: String,
}

/// Errors from match/bet persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Match not found: {0}")]
    NotFound(String),

    #[error("Match already exists: {0}")]
    AlreadyExists(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from the settlement engine.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// No unverified bet matches a transfer. Logged, never surfaced to users.
    #[error("No matching bet for transfer {tx_hash} from {from}")]
    NoMatchingBet { tx_hash: TxHash, from: Address },

    #[error("Distribution precondition failed: {0}")]
    DistributionPrecondition(String),

    #[error("Match not found: {0}")]
    MatchNotFound(String),

    #[error("Invalid bet: {0}")]
    InvalidBet(String),

    #[error("Invalid match: {0}")]
    InvalidMatch(String),

    #[error(transparent)]
    Store(StoreError),

    #[error("Address derivation failed: {0}")]
    Derivation(#[from] DerivationError),
}

impl From<StoreError> for SettlementError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => SettlementError::MatchNotFound(id),
            other => SettlementError::Store(other),
        }
    }
}

/// Result type for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;
