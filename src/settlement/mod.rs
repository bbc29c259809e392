//! Settlement subsystem.
//!
//! # Data Flow
//! ```text
//! block stream → observer.rs (filter to deposit addresses, block order)
//!     → engine.rs reconcile (verify first matching bet)
//!     → store.rs (atomic per-match update, JSON persistence)
//!
//! distribute(match, winner)
//!     → engine.rs (pool net of fee, proportional shares)
//!     → pipeline (one payout per winning bet, outcome persisted)
//! ```

pub mod engine;
pub mod observer;
pub mod store;
pub mod types;

pub use engine::{compute_payouts, SettlementEngine, VerifiedBet};
pub use observer::{ObserverState, TransferHandler, TransferObserver};
pub use store::MatchStore;
pub use types::{
    Bet, BetRequest, DistributionResult, Match, ObservedTransfer, PayoutInstruction, PayoutRecord,
    PayoutStatus, SettlementError, SettlementResult,
};
