//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Signer round-trip:
//!     → timeouts.rs (deadline; expiry surfaces as a distinct error)
//!
//! Broadcast:
//!     → retries.rs (classify, single fixed-delay retry of transient failures)
//! ```
//!
//! # Design Decisions
//! - Every external call has a deadline
//! - Only transient broadcast failures are retried, and only once
//! - Integrity and malformed-response failures are never retried

pub mod retries;
pub mod timeouts;
