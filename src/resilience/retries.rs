//! Retry logic for raw transaction submission.
//!
//! A submission gets at most one retry, and only when the failure is
//! transient (`RejectionKind::Other`). The same signed bytes are resent, so
//! a retry can never create a second payment.

use std::time::Duration;

use crate::blockchain::types::RejectionKind;

/// Total submissions allowed for one signed transaction.
pub const MAX_BROADCAST_ATTEMPTS: u32 = 2;

/// What to do after a failed submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait, then resubmit the identical payload.
    RetryAfter(Duration),
    /// Terminal; report the failure.
    GiveUp,
}

/// Attempt counter for a single signed transaction.
#[derive(Debug, Clone)]
pub struct BroadcastRetryPolicy {
    delay: Duration,
    attempts: u32,
}

impl BroadcastRetryPolicy {
    pub fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }

    /// Record a failed submission and decide whether to try again.
    pub fn on_failure(&mut self, kind: RejectionKind) -> RetryDecision {
        self.attempts += 1;
        match kind {
            RejectionKind::Other if self.attempts < MAX_BROADCAST_ATTEMPTS => {
                RetryDecision::RetryAfter(self.delay)
            }
            _ => RetryDecision::GiveUp,
        }
    }

    /// Submissions that have failed so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
