//! Timeout enforcement.

use std::future::Future;
use std::time::Duration;

/// Run `fut` with a deadline. `None` means the deadline passed first.
pub async fn with_deadline<F>(deadline: Duration, fut: F) -> Option<F::Output>
where
    F: Future,
{
    tokio::time::timeout(deadline, fut).await.ok()
}
