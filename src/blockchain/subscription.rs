//! New-block stream built on polling.
//!
//! Yields every block strictly in height order, each exactly once, starting
//! at the chain head when the stream is created. Transient RPC failures are
//! absorbed until `max_consecutive_errors` is reached; the stream then yields
//! the last error and ends.

use futures_util::stream::{self, BoxStream};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::blockchain::client::ChainRpc;
use crate::blockchain::types::{BlockchainResult, ChainBlock};

struct PollState {
    rpc: Arc<dyn ChainRpc>,
    next: Option<u64>,
    poll_interval: Duration,
    max_consecutive_errors: u32,
    errors: u32,
    finished: bool,
}

/// Stream new blocks with their transactions.
///
/// `start` pins the first height; `None` starts at the current head.
pub fn watch_blocks(
    rpc: Arc<dyn ChainRpc>,
    start: Option<u64>,
    poll_interval: Duration,
    max_consecutive_errors: u32,
) -> BoxStream<'static, BlockchainResult<ChainBlock>> {
    let state = PollState {
        rpc,
        next: start,
        poll_interval,
        max_consecutive_errors: max_consecutive_errors.max(1),
        errors: 0,
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        loop {
            match poll_once(&mut state).await {
                Ok(Some(block)) => {
                    state.errors = 0;
                    state.next = Some(block.number + 1);
                    return Some((Ok(block), state));
                }
                Ok(None) => {
                    state.errors = 0;
                    sleep(state.poll_interval).await;
                }
                Err(e) => {
                    state.errors += 1;
                    tracing::warn!(
                        error = %e,
                        consecutive_errors = state.errors,
                        "Block poll failed"
                    );
                    if state.errors >= state.max_consecutive_errors {
                        state.finished = true;
                        return Some((Err(e), state));
                    }
                    sleep(state.poll_interval).await;
                }
            }
        }
    }))
}

async fn poll_once(state: &mut PollState) -> BlockchainResult<Option<ChainBlock>> {
    let number = match state.next {
        Some(number) => number,
        None => {
            let head = state.rpc.get_block_number().await?;
            tracing::info!(block = head, "Block stream starting at chain head");
            state.next = Some(head);
            head
        }
    };
    state.rpc.get_block(number).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::types::{BlockchainError, FeeData};
    use alloy::primitives::{Address, TxHash, U256};
    use async_trait::async_trait;
    use futures_util::StreamExt;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Chain whose blocks run from 0 to `head`; the first `failures` block reads fail.
    struct PolledChain {
        head: u64,
        failures: AtomicU32,
    }

    impl PolledChain {
        fn new(head: u64, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                head,
                failures: AtomicU32::new(failures),
            })
        }
    }

    #[async_trait]
    impl ChainRpc for PolledChain {
        async fn get_balance(&self, _address: Address) -> BlockchainResult<U256> {
            Ok(U256::ZERO)
        }

        async fn get_transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
            Ok(0)
        }

        async fn get_fee_data(&self) -> BlockchainResult<FeeData> {
            Ok(FeeData {
                max_fee_per_gas: 1,
                max_priority_fee_per_gas: 1,
            })
        }

        async fn send_raw_transaction(&self, _raw: &[u8]) -> BlockchainResult<TxHash> {
            Err(BlockchainError::Rpc("read only".to_string()))
        }

        async fn get_block_number(&self) -> BlockchainResult<u64> {
            Ok(self.head)
        }

        async fn get_block(&self, number: u64) -> BlockchainResult<Option<ChainBlock>> {
            let failing = self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(BlockchainError::Rpc("connection reset".to_string()));
            }
            Ok((number <= self.head).then(|| ChainBlock {
                number,
                transactions: Vec::new(),
            }))
        }

        async fn is_transaction_mined(&self, _hash: TxHash) -> BlockchainResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_starts_at_head_when_unpinned() {
        let blocks = watch_blocks(PolledChain::new(5, 0), None, Duration::from_secs(1), 3);
        let first = blocks.take(1).collect::<Vec<_>>().await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].as_ref().unwrap().number, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_start_yields_every_height_in_order() {
        let blocks = watch_blocks(PolledChain::new(9, 0), Some(6), Duration::from_secs(1), 3);
        let numbers: Vec<u64> = blocks
            .take(4)
            .map(|b| b.unwrap().number)
            .collect()
            .await;
        assert_eq!(numbers, vec![6, 7, 8, 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_absorbed() {
        let blocks = watch_blocks(PolledChain::new(3, 2), Some(3), Duration::from_secs(1), 3);
        let first = blocks.take(1).collect::<Vec<_>>().await;
        assert_eq!(first[0].as_ref().unwrap().number, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_after_error_budget() {
        let blocks = watch_blocks(PolledChain::new(3, u32::MAX), Some(3), Duration::from_secs(1), 3);
        let items = blocks.collect::<Vec<_>>().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(BlockchainError::Rpc(_))));
    }
}
