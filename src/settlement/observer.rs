//! Transfer observer.
//!
//! Consumes the block stream and forwards positive-value transfers into
//! known deposit addresses to a [`TransferHandler`]. Blocks are handled one
//! at a time in delivery order; every transfer of block N is handled before
//! block N+1 is looked at.
//!
//! ```text
//! Idle ──run──▶ Watching ──block──▶ Scanning ──done──▶ Watching
//!                  │
//!                  └── shutdown / stream error / stream end ──▶ Stopped
//! ```
//!
//! The deposit-address snapshot is taken on entering `Watching` and, when a
//! refresh interval is configured, retaken between blocks.

use alloy::primitives::Address;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::blockchain::transaction::wei_to_decimal;
use crate::blockchain::{BlockchainResult, ChainBlock};
use crate::observability::metrics;
use crate::settlement::store::MatchStore;
use crate::settlement::types::ObservedTransfer;

/// Receives transfers in block order.
#[async_trait]
pub trait TransferHandler: Send + Sync {
    async fn handle(&self, transfer: ObservedTransfer);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverState {
    Idle,
    Watching,
    Scanning,
    Stopped,
}

pub struct TransferObserver {
    store: MatchStore,
    handler: Arc<dyn TransferHandler>,
    /// Deposit address → match id, for active matches.
    snapshot: ArcSwap<HashMap<Address, String>>,
    snapshot_refresh: Option<Duration>,
    state: watch::Sender<ObserverState>,
}

impl TransferObserver {
    /// `snapshot_refresh` of `None` keeps the first snapshot for the whole session.
    pub fn new(
        store: MatchStore,
        handler: Arc<dyn TransferHandler>,
        snapshot_refresh: Option<Duration>,
    ) -> Self {
        let (state, _) = watch::channel(ObserverState::Idle);
        Self {
            store,
            handler,
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            snapshot_refresh,
            state,
        }
    }

    pub fn state(&self) -> ObserverState {
        *self.state.borrow()
    }

    /// Follow state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ObserverState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: ObserverState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::trace!(from = ?previous, to = ?next, "Observer state");
        }
    }

    /// Re-read active deposit addresses. Returns how many are watched.
    pub fn refresh_snapshot(&self) -> usize {
        let addresses: HashMap<Address, String> = self
            .store
            .active_matches()
            .into_iter()
            .flat_map(|m| {
                let id = m.id;
                m.deposit_addresses
                    .into_values()
                    .map(move |address| (address, id.clone()))
            })
            .collect();
        let count = addresses.len();
        self.snapshot.store(Arc::new(addresses));
        tracing::debug!(addresses = count, "Deposit address snapshot taken");
        count
    }

    pub fn is_watched(&self, address: &Address) -> bool {
        self.snapshot.load().contains_key(address)
    }

    /// Transfers in `block` addressed to a watched deposit address.
    pub fn transfers_in(&self, block: &ChainBlock) -> Vec<ObservedTransfer> {
        let snapshot = self.snapshot.load();
        block
            .transactions
            .iter()
            .filter(|tx| !tx.value.is_zero())
            .filter_map(|tx| {
                let to = tx.to.filter(|to| snapshot.contains_key(to))?;
                let Some(amount) = wei_to_decimal(tx.value) else {
                    tracing::warn!(tx_hash = %tx.hash, value = %tx.value, "Transfer value out of range");
                    return None;
                };
                Some(ObservedTransfer {
                    from: tx.from,
                    to,
                    amount,
                    amount_wei: tx.value,
                    tx_hash: tx.hash,
                    block_number: block.number,
                })
            })
            .collect()
    }

    /// Hand every qualifying transfer of `block` to the handler, in order.
    pub async fn scan_block(&self, block: &ChainBlock) -> usize {
        let transfers = self.transfers_in(block);
        let count = transfers.len();
        for transfer in transfers {
            tracing::info!(
                block = transfer.block_number,
                tx_hash = %transfer.tx_hash,
                from = %transfer.from,
                to = %transfer.to,
                amount = %transfer.amount,
                "Transfer observed"
            );
            metrics::record_transfer_observed();
            self.handler.handle(transfer).await;
        }
        count
    }

    /// Watch `blocks` until shutdown or the stream fails.
    ///
    /// Only runs from `Idle`; a stopped observer does not restart.
    pub async fn run(
        &self,
        mut blocks: BoxStream<'_, BlockchainResult<ChainBlock>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ObserverState {
        let current = self.state();
        if current != ObserverState::Idle {
            tracing::warn!(state = ?current, "Observer already started");
            return current;
        }

        let watched = self.refresh_snapshot();
        self.set_state(ObserverState::Watching);
        tracing::info!(addresses = watched, "Transfer observer watching");
        let mut last_refresh = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Transfer observer stopping");
                    break;
                }
                next = blocks.next() => match next {
                    Some(Ok(block)) => {
                        if let Some(every) = self.snapshot_refresh {
                            if last_refresh.elapsed() >= every {
                                self.refresh_snapshot();
                                last_refresh = Instant::now();
                            }
                        }
                        self.set_state(ObserverState::Scanning);
                        let transfers = self.scan_block(&block).await;
                        metrics::record_observer_block(block.number);
                        tracing::debug!(block = block.number, transfers, "Block scanned");
                        self.set_state(ObserverState::Watching);
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Block subscription failed");
                        break;
                    }
                    None => {
                        tracing::warn!("Block subscription ended");
                        break;
                    }
                },
            }
        }

        self.set_state(ObserverState::Stopped);
        ObserverState::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::{BlockchainError, ChainTransaction};
    use crate::settlement::types::Match;
    use alloy::primitives::{TxHash, U256};
    use futures_util::stream;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(u64, TxHash)>>,
    }

    #[async_trait]
    impl TransferHandler for Recorder {
        async fn handle(&self, transfer: ObservedTransfer) {
            // Yield so a concurrent scan would interleave if ordering were broken.
            tokio::task::yield_now().await;
            self.seen.lock().await.push((transfer.block_number, transfer.tx_hash));
        }
    }

    const DEPOSIT: Address = Address::repeat_byte(0xd0);

    async fn store_with_match() -> MatchStore {
        let store = MatchStore::new(None);
        let mut addrs = BTreeMap::new();
        addrs.insert("Royals".to_string(), DEPOSIT);
        store.insert_new(Match::new("m1", "Royals vs Tigers", addrs)).await.unwrap();
        store
    }

    fn tx(hash: u8, to: Option<Address>, wei: u64) -> ChainTransaction {
        ChainTransaction {
            hash: TxHash::repeat_byte(hash),
            from: Address::repeat_byte(0xbe),
            to,
            value: U256::from(wei),
        }
    }

    #[tokio::test]
    async fn test_filters_value_and_destination() {
        let observer = TransferObserver::new(store_with_match().await, Arc::new(Recorder::default()), None);
        observer.refresh_snapshot();

        let block = ChainBlock {
            number: 7,
            transactions: vec![
                tx(1, Some(DEPOSIT), 500_000_000_000_000_000),
                tx(2, Some(DEPOSIT), 0),
                tx(3, Some(Address::repeat_byte(1)), 1),
                tx(4, None, 1),
            ],
        };
        let transfers = observer.transfers_in(&block);
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].amount, dec!(0.5));
        assert_eq!(transfers[0].block_number, 7);
    }

    #[tokio::test]
    async fn test_completed_matches_not_watched() {
        let store = store_with_match().await;
        let observer = TransferObserver::new(store.clone(), Arc::new(Recorder::default()), None);
        assert_eq!(observer.refresh_snapshot(), 1);
        store.update("m1", |m| m.completed = true).await.unwrap();
        assert_eq!(observer.refresh_snapshot(), 0);
        assert!(!observer.is_watched(&DEPOSIT));
    }

    #[tokio::test]
    async fn test_blocks_processed_in_order_then_stops_on_error() {
        let recorder = Arc::new(Recorder::default());
        let observer = TransferObserver::new(store_with_match().await, recorder.clone(), None);
        let shutdown = broadcast::channel::<()>(1);

        let blocks = stream::iter(vec![
            Ok(ChainBlock { number: 1, transactions: vec![tx(1, Some(DEPOSIT), 1), tx(2, Some(DEPOSIT), 1)] }),
            Ok(ChainBlock { number: 2, transactions: vec![tx(3, Some(DEPOSIT), 1)] }),
            Err(BlockchainError::Rpc("gone".to_string())),
            Ok(ChainBlock { number: 3, transactions: vec![tx(4, Some(DEPOSIT), 1)] }),
        ])
        .boxed();

        let end = observer.run(blocks, shutdown.0.subscribe()).await;
        assert_eq!(end, ObserverState::Stopped);

        let seen = recorder.seen.lock().await.clone();
        assert_eq!(
            seen,
            vec![
                (1, TxHash::repeat_byte(1)),
                (1, TxHash::repeat_byte(2)),
                (2, TxHash::repeat_byte(3)),
            ]
        );

        // Terminal.
        let again = observer.run(stream::empty().boxed(), shutdown.0.subscribe()).await;
        assert_eq!(again, ObserverState::Stopped);
    }

    #[tokio::test]
    async fn test_shutdown_stops_watching() {
        let observer = Arc::new(TransferObserver::new(
            store_with_match().await,
            Arc::new(Recorder::default()),
            None,
        ));
        let (tx, rx) = broadcast::channel::<()>(1);
        let mut states = observer.subscribe_state();

        let runner = observer.clone();
        let handle = tokio::spawn(async move { runner.run(stream::pending().boxed(), rx).await });

        states.wait_for(|s| *s == ObserverState::Watching).await.unwrap();
        tx.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), ObserverState::Stopped);
        assert_eq!(observer.state(), ObserverState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_refresh_picks_up_new_match() {
        let store = store_with_match().await;
        let recorder = Arc::new(Recorder::default());
        let observer = TransferObserver::new(store.clone(), recorder.clone(), Some(Duration::from_secs(60)));
        let late = Address::repeat_byte(0xd1);

        let (tx, rx) = broadcast::channel::<()>(1);
        let feeder_store = store.clone();
        let blocks = stream::unfold(0u64, move |n| {
            let store = feeder_store.clone();
            async move {
                if n == 1 {
                    let mut addrs = BTreeMap::new();
                    addrs.insert("Lions".to_string(), late);
                    store.insert_new(Match::new("m2", "Lions vs Bears", addrs)).await.unwrap();
                    tokio::time::sleep(Duration::from_secs(61)).await;
                }
                if n == 3 {
                    return None;
                }
                let block = ChainBlock { number: n, transactions: vec![tx_to(n, late)] };
                Some((Ok(block), n + 1))
            }
        })
        .boxed();

        let end = observer.run(blocks, rx).await;
        drop(tx);
        assert_eq!(end, ObserverState::Stopped);

        // Block 0 predates the new match; blocks 1 and 2 are scanned after the refresh.
        let seen: Vec<u64> = recorder.seen.lock().await.iter().map(|(n, _)| *n).collect();
        assert_eq!(seen, vec![1, 2]);
    }

    fn tx_to(n: u64, to: Address) -> ChainTransaction {
        tx(n as u8 + 10, Some(to), 1)
    }
}
