//! Process-wide service context.
//!
//! Built once at startup and shared by `Arc`. Every component receives its
//! collaborators from here; nothing is cached in module-level state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::blockchain::{BlockchainClient, BlockchainError, Broadcaster, ChainRpc};
use crate::config::ServiceConfig;
use crate::lifecycle::Shutdown;
use crate::pipeline::PaymentPipeline;
use crate::settlement::observer::TransferObserver;
use crate::settlement::store::MatchStore;
use crate::settlement::types::StoreError;
use crate::settlement::SettlementEngine;
use crate::signer::{AddressDeriver, DerivationError, HttpAddressDeriver, HttpSigner, RemoteSigner};

#[derive(Debug, Error)]
pub enum ContextError {
    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Derivation(#[from] DerivationError),
}

pub struct AppContext {
    pub config: ServiceConfig,
    pub rpc: Arc<dyn ChainRpc>,
    /// Concrete client when running against a real node.
    pub chain: Option<Arc<BlockchainClient>>,
    pub store: MatchStore,
    pub pipeline: Arc<PaymentPipeline>,
    pub engine: Arc<SettlementEngine>,
    pub observer: Arc<TransferObserver>,
    pub shutdown: Shutdown,
}

impl AppContext {
    /// Wire up HTTP-backed collaborators from configuration.
    pub async fn from_config(config: ServiceConfig) -> Result<Self, ContextError> {
        let chain = Arc::new(BlockchainClient::new(config.chain.clone()).await?);
        let signer = Arc::new(HttpSigner::new(&config.signer));
        let deriver = Arc::new(HttpAddressDeriver::new(config.derivation.clone())?);
        let store = open_store(&config.settlement.store_path)?;

        let mut ctx = Self::assemble(config, chain.clone(), signer, deriver, store);
        ctx.chain = Some(chain);
        Ok(ctx)
    }

    /// Wire up the service from explicit collaborators.
    pub fn assemble(
        config: ServiceConfig,
        rpc: Arc<dyn ChainRpc>,
        signer: Arc<dyn RemoteSigner>,
        deriver: Arc<dyn AddressDeriver>,
        store: MatchStore,
    ) -> Self {
        let broadcaster = Broadcaster::new(
            rpc.clone(),
            config.chain.explorer_url.clone(),
            Duration::from_secs(config.broadcast.retry_delay_secs),
        );
        let pipeline = Arc::new(PaymentPipeline::new(
            rpc.clone(),
            signer,
            broadcaster,
            config.chain.chain_id.into(),
            config.chain.gas_limit,
            config.chain.currency.clone(),
        ));
        let engine = Arc::new(SettlementEngine::new(
            store.clone(),
            deriver,
            pipeline.clone(),
            &config.settlement,
        ));
        let refresh = match config.observer.snapshot_refresh_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let observer = Arc::new(TransferObserver::new(store.clone(), engine.clone(), refresh));

        Self {
            config,
            rpc,
            chain: None,
            store,
            pipeline,
            engine,
            observer,
            shutdown: Shutdown::new(),
        }
    }

    /// Whether the chain RPC answers.
    pub async fn chain_healthy(&self) -> bool {
        match &self.chain {
            Some(client) => client.is_healthy().await,
            None => self.rpc.get_block_number().await.is_ok(),
        }
    }
}

/// File-backed store, or in-memory when `path` is empty.
pub fn open_store(path: &str) -> Result<MatchStore, StoreError> {
    if path.trim().is_empty() {
        tracing::warn!("No store path configured, matches are kept in memory only");
        return Ok(MatchStore::new(None));
    }
    MatchStore::load_from_file(PathBuf::from(path))
}
