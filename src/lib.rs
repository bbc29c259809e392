//! Remote-signed wager settlement library.

pub mod admin;
pub mod blockchain;
pub mod config;
pub mod context;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;
pub mod resilience;
pub mod settlement;
pub mod signer;

pub use config::schema::ServiceConfig;
pub use context::AppContext;
pub use lifecycle::Shutdown;
pub use settlement::SettlementEngine;
