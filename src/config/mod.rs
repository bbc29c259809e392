//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize, env overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!     → shared via AppContext to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AdminConfig;
pub use schema::BroadcastConfig;
pub use schema::ChainConfig;
pub use schema::DerivationConfig;
pub use schema::ObservabilityConfig;
pub use schema::ObserverConfig;
pub use schema::ServiceConfig;
pub use schema::SettlementConfig;
pub use schema::SignerConfig;
