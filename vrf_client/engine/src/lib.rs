//! VRF Engine Core Library
//!
//! Protocol client for a threshold VRF group: distributed key generation with
//! encrypted verifiable secret sharing, then per-round threshold signatures
//! whose hash is the published randomness. All coordination goes through a
//! ledger behind [`ledger::LedgerClient`].

pub mod audit;
pub mod config;
pub mod crypto;
pub mod dkg;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod mpc;
pub mod orchestrator;
pub mod types;

pub use config::ClientConfig;
pub use error::VrfError;
pub use orchestrator::{LocalGroup, ProtocolClient, RoundCoordinator, TickOutcome};
