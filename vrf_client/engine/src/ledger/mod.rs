//! Narrow query/execute surface to the coordination ledger.
//!
//! The protocol only ever sees [`LedgerClient`]; the simulated ledger and the
//! REST adapter are interchangeable behind it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::VrfError;
use crate::types::TxOutcome;

pub mod contract;
pub mod msg;
pub mod rest;
pub mod simulated;

pub use contract::{DkgContract, PingContract};
pub use rest::RestLedger;
pub use simulated::{SimulatedClient, SimulatedLedger};

/// Fee and gas override attached to a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSetting {
    pub amount: String,
    pub gas: u64,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Smart query against `contract`; returns the decoded JSON response.
    async fn query(&self, contract: &str, msg: &Value) -> Result<Value, VrfError>;

    /// Signs and broadcasts an execute message as the local member.
    async fn execute(
        &self,
        contract: &str,
        msg: &Value,
        fees: Option<&FeeSetting>,
    ) -> Result<TxOutcome, VrfError>;

    /// Ledger address the writes are sent from.
    fn sender(&self) -> &str;
}
