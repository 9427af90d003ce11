//! Liveness ping against the health-check contract.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use super::scheduler::PeriodicTask;
use crate::audit::{AuditEventType, AuditTracker};
use crate::error::VrfError;
use crate::ledger::PingContract;
use crate::types::TxOutcome;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PingOutcome {
    Pinged(TxOutcome),
    /// `remaining` blocks until the next ping is accepted.
    NotDue { remaining: u64 },
}

pub struct LivenessPinger {
    contract: PingContract,
    audit: Arc<AuditTracker>,
}

impl LivenessPinger {
    pub fn new(contract: PingContract, audit: Arc<AuditTracker>) -> Self {
        LivenessPinger { contract, audit }
    }

    /// Pings if the first round is pending or `round_jump` blocks have passed.
    #[instrument(name = "ping", skip(self), fields(address = %self.contract.sender()))]
    pub async fn ping_once(&self) -> Result<PingOutcome, VrfError> {
        let round = self.contract.get_round(self.contract.sender()).await?;
        if !round.is_due() {
            let remaining = round.blocks_until_due();
            info!(height = round.current_height, remaining, "ping not due");
            return Ok(PingOutcome::NotDue { remaining });
        }
        let tx = self.contract.ping().await?;
        self.audit.record(
            AuditEventType::Ping,
            Some(round.round_info.round + 1),
            format!("tx {}", tx.tx_hash),
        );
        info!(tx_hash = %tx.tx_hash, "pinged");
        Ok(PingOutcome::Pinged(tx))
    }
}

#[async_trait]
impl PeriodicTask for LivenessPinger {
    fn name(&self) -> &'static str {
        "ping"
    }

    async fn run_tick(&mut self) {
        if let Err(e) = self.ping_once().await {
            warn!(error = %e, "ping failed");
        }
    }
}
