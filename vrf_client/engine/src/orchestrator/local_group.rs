//! A whole group running in one process against [`SimulatedLedger`].
//!
//! Each node is a real [`RoundCoordinator`] with its own key and its own
//! ledger client; nodes are ticked in sweeps, index order, the way their
//! loops would interleave on a shared chain.

use std::sync::Arc;

use tracing::info;

use super::{LivenessPinger, RoundCoordinator, TickOutcome};
use crate::audit::AuditTracker;
use crate::config::FeeConfig;
use crate::crypto::{BlsScheme, LocalKeypair};
use crate::error::VrfError;
use crate::ledger::simulated::{DKG_CONTRACT, PING_CONTRACT, SimulatedLedger};
use crate::ledger::{DkgContract, PingContract};
use crate::types::{Binary, GroupStatus, RoundInfo};

pub const DEFAULT_ROUND_JUMP: u64 = 100;

pub struct LocalNode {
    pub address: String,
    pub keypair: Arc<LocalKeypair>,
    pub coordinator: RoundCoordinator<BlsScheme>,
    pub pinger: LivenessPinger,
    pub contract: DkgContract,
}

pub struct LocalGroup {
    ledger: SimulatedLedger,
    nodes: Vec<LocalNode>,
}

pub fn member_address(index: u32) -> String {
    format!("orai1member{index:02}")
}

impl LocalGroup {
    /// `members` nodes that all deal; `threshold + 1` shares sign a round.
    pub fn new(members: u32, threshold: u32) -> Result<Self, VrfError> {
        Self::with_ledger(SimulatedLedger::new(threshold, members, DEFAULT_ROUND_JUMP), members, 5)
    }

    /// Registers `members` fresh keys on `ledger` and builds their nodes.
    pub fn with_ledger(ledger: SimulatedLedger, members: u32, page_size: u8) -> Result<Self, VrfError> {
        if members == 0 {
            return Err(VrfError::Config("a group needs at least one member".into()));
        }
        if ledger.threshold() >= members {
            return Err(VrfError::Config(format!(
                "threshold must be below the member count {members}"
            )));
        }
        let scheme = Arc::new(BlsScheme);
        let nodes = (0..members)
            .map(|i| {
                let address = member_address(i);
                let keypair = Arc::new(LocalKeypair::generate());
                ledger.add_member(&address, keypair.public_key_bytes());

                let client = Arc::new(ledger.client(&address));
                let audit = Arc::new(AuditTracker::new(200));
                let contract = DkgContract::new(client.clone(), DKG_CONTRACT, FeeConfig::default());
                let coordinator = RoundCoordinator::new(
                    contract.clone(),
                    scheme.clone(),
                    keypair.clone(),
                    page_size,
                    audit.clone(),
                );
                let pinger = LivenessPinger::new(PingContract::new(client, PING_CONTRACT, None), audit);
                LocalNode {
                    address,
                    keypair,
                    coordinator,
                    pinger,
                    contract,
                }
            })
            .collect();
        Ok(LocalGroup { ledger, nodes })
    }

    pub fn ledger(&self) -> &SimulatedLedger {
        &self.ledger
    }

    pub fn nodes(&self) -> &[LocalNode] {
        &self.nodes
    }

    pub fn into_parts(self) -> (SimulatedLedger, Vec<LocalNode>) {
        (self.ledger, self.nodes)
    }

    pub fn node_mut(&mut self, index: usize) -> Option<&mut LocalNode> {
        self.nodes.get_mut(index)
    }

    /// One tick of every node, in index order.
    pub async fn sweep(&mut self) -> Vec<TickOutcome> {
        let mut outcomes = Vec::with_capacity(self.nodes.len());
        for node in &mut self.nodes {
            outcomes.push(node.coordinator.tick().await);
        }
        outcomes
    }

    /// Sweeps until the ledger reports `status`, at most `max_sweeps` times.
    pub async fn run_until_status(&mut self, status: GroupStatus, max_sweeps: usize) -> bool {
        for _ in 0..max_sweeps {
            if self.ledger.status() == status {
                return true;
            }
            self.sweep().await;
        }
        self.ledger.status() == status
    }

    /// Drives dealing and row sharing until the group accepts requests.
    pub async fn complete_dkg(&mut self) -> Result<(), VrfError> {
        if self.run_until_status(GroupStatus::WaitForRequest, 8).await {
            info!(members = self.nodes.len(), "dkg complete");
            Ok(())
        } else {
            Err(VrfError::Invariant(format!(
                "group stuck in {} after dkg sweeps",
                self.ledger.status()
            )))
        }
    }

    /// Requests randomness from node 0 and sweeps until the round is
    /// countersigned. Returns the finished round.
    pub async fn run_round(&mut self, input: &[u8]) -> Result<RoundInfo, VrfError> {
        let node = self
            .nodes
            .first()
            .ok_or_else(|| VrfError::Invariant("empty group".into()))?;
        node.coordinator.request_random(Binary::from(input)).await?;
        let round = self
            .ledger
            .latest_round()
            .ok_or_else(|| VrfError::Invariant("request_random created no round".into()))?;

        for _ in 0..4 {
            self.sweep().await;
            if let Some(info) = self.ledger.round(round) {
                if info.signed_combined_sig.is_some() {
                    info!(round, "round finished");
                    return Ok(info);
                }
            }
        }
        Err(VrfError::Invariant(format!("round {round} did not finish")))
    }
}
