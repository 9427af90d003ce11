//! In-memory ledger emulating the DKG group contract and the health-check
//! contract. Every member gets its own [`SimulatedClient`] sharing one state,
//! which is how the integration tests and `vrf simulate` run a full group in
//! one process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::msg::{DkgExecute, DkgQuery, PingExecute, PingQuery, ShareSigMsg};
use super::{FeeSetting, LedgerClient};
use crate::crypto::bls::{self, PublicKeySet};
use crate::crypto::keys::verify_prehash;
use crate::error::VrfError;
use crate::types::{
    Binary, ContractInfo, DealerShare, GroupStatus, Member, PingRound, PingRoundInfo, RoundInfo,
    RowShare, SigShare, TxOutcome,
};

pub const DKG_CONTRACT: &str = "orai1vrfdkg";
pub const PING_CONTRACT: &str = "orai1ping";

const DEFAULT_LIMIT: u8 = 10;
const MAX_LIMIT: u8 = 30;

/// A successful write as the ledger recorded it.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRecord {
    pub sender: String,
    pub contract: String,
    pub action: String,
    pub msg: Value,
    pub fees: Option<FeeSetting>,
    pub height: u64,
}

struct DkgState {
    status: GroupStatus,
    threshold: u32,
    dealer: u32,
    members: BTreeMap<String, Member>,
    rounds: BTreeMap<u64, RoundInfo>,
    /// Round served by `current_handling`.
    round_count: u64,
    reported_total: Option<u32>,
    inclusive_offset: bool,
}

struct PingState {
    round_jump: u64,
    records: HashMap<String, PingRoundInfo>,
}

struct LedgerState {
    height: u64,
    tx_count: u64,
    dkg: DkgState,
    ping: PingState,
    writes: Vec<WriteRecord>,
    failing_queries: u32,
}

fn rejected(reason: impl Into<String>) -> VrfError {
    VrfError::Ledger(reason.into())
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, VrfError> {
    Ok(serde_json::to_value(value)?)
}

impl DkgState {
    fn active_members(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| !m.deleted)
    }

    /// Removed members stay in storage and keep counting towards the total.
    fn total(&self) -> u32 {
        self.members.len() as u32
    }

    fn member(&self, address: &str) -> Result<&Member, VrfError> {
        self.members
            .get(address)
            .filter(|m| !m.deleted)
            .ok_or_else(|| rejected(format!("{address} is not a member")))
    }

    fn public_key_set(&self) -> Result<PublicKeySet, VrfError> {
        let sums: Vec<&[u8]> = self
            .active_members()
            .filter_map(|m| m.shared_dealer.as_ref())
            .filter_map(|share| share.commits.first())
            .map(|c| c.as_slice())
            .collect();
        PublicKeySet::from_dealer_commits(&sums)
    }

    fn query(&self, msg: DkgQuery) -> Result<Value, VrfError> {
        match msg {
            DkgQuery::ContractInfo {} => to_value(&ContractInfo {
                status: self.status,
                threshold: self.threshold,
                total: self.reported_total.unwrap_or_else(|| self.total()),
                dealer: self.dealer,
            }),
            DkgQuery::GetMembers { offset, limit } => {
                let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT) as usize;
                let page: Vec<&Member> = self
                    .members
                    .values()
                    .filter(|m| match &offset {
                        None => true,
                        Some(o) if self.inclusive_offset => m.address.as_str() >= o.as_str(),
                        Some(o) => m.address.as_str() > o.as_str(),
                    })
                    .take(limit)
                    .collect();
                to_value(&page)
            }
            DkgQuery::GetMember { address } => to_value(&self.members.get(&address)),
            DkgQuery::CurrentHandling {} => to_value(&self.rounds.get(&self.round_count)),
        }
    }

    fn execute(&mut self, sender: &str, msg: DkgExecute) -> Result<&'static str, VrfError> {
        match msg {
            DkgExecute::ShareDealer { share } => self.share_dealer(sender, share).map(|_| "share_dealer"),
            DkgExecute::ShareRow { share } => self.share_row(sender, share).map(|_| "share_row"),
            DkgExecute::ShareSig { share } => self.share_sig(sender, share).map(|_| "share_sig"),
            DkgExecute::RequestRandom { input } => self.request_random(input).map(|_| "request_random"),
        }
    }

    fn share_dealer(&mut self, sender: &str, share: DealerShare) -> Result<(), VrfError> {
        if self.status != GroupStatus::WaitForDealer {
            return Err(rejected(format!("current status: {}", self.status)));
        }
        let total = self.total() as usize;
        if self.member(sender)?.has_dealt() {
            return Err(rejected(format!("{sender} can not change the share once submitted")));
        }
        share.validate(total)?;
        if let Some(member) = self.members.get_mut(sender) {
            member.shared_dealer = Some(share);
        }

        let dealers = self.active_members().filter(|m| m.has_dealt()).count() as u32;
        if dealers >= self.dealer {
            self.status = GroupStatus::WaitForRow;
        }
        Ok(())
    }

    fn share_row(&mut self, sender: &str, share: RowShare) -> Result<(), VrfError> {
        if self.status != GroupStatus::WaitForRow {
            return Err(rejected(format!("current status: {}", self.status)));
        }
        let member = self.member(sender)?;
        if member.has_shared_row() {
            return Err(rejected(format!("{sender} already shared its row")));
        }
        let expected = self.public_key_set()?.public_key_share(member.index);
        if share.pk_share.as_slice() != expected.as_slice() {
            return Err(rejected(format!("{sender} submitted an inconsistent public key share")));
        }
        if let Some(member) = self.members.get_mut(sender) {
            member.shared_row = Some(share);
        }

        if self.active_members().all(Member::has_shared_row) {
            self.status = GroupStatus::WaitForRequest;
        }
        Ok(())
    }

    fn share_sig(&mut self, sender: &str, share: ShareSigMsg) -> Result<(), VrfError> {
        let member = self.member(sender)?.clone();
        let threshold = self.threshold as usize;
        let pks = self.public_key_set()?;
        let info = self
            .rounds
            .get_mut(&share.round)
            .ok_or_else(|| rejected(format!("round {} not found", share.round)))?;

        if info.sigs.len() > threshold {
            if info.signed_combined_sig.is_some() {
                return Err(rejected(format!("round {} is finished", share.round)));
            }
            let signed_sig = share
                .countersignature()
                .cloned()
                .ok_or_else(|| rejected("all necessary signatures are collected"))?;
            let randomness = info
                .randomness
                .as_ref()
                .ok_or_else(|| rejected("combined round has no randomness"))?;
            if !verify_prehash(&member.pubkey, randomness, &signed_sig) {
                return Err(rejected("countersignature does not verify"));
            }
            info.signed_combined_sig = Some(signed_sig);
            info.signed_pubkey = Some(member.pubkey.clone());
            self.round_count = share.round + 1;
            return Ok(());
        }

        if info.signed_by(sender) {
            return Err(rejected(format!("{sender} already signed round {}", share.round)));
        }
        let pk_share = member
            .shared_row
            .as_ref()
            .ok_or_else(|| rejected(format!("{sender} has no public key share")))?;
        let msg = bls::round_message(&info.input, share.round);
        if !bls::verify_signature(&pk_share.pk_share, &msg, &share.sig) {
            return Err(rejected("signature share does not verify"));
        }
        info.sigs.push(SigShare {
            sender: sender.to_string(),
            sig: share.sig,
            index: member.index,
            round: share.round,
        });

        if info.sigs.len() > threshold {
            let shares: Vec<(u32, Vec<u8>)> =
                info.sigs.iter().map(|s| (s.index, s.sig.to_vec())).collect();
            let combined = bls::combine_signatures(&shares, self.threshold)?;
            let public_key = pks.public_key();
            if !bls::verify_signature(&public_key, &msg, &combined) {
                return Err(rejected("combined signature does not verify"));
            }
            info.randomness = Some(Binary(bls::derive_randomness(&combined)));
            info.combined_sig = Some(Binary(combined));
            info.combined_pubkey = Some(Binary(public_key));
        }
        Ok(())
    }

    fn request_random(&mut self, input: Binary) -> Result<(), VrfError> {
        if self.status != GroupStatus::WaitForRequest {
            return Err(rejected(format!("current status: {}", self.status)));
        }
        let round = self.rounds.keys().next_back().map_or(1, |latest| latest + 1);
        self.rounds.insert(round, RoundInfo::new(round, input));
        Ok(())
    }
}

impl PingState {
    fn record(&self, address: &str) -> PingRoundInfo {
        self.records.get(address).copied().unwrap_or_default()
    }

    fn query(&self, msg: PingQuery, height: u64) -> Result<Value, VrfError> {
        let PingQuery::GetRound(address) = msg;
        to_value(&PingRound {
            round_info: self.record(&address),
            round_jump: self.round_jump,
            current_height: height,
        })
    }

    fn ping(&mut self, sender: &str, height: u64) -> Result<(), VrfError> {
        let round = PingRound {
            round_info: self.record(sender),
            round_jump: self.round_jump,
            current_height: height,
        };
        if !round.is_due() {
            return Err(rejected(format!(
                "ping too early: next allowed at height {}",
                round.next_height()
            )));
        }
        self.records.insert(
            sender.to_string(),
            PingRoundInfo {
                round: round.round_info.round + 1,
                height,
            },
        );
        Ok(())
    }
}

/// Shared handle on the simulated chain.
#[derive(Clone)]
pub struct SimulatedLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl SimulatedLedger {
    /// Group waiting for `dealer` dealings; `threshold + 1` shares sign a round.
    pub fn new(threshold: u32, dealer: u32, round_jump: u64) -> Self {
        let state = LedgerState {
            height: 1,
            tx_count: 0,
            dkg: DkgState {
                status: GroupStatus::WaitForDealer,
                threshold,
                dealer,
                members: BTreeMap::new(),
                rounds: BTreeMap::new(),
                round_count: 1,
                reported_total: None,
                inclusive_offset: false,
            },
            ping: PingState {
                round_jump,
                records: HashMap::new(),
            },
            writes: Vec::new(),
            failing_queries: 0,
        };
        SimulatedLedger {
            state: Arc::new(RwLock::new(state)),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a member; indexes are handed out in registration order.
    pub fn add_member(&self, address: &str, pubkey: Vec<u8>) -> u32 {
        let mut state = self.write();
        let index = state.dkg.members.len() as u32;
        state.dkg.members.insert(
            address.to_string(),
            Member {
                address: address.to_string(),
                pubkey: Binary(pubkey),
                index,
                deleted: false,
                shared_dealer: None,
                shared_row: None,
            },
        );
        index
    }

    /// Marks a member deleted; it stays in storage like on the real contract.
    pub fn remove_member(&self, address: &str) {
        if let Some(member) = self.write().dkg.members.get_mut(address) {
            member.deleted = true;
        }
    }

    pub fn client(&self, sender: &str) -> SimulatedClient {
        SimulatedClient {
            ledger: self.clone(),
            sender: sender.to_string(),
        }
    }

    pub fn status(&self) -> GroupStatus {
        self.read().dkg.status
    }

    pub fn threshold(&self) -> u32 {
        self.read().dkg.threshold
    }

    pub fn member(&self, address: &str) -> Option<Member> {
        self.read().dkg.members.get(address).cloned()
    }

    pub fn round(&self, round: u64) -> Option<RoundInfo> {
        self.read().dkg.rounds.get(&round).cloned()
    }

    pub fn latest_round(&self) -> Option<u64> {
        self.read().dkg.rounds.keys().next_back().copied()
    }

    pub fn group_public_key(&self) -> Result<Vec<u8>, VrfError> {
        Ok(self.read().dkg.public_key_set()?.public_key())
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.read().writes.clone()
    }

    pub fn writes_of(&self, action: &str) -> Vec<WriteRecord> {
        self.read()
            .writes
            .iter()
            .filter(|w| w.action == action)
            .cloned()
            .collect()
    }

    pub fn advance_height(&self, blocks: u64) {
        self.write().height += blocks;
    }

    /// The next `count` queries fail as if the node were unreachable.
    pub fn fail_next_queries(&self, count: u32) {
        self.write().failing_queries = count;
    }

    /// Makes `contract_info` report `total` instead of the real member count.
    pub fn set_reported_total(&self, total: Option<u32>) {
        self.write().dkg.reported_total = total;
    }

    /// Pages start at the offset itself instead of strictly after it, so
    /// consecutive pages overlap by one member.
    pub fn set_inclusive_offset(&self, inclusive: bool) {
        self.write().dkg.inclusive_offset = inclusive;
    }

    pub fn set_member_pubkey(&self, address: &str, pubkey: Vec<u8>) {
        if let Some(member) = self.write().dkg.members.get_mut(address) {
            member.pubkey = Binary(pubkey);
        }
    }

    /// Flips one byte of the encrypted row `row` in `dealer`'s dealing.
    pub fn corrupt_dealer_row(&self, dealer: &str, row: usize) -> bool {
        let mut state = self.write();
        let target = state
            .dkg
            .members
            .get_mut(dealer)
            .and_then(|m| m.shared_dealer.as_mut())
            .and_then(|share| share.rows.get_mut(row))
            .and_then(|row| row.0.last_mut());
        match target {
            Some(byte) => {
                *byte ^= 0x01;
                true
            }
            None => false,
        }
    }

    fn query(&self, contract: &str, msg: &Value) -> Result<Value, VrfError> {
        let mut state = self.write();
        if state.failing_queries > 0 {
            state.failing_queries -= 1;
            return Err(rejected("simulated node unavailable"));
        }
        match contract {
            DKG_CONTRACT => state.dkg.query(serde_json::from_value(msg.clone())?),
            PING_CONTRACT => {
                let height = state.height;
                state.ping.query(serde_json::from_value(msg.clone())?, height)
            }
            other => Err(rejected(format!("unknown contract {other}"))),
        }
    }

    fn execute(
        &self,
        sender: &str,
        contract: &str,
        msg: &Value,
        fees: Option<&FeeSetting>,
    ) -> Result<TxOutcome, VrfError> {
        let mut state = self.write();
        let height = state.height;
        let action = match contract {
            DKG_CONTRACT => state.dkg.execute(sender, serde_json::from_value(msg.clone())?)?,
            PING_CONTRACT => {
                let PingExecute::Ping {} = serde_json::from_value::<PingExecute>(msg.clone())?;
                state.ping.ping(sender, height)?;
                "ping"
            }
            other => return Err(rejected(format!("unknown contract {other}"))),
        };

        state.tx_count += 1;
        state.height += 1;
        state.writes.push(WriteRecord {
            sender: sender.to_string(),
            contract: contract.to_string(),
            action: action.to_string(),
            msg: msg.clone(),
            fees: fees.cloned(),
            height,
        });
        debug!(sender, action, height, "simulated tx committed");
        Ok(TxOutcome {
            tx_hash: format!("SIM{:016X}", state.tx_count),
            height,
        })
    }
}

/// One member's view of the simulated ledger.
#[derive(Clone)]
pub struct SimulatedClient {
    ledger: SimulatedLedger,
    sender: String,
}

#[async_trait]
impl LedgerClient for SimulatedClient {
    async fn query(&self, contract: &str, msg: &Value) -> Result<Value, VrfError> {
        self.ledger.query(contract, msg)
    }

    async fn execute(
        &self,
        contract: &str,
        msg: &Value,
        fees: Option<&FeeSetting>,
    ) -> Result<TxOutcome, VrfError> {
        self.ledger.execute(&self.sender, contract, msg, fees)
    }

    fn sender(&self) -> &str {
        &self.sender
    }
}
