//! Drives the group lifecycle from ledger-observed status.
//!
//! Each tick reads `contract_info` and dispatches to the phase handler:
//! `WaitForDealer` deals, `WaitForRow` publishes the public key share and
//! `WaitForRequest` contributes to the current round. Errors end the tick,
//! clear [`LocalState`] and are retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, instrument, warn};

use crate::audit::{AuditEventType, AuditTracker};
use crate::config::ClientConfig;
use crate::crypto::{BlsScheme, LocalKeypair, ThresholdScheme};
use crate::dkg::{DealOutcome, DealerProtocol, LocalState, MemberDirectory, ShareAssembler};
use crate::error::VrfError;
use crate::ledger::{DkgContract, LedgerClient, PingContract, RestLedger};
use crate::mpc::{RoundOutcome, RowOutcome, ThresholdSigner};
use crate::types::{Binary, ContractInfo, GroupStatus, TxOutcome};

pub mod local_group;
pub mod ping;
pub mod scheduler;

pub use local_group::LocalGroup;
pub use ping::{LivenessPinger, PingOutcome};
pub use scheduler::{PeriodicTask, TaskHandle, spawn_periodic};

/// What one tick ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Dealt(DealOutcome),
    Row(RowOutcome),
    Round(RoundOutcome),
    /// The local address is not an active member.
    NotMember,
    /// The ledger has not caught up yet (membership, dealer count).
    NotReady(String),
    Failed(String),
}

/// Submits `request_random` and records it in `audit`.
pub async fn request_randomness(
    contract: &DkgContract,
    audit: &AuditTracker,
    input: Binary,
) -> Result<TxOutcome, VrfError> {
    let detail = format!("{} input bytes", input.len());
    let tx = contract.request_random(input).await?;
    audit.record(AuditEventType::RequestRandom, None, format!("{detail}, tx {}", tx.tx_hash));
    info!(tx_hash = %tx.tx_hash, "randomness requested");
    Ok(tx)
}

pub struct RoundCoordinator<S: ThresholdScheme> {
    contract: DkgContract,
    directory: MemberDirectory,
    dealer: DealerProtocol<S>,
    assembler: ShareAssembler<S>,
    signer: ThresholdSigner,
    state: LocalState<S::KeyShare>,
    audit: Arc<AuditTracker>,
}

impl<S: ThresholdScheme> RoundCoordinator<S> {
    pub fn new(
        contract: DkgContract,
        scheme: Arc<S>,
        keypair: Arc<LocalKeypair>,
        page_size: u8,
        audit: Arc<AuditTracker>,
    ) -> Self {
        RoundCoordinator {
            directory: MemberDirectory::new(contract.clone(), page_size),
            dealer: DealerProtocol::new(contract.clone(), scheme.clone(), keypair.clone()),
            assembler: ShareAssembler::new(scheme, keypair.clone()),
            signer: ThresholdSigner::new(contract.clone(), keypair),
            contract,
            state: LocalState::default(),
            audit,
        }
    }

    pub fn state(&self) -> &LocalState<S::KeyShare> {
        &self.state
    }

    pub fn audit(&self) -> &Arc<AuditTracker> {
        &self.audit
    }

    pub async fn request_random(&self, input: Binary) -> Result<TxOutcome, VrfError> {
        request_randomness(&self.contract, &self.audit, input).await
    }

    /// Runs one tick. Never fails; the outcome says what happened.
    #[instrument(name = "tick", skip(self), fields(address = %self.contract.sender()))]
    pub async fn tick(&mut self) -> TickOutcome {
        match self.step().await {
            Ok(outcome) => outcome,
            Err(e) if e.is_not_ready() => {
                info!(reason = %e, "group not ready");
                self.state.invalidate();
                TickOutcome::NotReady(e.to_string())
            }
            Err(e) => {
                if e.is_integrity_failure() {
                    error!(error = %e, "integrity failure, key share discarded");
                } else {
                    warn!(error = %e, "tick failed");
                }
                self.state.invalidate();
                TickOutcome::Failed(e.to_string())
            }
        }
    }

    async fn step(&mut self) -> Result<TickOutcome, VrfError> {
        // STEP 1: Read group status
        let info = self.contract.contract_info().await?;
        info!(status = %info.status, total = info.total, dealer = info.dealer, "group status");

        // STEP 2: Refresh membership unless a signing group is already cached
        if info.status != GroupStatus::WaitForRequest || self.state.members.is_none() {
            let members = self.directory.get_members(info.total).await?;
            self.state.reset_members();
            self.state.members = Some(members);
            self.state.current_member = self.directory.get_member(self.contract.sender()).await?;
        }

        // STEP 3: Phase handler
        match info.status {
            GroupStatus::WaitForDealer => self.handle_dealing(&info).await,
            GroupStatus::WaitForRow => self.handle_row(&info).await,
            GroupStatus::WaitForRequest => self.handle_request(&info).await,
        }
    }

    async fn handle_dealing(&mut self, info: &ContractInfo) -> Result<TickOutcome, VrfError> {
        let members = self.state.members.as_deref().unwrap_or_default();
        let outcome = self
            .dealer
            .deal(info, members, self.state.current_member.as_ref())
            .await?;
        match &outcome {
            DealOutcome::Submitted(tx) => self.audit.record(
                AuditEventType::ShareDealer,
                None,
                format!("{} rows, tx {}", info.total, tx.tx_hash),
            ),
            skipped => self.audit.record(AuditEventType::Skip, None, format!("deal: {skipped:?}")),
        }
        Ok(TickOutcome::Dealt(outcome))
    }

    /// Builds the key share from the cached membership when it is not cached yet.
    fn ensure_key_share(&mut self, info: &ContractInfo) -> Result<bool, VrfError> {
        if self.state.sk_share.is_some() {
            return Ok(true);
        }
        let Some(current) = self.state.current_member.as_ref() else {
            return Ok(false);
        };
        let members = self.state.members.as_deref().unwrap_or_default();
        let dealers = MemberDirectory::get_dealers(members, info.dealer)?;
        let share = self.assembler.assemble(current, &dealers, info.total)?;
        self.state.sk_share = Some(share);
        Ok(true)
    }

    async fn handle_row(&mut self, info: &ContractInfo) -> Result<TickOutcome, VrfError> {
        if !self.ensure_key_share(info)? {
            return Ok(TickOutcome::NotMember);
        }
        let (Some(current), Some(key_share)) =
            (self.state.current_member.as_ref(), self.state.sk_share.as_ref())
        else {
            return Ok(TickOutcome::NotMember);
        };

        let outcome = self.signer.submit_row_share(current, key_share).await?;
        match &outcome {
            RowOutcome::Submitted(tx) => {
                self.audit
                    .record(AuditEventType::ShareRow, None, format!("tx {}", tx.tx_hash));
                // Membership snapshots are stale once our row is on the ledger.
                self.state.reset_members();
            }
            RowOutcome::AlreadyShared => {
                self.audit.record(AuditEventType::Skip, None, "row already shared")
            }
        }
        Ok(TickOutcome::Row(outcome))
    }

    async fn handle_request(&mut self, info: &ContractInfo) -> Result<TickOutcome, VrfError> {
        if !self.ensure_key_share(info)? {
            return Ok(TickOutcome::NotMember);
        }
        let Some(key_share) = self.state.sk_share.as_ref() else {
            return Ok(TickOutcome::NotMember);
        };

        let round_info = self.contract.current_handling().await?;
        let outcome = self
            .signer
            .submit_round_share(key_share, round_info.as_ref())
            .await?;
        match &outcome {
            RoundOutcome::Submitted { round, countersigned } => self.audit.record(
                AuditEventType::ShareSig,
                Some(*round),
                if *countersigned { "share + countersignature" } else { "share" },
            ),
            RoundOutcome::NoRound => {}
            RoundOutcome::AlreadySigned { round } | RoundOutcome::Finished { round } => {
                self.audit
                    .record(AuditEventType::Skip, Some(*round), format!("sign: {outcome:?}"))
            }
        }
        Ok(TickOutcome::Round(outcome))
    }
}

#[async_trait]
impl<S> PeriodicTask for RoundCoordinator<S>
where
    S: ThresholdScheme + 'static,
{
    fn name(&self) -> &'static str {
        "rounds"
    }

    async fn run_tick(&mut self) {
        self.tick().await;
    }
}

/// The two periodic loops of a running member.
pub struct ProtocolClient {
    rounds: TaskHandle,
    ping: TaskHandle,
}

impl ProtocolClient {
    pub fn spawn<S: ThresholdScheme + 'static>(
        coordinator: RoundCoordinator<S>,
        interval: Duration,
        pinger: LivenessPinger,
        ping_interval: Duration,
    ) -> Self {
        ProtocolClient {
            rounds: spawn_periodic(coordinator, interval),
            ping: spawn_periodic(pinger, ping_interval),
        }
    }

    /// Wires both loops to a live node as described by `config`.
    pub fn start(config: &ClientConfig, keypair: LocalKeypair) -> Result<Self, VrfError> {
        config.validate()?;
        let ledger: Arc<dyn LedgerClient> = Arc::new(RestLedger::new(
            &config.lcd_url,
            &config.broadcast_url,
            config.sender.clone(),
        )?);
        let audit = Arc::new(AuditTracker::default());
        let dkg = DkgContract::new(ledger.clone(), config.contract.clone(), config.fees.clone());
        let ping = PingContract::new(ledger, config.ping_contract.clone(), config.fees.default.clone());

        let coordinator = RoundCoordinator::new(
            dkg,
            Arc::new(BlsScheme),
            Arc::new(keypair),
            config.page_size,
            audit.clone(),
        );
        let pinger = LivenessPinger::new(ping, audit);
        Ok(Self::spawn(
            coordinator,
            Duration::from_millis(config.interval_ms),
            pinger,
            Duration::from_millis(config.ping_interval_ms),
        ))
    }

    /// Stops both loops and waits for their in-flight ticks.
    pub async fn shutdown(self) -> Result<(), VrfError> {
        self.rounds.stop();
        self.ping.stop();
        let rounds = self.rounds.shutdown().await;
        let ping = self.ping.shutdown().await;
        rounds.and(ping)
    }
}
