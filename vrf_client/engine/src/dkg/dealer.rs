//! Dealing phase: one encrypted VSS share set per member, submitted once.

use std::sync::Arc;

use k256::SecretKey;
use tracing::{info, instrument, warn};

use crate::crypto::share_crypto::encrypt_row;
use crate::crypto::{LocalKeypair, ThresholdScheme};
use crate::error::VrfError;
use crate::ledger::DkgContract;
use crate::types::{Binary, ContractInfo, DealerShare, Member, TxOutcome};

/// What a dealing attempt did. Everything but `Submitted` is a non-fatal skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DealOutcome {
    Submitted(TxOutcome),
    MembershipPartial { found: usize, total: u32 },
    NotMember,
    AlreadyDealt,
    PubkeyMismatch,
}

/// Encrypts row `i` of a fresh share set for the member at sorted position `i`.
///
/// Members must carry indexes `0..n`; the row position and the ledger index
/// are the same number on both the dealing and the receiving side.
pub fn build_dealer_share<S: ThresholdScheme>(
    scheme: &S,
    local_priv: &SecretKey,
    threshold: u32,
    members: &[Member],
) -> Result<DealerShare, VrfError> {
    let mut sorted: Vec<&Member> = members.iter().collect();
    sorted.sort_by_key(|m| m.index);
    if let Some((pos, m)) = sorted.iter().enumerate().find(|(pos, m)| m.index as usize != *pos) {
        return Err(VrfError::Invariant(format!(
            "member {} has index {} at position {pos}",
            m.address, m.index
        )));
    }

    let set = scheme.generate_shares(threshold, sorted.len() as u32)?;
    let rows = sorted
        .iter()
        .zip(&set.rows)
        .enumerate()
        .map(|(i, (member, row))| {
            encrypt_row(local_priv, &member.pubkey, &set.commits[i + 1], row).map(Binary)
        })
        .collect::<Result<Vec<_>, _>>()?;
    let commits = set.commits.into_iter().map(Binary).collect();
    Ok(DealerShare { commits, rows })
}

pub struct DealerProtocol<S> {
    contract: DkgContract,
    scheme: Arc<S>,
    keypair: Arc<LocalKeypair>,
}

impl<S: ThresholdScheme> DealerProtocol<S> {
    pub fn new(contract: DkgContract, scheme: Arc<S>, keypair: Arc<LocalKeypair>) -> Self {
        DealerProtocol {
            contract,
            scheme,
            keypair,
        }
    }

    #[instrument(name = "deal", skip_all, fields(total = info.total, threshold = info.threshold))]
    pub async fn deal(
        &self,
        info: &ContractInfo,
        members: &[Member],
        current: Option<&Member>,
    ) -> Result<DealOutcome, VrfError> {
        if members.len() != info.total as usize {
            info!(found = members.len(), "membership not complete, not dealing");
            return Ok(DealOutcome::MembershipPartial {
                found: members.len(),
                total: info.total,
            });
        }
        let Some(current) = current else {
            info!("not a member of this group");
            return Ok(DealOutcome::NotMember);
        };
        if current.has_dealt() {
            info!(address = %current.address, "already dealt");
            return Ok(DealOutcome::AlreadyDealt);
        }
        if current.pubkey.as_slice() != self.keypair.public_key_bytes().as_slice() {
            warn!(address = %current.address, "registered pubkey differs from the local key");
            return Ok(DealOutcome::PubkeyMismatch);
        }

        let share = build_dealer_share(self.scheme.as_ref(), self.keypair.secret(), info.threshold, members)?;
        let tx = self.contract.share_dealer(share).await?;
        info!(tx_hash = %tx.tx_hash, "dealer share submitted");
        Ok(DealOutcome::Submitted(tx))
    }
}
