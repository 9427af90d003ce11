//! Row-share publication and per-round signature contribution.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::crypto::{KeyShare, LocalKeypair};
use crate::error::VrfError;
use crate::ledger::DkgContract;
use crate::ledger::msg::ShareSigMsg;
use crate::types::{Binary, Member, RoundInfo, RowShare, TxOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Submitted(TxOutcome),
    AlreadyShared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// A `share_sig` went out; `countersigned` when it carried the randomness signature.
    Submitted { round: u64, countersigned: bool },
    NoRound,
    /// Our share is in and the round is still waiting for others.
    AlreadySigned { round: u64 },
    /// The round's randomness is already countersigned.
    Finished { round: u64 },
}

pub struct ThresholdSigner {
    contract: DkgContract,
    keypair: Arc<LocalKeypair>,
}

impl ThresholdSigner {
    pub fn new(contract: DkgContract, keypair: Arc<LocalKeypair>) -> Self {
        ThresholdSigner { contract, keypair }
    }

    /// Publishes the public key share once; the ledger's `shared_row` is the guard.
    #[instrument(name = "share_row", skip_all, fields(address = %current.address))]
    pub async fn submit_row_share<K: KeyShare>(
        &self,
        current: &Member,
        key_share: &K,
    ) -> Result<RowOutcome, VrfError> {
        if current.has_shared_row() {
            info!("row share already on the ledger");
            return Ok(RowOutcome::AlreadyShared);
        }
        let share = RowShare {
            pk_share: Binary(key_share.public_share()),
        };
        let tx = self.contract.share_row(share).await?;
        info!(tx_hash = %tx.tx_hash, "row share submitted");
        Ok(RowOutcome::Submitted(tx))
    }

    #[instrument(name = "sign", skip_all, fields(round = round_info.map(|r| r.round)))]
    pub async fn submit_round_share<K: KeyShare>(
        &self,
        key_share: &K,
        round_info: Option<&RoundInfo>,
    ) -> Result<RoundOutcome, VrfError> {
        let Some(round_info) = round_info else {
            return Ok(RoundOutcome::NoRound);
        };
        let round = round_info.round;

        if round_info.signed_by(self.contract.sender()) && round_info.combined_sig.is_none() {
            info!("already signed, waiting for the other shares");
            return Ok(RoundOutcome::AlreadySigned { round });
        }
        if round_info.signed_combined_sig.is_some() {
            info!("round already countersigned");
            return Ok(RoundOutcome::Finished { round });
        }

        let sig = key_share.sign(&round_info.input, round);
        let signed_sig = match &round_info.combined_sig {
            Some(combined) => {
                let randomness = match &round_info.randomness {
                    Some(r) => r.to_vec(),
                    None => Sha256::digest(combined.as_slice()).to_vec(),
                };
                Binary(self.keypair.sign_prehash(&randomness)?)
            }
            None => Binary::default(),
        };
        let countersigned = !signed_sig.is_empty();

        let tx = self
            .contract
            .share_sig(ShareSigMsg {
                sig: Binary(sig),
                round,
                signed_sig,
            })
            .await?;
        info!(tx_hash = %tx.tx_hash, countersigned, "signature share submitted");
        Ok(RoundOutcome::Submitted { round, countersigned })
    }
}
