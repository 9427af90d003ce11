//! Recovers the local key share from every dealer's encrypted row.

use std::sync::Arc;

use tracing::{debug, instrument};
use zeroize::Zeroizing;

use crate::crypto::share_crypto::decrypt_row;
use crate::crypto::{LocalKeypair, ThresholdScheme};
use crate::error::VrfError;
use crate::types::Member;

pub struct ShareAssembler<S> {
    scheme: Arc<S>,
    keypair: Arc<LocalKeypair>,
}

fn share_failure(dealer: &Member, reason: impl ToString) -> VrfError {
    VrfError::PartialShareFailure {
        dealer: dealer.address.clone(),
        reason: reason.to_string(),
    }
}

impl<S: ThresholdScheme> ShareAssembler<S> {
    pub fn new(scheme: Arc<S>, keypair: Arc<LocalKeypair>) -> Self {
        ShareAssembler { scheme, keypair }
    }

    /// Decrypts `rows[local.index]` of each dealing and combines them.
    /// A single bad dealer aborts the whole assembly.
    #[instrument(name = "assemble", skip_all, fields(index = local.index, dealers = dealers.len()))]
    pub fn assemble(&self, local: &Member, dealers: &[Member], total: u32) -> Result<S::KeyShare, VrfError> {
        let position = local.index as usize;
        let mut rows: Vec<Zeroizing<Vec<u8>>> = Vec::with_capacity(dealers.len());
        let mut commits: Vec<Vec<u8>> = Vec::with_capacity(dealers.len());

        for dealer in dealers {
            let share = dealer
                .shared_dealer
                .as_ref()
                .ok_or_else(|| share_failure(dealer, "no dealing"))?;
            share.validate(total as usize)?;
            let sealed = share
                .rows
                .get(position)
                .ok_or_else(|| share_failure(dealer, format!("missing row {position}")))?;
            let commit = share
                .commits
                .get(position + 1)
                .ok_or_else(|| share_failure(dealer, format!("missing commit {}", position + 1)))?;

            let row = decrypt_row(self.keypair.secret(), &dealer.pubkey, commit, sealed)
                .map_err(|e| share_failure(dealer, e))?;
            debug!(dealer = %dealer.address, "row decrypted");
            rows.push(row);
            commits.push(commit.to_vec());
        }

        self.scheme.combine(&rows, &commits).map_err(|err| {
            // Name the first dealer whose row fails on its own.
            let culprit = rows
                .iter()
                .zip(&commits)
                .zip(dealers)
                .find(|((row, commit), _)| {
                    self.scheme
                        .combine(std::slice::from_ref(*row), std::slice::from_ref(*commit))
                        .is_err()
                })
                .map(|(_, dealer)| dealer.address.clone());
            VrfError::PartialShareFailure {
                dealer: culprit.unwrap_or_else(|| "*".to_string()),
                reason: err.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{BlsScheme, KeyShare};
    use crate::dkg::dealer::build_dealer_share;
    use crate::types::Binary;

    struct Group {
        keys: Vec<Arc<LocalKeypair>>,
        members: Vec<Member>,
    }

    fn dealt_group(n: usize, threshold: u32) -> Group {
        let keys: Vec<_> = (0..n).map(|_| Arc::new(LocalKeypair::generate())).collect();
        let mut members: Vec<Member> = keys
            .iter()
            .enumerate()
            .map(|(i, k)| Member {
                address: format!("orai1m{i}"),
                pubkey: Binary(k.public_key_bytes()),
                index: i as u32,
                deleted: false,
                shared_dealer: None,
                shared_row: None,
            })
            .collect();
        let shares: Vec<_> = keys
            .iter()
            .map(|k| build_dealer_share(&BlsScheme, k.secret(), threshold, &members).unwrap())
            .collect();
        for (m, share) in members.iter_mut().zip(shares) {
            m.shared_dealer = Some(share);
        }
        Group { keys, members }
    }

    #[test]
    fn test_every_member_assembles_a_share() {
        let group = dealt_group(4, 2);
        let mut public_shares = Vec::new();
        for (key, member) in group.keys.iter().zip(&group.members) {
            let assembler = ShareAssembler::new(Arc::new(BlsScheme), key.clone());
            let share = assembler.assemble(member, &group.members, 4).unwrap();
            public_shares.push(share.public_share());
        }
        public_shares.dedup();
        assert_eq!(public_shares.len(), 4);
    }

    #[test]
    fn test_tampered_row_names_the_dealer() {
        let mut group = dealt_group(3, 1);
        if let Some(share) = group.members[2].shared_dealer.as_mut() {
            share.rows[0].0[40] ^= 0x80;
        }
        let assembler = ShareAssembler::new(Arc::new(BlsScheme), group.keys[0].clone());
        let err = assembler.assemble(&group.members[0], &group.members, 3).err().unwrap();
        match err {
            VrfError::PartialShareFailure { dealer, .. } => assert_eq!(dealer, "orai1m2"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_wrong_row_count_is_an_invariant_violation() {
        let group = dealt_group(3, 1);
        let assembler = ShareAssembler::new(Arc::new(BlsScheme), group.keys[0].clone());
        let err = assembler.assemble(&group.members[0], &group.members, 4).err().unwrap();
        assert!(matches!(err, VrfError::Invariant(_)));
    }
}
