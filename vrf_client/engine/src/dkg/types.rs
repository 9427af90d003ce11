// File: src/dkg/types.rs

use crate::types::Member;

/// Process-local cache of what the last ticks learned from the ledger.
///
/// Nothing here is authoritative; any error or membership change drops it and
/// the next tick rebuilds it from ledger snapshots.
pub struct LocalState<K> {
    pub current_member: Option<Member>, // Local member as last seen on the ledger
    pub members: Option<Vec<Member>>,   // Full membership, sorted by index
    pub sk_share: Option<K>,            // Combined key share, tied to `members`
}

impl<K> Default for LocalState<K> {
    fn default() -> Self {
        LocalState {
            current_member: None,
            members: None,
            sk_share: None,
        }
    }
}

impl<K> LocalState<K> {
    /// Drops the membership and everything derived from it.
    pub fn reset_members(&mut self) {
        self.members = None;
        self.sk_share = None;
    }

    pub fn invalidate(&mut self) {
        self.current_member = None;
        self.reset_members();
    }

    pub fn is_empty(&self) -> bool {
        self.current_member.is_none() && self.members.is_none() && self.sk_share.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Binary;

    #[test]
    fn test_reset_members_drops_key_share() {
        let mut state: LocalState<u8> = LocalState::default();
        state.current_member = Some(Member {
            address: "orai1me".into(),
            pubkey: Binary(vec![2; 33]),
            index: 0,
            deleted: false,
            shared_dealer: None,
            shared_row: None,
        });
        state.members = Some(vec![]);
        state.sk_share = Some(7);

        state.reset_members();
        assert!(state.members.is_none());
        assert!(state.sk_share.is_none());
        assert!(state.current_member.is_some());

        state.invalidate();
        assert!(state.is_empty());
    }
}
