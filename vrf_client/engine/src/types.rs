//! Shared data types for the VRF engine: ledger snapshots of members, dealer
//! shares, rounds and group status.

use std::fmt;
use std::ops::Deref;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VrfError;

/// Raw bytes that travel over the ledger as a base64 string.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    pub fn from_base64(encoded: &str) -> Result<Self, VrfError> {
        STANDARD
            .decode(encoded)
            .map(Binary)
            .map_err(|e| VrfError::Invariant(format!("invalid base64: {e}")))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }
}

impl Deref for Binary {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Binary(bytes)
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Binary(bytes.to_vec())
    }
}

impl fmt::Display for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl fmt::Debug for Binary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Binary({})", self.to_base64())
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map(Binary).map_err(D::Error::custom)
    }
}

/// Dealer contribution: public commitments plus one encrypted row per member.
///
/// `commits[0]` is the sum commitment; `commits[i + 1]` commits to `rows[i]`,
/// which is readable only by the member at sorted position `i`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealerShare {
    pub commits: Vec<Binary>,
    pub rows: Vec<Binary>,
}

impl DealerShare {
    /// Checks `len(rows) == len(commits) - 1 == total`.
    pub fn validate(&self, total: usize) -> Result<(), VrfError> {
        if self.rows.len() != total || self.commits.len() != total + 1 {
            return Err(VrfError::Invariant(format!(
                "dealer share has {} rows and {} commits for {} members",
                self.rows.len(),
                self.commits.len(),
                total
            )));
        }
        Ok(())
    }
}

/// Public key share published after a member combined its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowShare {
    pub pk_share: Binary,
}

/// Ledger snapshot of a group member. Identity is `address`; `index` orders
/// share addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub address: String,
    pub pubkey: Binary,
    pub index: u32,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub shared_dealer: Option<DealerShare>,
    #[serde(default)]
    pub shared_row: Option<RowShare>,
}

impl Member {
    pub fn has_dealt(&self) -> bool {
        self.shared_dealer.is_some()
    }

    pub fn has_shared_row(&self) -> bool {
        self.shared_row.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupStatus {
    WaitForDealer,
    WaitForRow,
    WaitForRequest,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GroupStatus::WaitForDealer => "WaitForDealer",
            GroupStatus::WaitForRow => "WaitForRow",
            GroupStatus::WaitForRequest => "WaitForRequest",
        };
        f.write_str(label)
    }
}

/// `contract_info` response. `dealer` is the number of dealers the ledger
/// waits for before leaving `WaitForDealer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub status: GroupStatus,
    pub threshold: u32,
    pub total: u32,
    pub dealer: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigShare {
    pub sender: String,
    pub sig: Binary,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub round: u64,
}

/// One randomness round as observed on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    pub round: u64,
    pub input: Binary,
    #[serde(default)]
    pub sigs: Vec<SigShare>,
    #[serde(default)]
    pub combined_sig: Option<Binary>,
    #[serde(default)]
    pub combined_pubkey: Option<Binary>,
    #[serde(default)]
    pub randomness: Option<Binary>,
    #[serde(default, alias = "signed_eth_combined_sig")]
    pub signed_combined_sig: Option<Binary>,
    #[serde(default, alias = "signed_eth_pubkey")]
    pub signed_pubkey: Option<Binary>,
}

impl RoundInfo {
    pub fn new(round: u64, input: Binary) -> Self {
        RoundInfo {
            round,
            input,
            sigs: Vec::new(),
            combined_sig: None,
            combined_pubkey: None,
            randomness: None,
            signed_combined_sig: None,
            signed_pubkey: None,
        }
    }

    pub fn signed_by(&self, address: &str) -> bool {
        self.sigs.iter().any(|s| s.sender == address)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRoundInfo {
    #[serde(default)]
    pub round: u64,
    pub height: u64,
}

/// `get_round` response from the health-check contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRound {
    pub round_info: PingRoundInfo,
    pub round_jump: u64,
    pub current_height: u64,
}

impl PingRound {
    /// A ping is due on the first round or once `round_jump` blocks passed.
    pub fn is_due(&self) -> bool {
        self.round_info.height == 0
            || self.current_height.saturating_sub(self.round_info.height) >= self.round_jump
    }

    pub fn next_height(&self) -> u64 {
        self.round_info.height.saturating_add(self.round_jump)
    }

    pub fn blocks_until_due(&self) -> u64 {
        if self.is_due() {
            return 0;
        }
        self.next_height().saturating_sub(self.current_height)
    }
}

/// Result of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    #[serde(alias = "txhash")]
    pub tx_hash: String,
    #[serde(default)]
    pub height: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binary_serializes_as_base64() {
        let bin = Binary(b"hello".to_vec());
        assert_eq!(serde_json::to_string(&bin).unwrap(), "\"aGVsbG8=\"");
        let back: Binary = serde_json::from_str("\"aGVsbG8=\"").unwrap();
        assert_eq!(back.as_slice(), b"hello");
        assert!(serde_json::from_str::<Binary>("\"not base64!\"").is_err());
    }

    #[test]
    fn test_member_from_ledger_json() {
        let json = r#"{
            "address": "orai1abc",
            "pubkey": "AQID",
            "index": 2,
            "deleted": false,
            "shared_dealer": null,
            "shared_row": {"pk_share": "BAU="}
        }"#;
        let member: Member = serde_json::from_str(json).unwrap();
        assert_eq!(member.index, 2);
        assert!(!member.has_dealt());
        assert!(member.has_shared_row());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let json = r#"{"status": "WaitForSomething", "threshold": 1, "total": 2, "dealer": 2}"#;
        assert!(serde_json::from_str::<ContractInfo>(json).is_err());
    }

    #[test]
    fn test_round_info_accepts_eth_field_names() {
        let json = r#"{"round": 3, "input": "aGVsbG8=", "sigs": [],
            "signed_eth_combined_sig": "AQ=="}"#;
        let info: RoundInfo = serde_json::from_str(json).unwrap();
        assert_eq!(info.signed_combined_sig, Some(Binary(vec![1])));
        assert!(info.combined_sig.is_none());
    }

    #[test]
    fn test_dealer_share_validation() {
        let share = DealerShare {
            commits: vec![Binary(vec![0]); 6],
            rows: vec![Binary(vec![1]); 5],
        };
        assert!(share.validate(5).is_ok());
        assert!(share.validate(4).is_err());
    }

    #[test]
    fn test_ping_due() {
        let mut round = PingRound {
            round_info: PingRoundInfo { round: 0, height: 0 },
            round_jump: 100,
            current_height: 10,
        };
        assert!(round.is_due());
        round.round_info.height = 5;
        assert!(!round.is_due());
        assert_eq!(round.blocks_until_due(), 95);
        round.current_height = 105;
        assert!(round.is_due());
        assert_eq!(round.blocks_until_due(), 0);
    }

    #[test]
    fn test_ping_heights_saturate() {
        let round = PingRound {
            round_info: PingRoundInfo { round: 3, height: u64::MAX - 1 },
            round_jump: u64::MAX,
            current_height: u64::MAX,
        };
        assert!(!round.is_due());
        assert_eq!(round.next_height(), u64::MAX);
        assert_eq!(round.blocks_until_due(), 0);
    }
}
