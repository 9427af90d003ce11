//! JSON messages of the DKG and health-check contracts. Variants are
//! externally tagged in snake_case, binary fields are base64.

use serde::{Deserialize, Serialize};

use crate::types::{Binary, DealerShare, RowShare};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DkgQuery {
    ContractInfo {},
    GetMembers {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u8>,
    },
    GetMember {
        address: String,
    },
    CurrentHandling {},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareSigMsg {
    pub sig: Binary,
    pub round: u64,
    /// Countersignature over the round randomness. The contract requires the
    /// field; an empty value means no countersignature.
    #[serde(default)]
    pub signed_sig: Binary,
}

impl ShareSigMsg {
    pub fn countersignature(&self) -> Option<&Binary> {
        (!self.signed_sig.is_empty()).then_some(&self.signed_sig)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DkgExecute {
    ShareDealer { share: DealerShare },
    ShareRow { share: RowShare },
    ShareSig { share: ShareSigMsg },
    RequestRandom { input: Binary },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingQuery {
    /// Argument is the member address.
    GetRound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PingExecute {
    Ping {},
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_wire_format() {
        let q = DkgQuery::GetMembers { offset: Some("orai1x".into()), limit: Some(5) };
        assert_eq!(
            serde_json::to_value(&q).unwrap(),
            json!({"get_members": {"offset": "orai1x", "limit": 5}})
        );
        let first = DkgQuery::GetMembers { offset: None, limit: Some(5) };
        assert_eq!(serde_json::to_value(&first).unwrap(), json!({"get_members": {"limit": 5}}));
        assert_eq!(
            serde_json::to_value(DkgQuery::ContractInfo {}).unwrap(),
            json!({"contract_info": {}})
        );
        assert_eq!(
            serde_json::to_value(PingQuery::GetRound("orai1x".into())).unwrap(),
            json!({"get_round": "orai1x"})
        );
    }

    #[test]
    fn test_execute_wire_format() {
        let msg = DkgExecute::ShareSig {
            share: ShareSigMsg { sig: Binary(vec![1, 2]), round: 7, signed_sig: Binary::default() },
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"share_sig": {"share": {"sig": "AQI=", "round": 7, "signed_sig": ""}}})
        );
        assert_eq!(serde_json::to_value(PingExecute::Ping {}).unwrap(), json!({"ping": {}}));

        let parsed: DkgExecute =
            serde_json::from_value(json!({"request_random": {"input": "aGVsbG8="}})).unwrap();
        assert_eq!(parsed, DkgExecute::RequestRandom { input: Binary(b"hello".to_vec()) });
    }

    #[test]
    fn test_share_sig_countersignature() {
        let plain: ShareSigMsg =
            serde_json::from_value(json!({"sig": "AQI=", "round": 3, "signed_sig": ""})).unwrap();
        assert!(plain.countersignature().is_none());

        let signed = ShareSigMsg { sig: Binary(vec![1]), round: 3, signed_sig: Binary(vec![9, 9]) };
        assert_eq!(signed.countersignature(), Some(&Binary(vec![9, 9])));
        assert_eq!(
            serde_json::to_value(&signed).unwrap(),
            json!({"sig": "AQ==", "round": 3, "signed_sig": "CQk="})
        );
    }
}
