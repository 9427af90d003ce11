//! Typed wrappers over the two contracts the client talks to.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::msg::{DkgExecute, DkgQuery, PingExecute, PingQuery, ShareSigMsg};
use super::{FeeSetting, LedgerClient};
use crate::config::FeeConfig;
use crate::error::VrfError;
use crate::types::{Binary, ContractInfo, DealerShare, Member, PingRound, RoundInfo, RowShare, TxOutcome};

async fn query_as<Q: Serialize, T: DeserializeOwned>(
    ledger: &dyn LedgerClient,
    contract: &str,
    msg: &Q,
) -> Result<T, VrfError> {
    let msg = serde_json::to_value(msg)?;
    let response = ledger.query(contract, &msg).await?;
    Ok(serde_json::from_value(response)?)
}

async fn execute_msg<M: Serialize>(
    ledger: &dyn LedgerClient,
    contract: &str,
    msg: &M,
    fees: Option<&FeeSetting>,
) -> Result<TxOutcome, VrfError> {
    let msg = serde_json::to_value(msg)?;
    ledger.execute(contract, &msg, fees).await
}

/// The VRF/DKG group contract.
#[derive(Clone)]
pub struct DkgContract {
    ledger: Arc<dyn LedgerClient>,
    address: String,
    fees: FeeConfig,
}

impl DkgContract {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: impl Into<String>, fees: FeeConfig) -> Self {
        DkgContract {
            ledger,
            address: address.into(),
            fees,
        }
    }

    /// Address of the local member.
    pub fn sender(&self) -> &str {
        self.ledger.sender()
    }

    pub async fn contract_info(&self) -> Result<ContractInfo, VrfError> {
        query_as(self.ledger.as_ref(), &self.address, &DkgQuery::ContractInfo {}).await
    }

    /// One page of members strictly after `offset`.
    pub async fn get_members(&self, offset: Option<String>, limit: u8) -> Result<Vec<Member>, VrfError> {
        let msg = DkgQuery::GetMembers {
            offset,
            limit: Some(limit),
        };
        query_as(self.ledger.as_ref(), &self.address, &msg).await
    }

    pub async fn get_member(&self, address: &str) -> Result<Option<Member>, VrfError> {
        let msg = DkgQuery::GetMember {
            address: address.to_string(),
        };
        query_as(self.ledger.as_ref(), &self.address, &msg).await
    }

    pub async fn current_handling(&self) -> Result<Option<RoundInfo>, VrfError> {
        query_as(self.ledger.as_ref(), &self.address, &DkgQuery::CurrentHandling {}).await
    }

    pub async fn share_dealer(&self, share: DealerShare) -> Result<TxOutcome, VrfError> {
        let msg = DkgExecute::ShareDealer { share };
        execute_msg(self.ledger.as_ref(), &self.address, &msg, self.fees.default.as_ref()).await
    }

    pub async fn share_row(&self, share: RowShare) -> Result<TxOutcome, VrfError> {
        let msg = DkgExecute::ShareRow { share };
        execute_msg(self.ledger.as_ref(), &self.address, &msg, self.fees.default.as_ref()).await
    }

    /// Uses the `share_sig` fee override when configured.
    pub async fn share_sig(&self, share: ShareSigMsg) -> Result<TxOutcome, VrfError> {
        let msg = DkgExecute::ShareSig { share };
        let fees = self.fees.share_sig.as_ref().or(self.fees.default.as_ref());
        execute_msg(self.ledger.as_ref(), &self.address, &msg, fees).await
    }

    pub async fn request_random(&self, input: Binary) -> Result<TxOutcome, VrfError> {
        let msg = DkgExecute::RequestRandom { input };
        execute_msg(self.ledger.as_ref(), &self.address, &msg, self.fees.default.as_ref()).await
    }
}

/// The health-check contract.
#[derive(Clone)]
pub struct PingContract {
    ledger: Arc<dyn LedgerClient>,
    address: String,
    fees: Option<FeeSetting>,
}

impl PingContract {
    pub fn new(ledger: Arc<dyn LedgerClient>, address: impl Into<String>, fees: Option<FeeSetting>) -> Self {
        PingContract {
            ledger,
            address: address.into(),
            fees,
        }
    }

    pub fn sender(&self) -> &str {
        self.ledger.sender()
    }

    pub async fn get_round(&self, member: &str) -> Result<PingRound, VrfError> {
        query_as(self.ledger.as_ref(), &self.address, &PingQuery::GetRound(member.to_string())).await
    }

    pub async fn ping(&self) -> Result<TxOutcome, VrfError> {
        execute_msg(self.ledger.as_ref(), &self.address, &PingExecute::Ping {}, self.fees.as_ref()).await
    }
}
