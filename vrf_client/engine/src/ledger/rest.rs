//! Adapter for a live node: smart queries over the LCD REST API and writes
//! handed to an external signing/broadcast service.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{FeeSetting, LedgerClient};
use crate::error::VrfError;
use crate::types::TxOutcome;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct SmartResponse {
    data: Value,
}

#[derive(Clone)]
pub struct RestLedger {
    lcd: Url,
    broadcaster: Url,
    sender: String,
    client: Client,
}

impl RestLedger {
    pub fn new(lcd_url: &str, broadcast_url: &str, sender: impl Into<String>) -> Result<Self, VrfError> {
        let lcd = Url::parse(lcd_url).map_err(|e| VrfError::Config(format!("lcd_url: {e}")))?;
        let broadcaster =
            Url::parse(broadcast_url).map_err(|e| VrfError::Config(format!("broadcast_url: {e}")))?;
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(RestLedger {
            lcd,
            broadcaster,
            sender: sender.into(),
            client,
        })
    }

    /// `{lcd}/wasm/v1beta1/contract/{contract}/smart/{base64(msg)}`
    fn smart_query_url(&self, contract: &str, msg: &Value) -> Result<Url, VrfError> {
        let encoded = STANDARD.encode(serde_json::to_vec(msg)?);
        let mut url = self.lcd.clone();
        url.path_segments_mut()
            .map_err(|_| VrfError::Config("lcd_url cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["wasm", "v1beta1", "contract", contract, "smart", encoded.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl LedgerClient for RestLedger {
    async fn query(&self, contract: &str, msg: &Value) -> Result<Value, VrfError> {
        let url = self.smart_query_url(contract, msg)?;
        debug!(%url, "smart query");
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VrfError::Ledger(format!("query failed {status} {text}")));
        }
        Ok(resp.json::<SmartResponse>().await?.data)
    }

    async fn execute(
        &self,
        contract: &str,
        msg: &Value,
        fees: Option<&FeeSetting>,
    ) -> Result<TxOutcome, VrfError> {
        let body = json!({
            "sender": self.sender,
            "contract": contract,
            "msg": msg,
            "fees": fees.map(|f| f.amount.as_str()),
            "gas": fees.map(|f| f.gas),
        });
        let resp = self.client.post(self.broadcaster.clone()).json(&body).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(VrfError::Ledger(format!("broadcast failed {status} {text}")));
        }
        Ok(resp.json::<TxOutcome>().await?)
    }

    fn sender(&self) -> &str {
        &self.sender
    }
}
