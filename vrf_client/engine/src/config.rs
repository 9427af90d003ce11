//! Client configuration: a JSON file plus the signing key from the
//! environment or a key file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::LocalKeypair;
use crate::error::VrfError;
use crate::ledger::FeeSetting;

pub const SIGNING_KEY_ENV: &str = "VRF_SIGNING_KEY";

fn default_interval_ms() -> u64 {
    5000
}

fn default_page_size() -> u8 {
    5
}

fn default_filter() -> String {
    "info".to_string()
}

/// Fee overrides; `share_sig` falls back to `default` when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeConfig {
    #[serde(default)]
    pub default: Option<FeeSetting>,
    #[serde(default)]
    pub share_sig: Option<FeeSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Directory for the daily rolling log file; stdout only when unset.
    #[serde(default)]
    pub dir: Option<String>,
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            dir: None,
            json: false,
            filter: default_filter(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub contract: String,
    pub ping_contract: String,
    pub lcd_url: String,
    pub broadcast_url: String,
    /// Ledger address of the local member.
    pub sender: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u8,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl ClientConfig {
    pub fn from_json(raw: &str) -> Result<Self, VrfError> {
        let config: ClientConfig =
            serde_json::from_str(raw).map_err(|e| VrfError::Config(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, VrfError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VrfError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<(), VrfError> {
        if self.interval_ms == 0 || self.ping_interval_ms == 0 {
            return Err(VrfError::Config("intervals must be greater than zero".into()));
        }
        if self.page_size == 0 {
            return Err(VrfError::Config("page_size must be greater than zero".into()));
        }
        for (name, value) in [
            ("contract", &self.contract),
            ("ping_contract", &self.ping_contract),
            ("sender", &self.sender),
        ] {
            if value.trim().is_empty() {
                return Err(VrfError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Reads the hex signing key from `key_file` when given, otherwise from
/// [`SIGNING_KEY_ENV`].
pub fn load_signing_key(key_file: Option<&Path>) -> Result<LocalKeypair, VrfError> {
    let encoded = match key_file {
        Some(path) => zeroize::Zeroizing::new(
            std::fs::read_to_string(path)
                .map_err(|e| VrfError::Config(format!("cannot read {}: {e}", path.display())))?,
        ),
        None => zeroize::Zeroizing::new(
            std::env::var(SIGNING_KEY_ENV)
                .map_err(|_| VrfError::Config(format!("{SIGNING_KEY_ENV} is not set")))?,
        ),
    };
    LocalKeypair::from_hex(&encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "contract": "orai1vrf",
        "ping_contract": "orai1ping",
        "lcd_url": "https://lcd.orai.io",
        "broadcast_url": "http://127.0.0.1:8080/tx",
        "sender": "orai1me"
    }"#;

    #[test]
    fn test_defaults_applied() {
        let config = ClientConfig::from_json(MINIMAL).unwrap();
        assert_eq!(config.interval_ms, 5000);
        assert_eq!(config.ping_interval_ms, 5000);
        assert_eq!(config.page_size, 5);
        assert_eq!(config.fees, FeeConfig::default());
        assert_eq!(config.log.filter, "info");
    }

    #[test]
    fn test_fee_overrides_parse() {
        let raw = MINIMAL.replace(
            "\"sender\": \"orai1me\"",
            r#""sender": "orai1me", "fees": {"share_sig": {"amount": "5000orai", "gas": 2000000}}"#,
        );
        let config = ClientConfig::from_json(&raw).unwrap();
        let fee = config.fees.share_sig.unwrap();
        assert_eq!(fee.gas, 2_000_000);
        assert!(config.fees.default.is_none());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = ClientConfig::from_json(MINIMAL).unwrap();
        config.interval_ms = 0;
        assert!(matches!(config.validate(), Err(VrfError::Config(_))));

        let mut config = ClientConfig::from_json(MINIMAL).unwrap();
        config.page_size = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::from_json(MINIMAL).unwrap();
        config.contract = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_signing_key_from_file() {
        let keypair = LocalKeypair::generate();
        let path = std::env::temp_dir().join(format!("vrf-key-{}.hex", std::process::id()));
        std::fs::write(&path, format!("0x{}\n", keypair.to_hex().as_str())).unwrap();
        let loaded = load_signing_key(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.public_key_bytes(), keypair.public_key_bytes());
    }
}
