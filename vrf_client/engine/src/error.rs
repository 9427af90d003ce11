//! Centralized VRF engine error types.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VrfError {
    /// The ledger rejected a query or transaction, or returned something unusable.
    #[error("Ledger error: {0}")]
    Ledger(String),
    /// HTTP transport failure talking to the node or the broadcaster.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Serialization or deserialization error.
    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
    /// Generic cryptographic operation failure.
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
    /// The authentication tag of a row ciphertext did not verify.
    #[error("Authentication error: ciphertext tag did not verify")]
    AuthenticationError,
    #[error("Malformed ciphertext: {0} bytes cannot hold nonce and tag")]
    MalformedCiphertext(usize),
    /// Pagination stopped before the ledger-reported total was reached.
    #[error("Incomplete membership: found {found} of {total} members")]
    IncompleteMembership { found: usize, total: u32 },
    #[error("Dealer count mismatch: ledger reports {expected}, found {found}")]
    DealerCountMismatch { expected: u32, found: usize },
    /// One dealer's row could not be recovered, so no key share may be built.
    #[error("Partial share failure (dealer {dealer}): {reason}")]
    PartialShareFailure { dealer: String, reason: String },
    /// Ledger state contradicts a protocol invariant (row/commit counts, indexes).
    #[error("Invariant violation: {0}")]
    Invariant(String),
    /// Startup configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl VrfError {
    /// Conditions that only mean "the group is not ready yet" and resolve once
    /// the ledger catches up.
    pub fn is_not_ready(&self) -> bool {
        matches!(
            self,
            VrfError::IncompleteMembership { .. } | VrfError::DealerCountMismatch { .. }
        )
    }

    /// Integrity failures: a key share built from these inputs must never be used.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            VrfError::AuthenticationError | VrfError::PartialShareFailure { .. }
        )
    }
}
