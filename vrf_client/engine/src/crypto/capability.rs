//! The threshold capability the protocol is written against.
//!
//! Everything the dealer, assembler and signer need from the pairing scheme
//! goes through these two traits, so the protocol layer never touches curve
//! types directly.

use zeroize::Zeroizing;

use crate::error::VrfError;

/// Output of one dealing: `commits[0]` commits to the sum row and
/// `commits[i + 1]` to `rows[i]`. Rows are plaintext here and must be
/// encrypted before they leave the process.
pub struct ShareSet {
    pub commits: Vec<Vec<u8>>,
    pub rows: Vec<Zeroizing<Vec<u8>>>,
}

/// A combined secret key share. Only the public share and round signatures
/// ever leave it.
pub trait KeyShare: Send + Sync {
    fn public_share(&self) -> Vec<u8>;

    /// Signs `input || round.to_be_bytes()`.
    fn sign(&self, input: &[u8], round: u64) -> Vec<u8>;
}

pub trait ThresholdScheme: Send + Sync {
    type KeyShare: KeyShare + 'static;

    /// Fresh bivariate dealing. `threshold + 1` signature shares are needed to
    /// combine, so `threshold` must be below `total`.
    fn generate_shares(&self, threshold: u32, total: u32) -> Result<ShareSet, VrfError>;

    /// Verifies each decrypted row against its commitment and folds the rows
    /// received from every dealer into one key share.
    fn combine(
        &self,
        rows: &[Zeroizing<Vec<u8>>],
        commits: &[Vec<u8>],
    ) -> Result<Self::KeyShare, VrfError>;
}
