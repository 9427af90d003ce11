pub mod signer;

pub use signer::{RoundOutcome, RowOutcome, ThresholdSigner};
