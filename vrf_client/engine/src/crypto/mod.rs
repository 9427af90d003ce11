//! Cryptographic building blocks: the member's own secp256k1 key, per-row
//! share encryption, and the threshold capability with its BLS12-381 backend.

pub mod bls;
pub mod capability;
pub mod keys;
pub mod share_crypto;

pub use bls::{BlsKeyShare, BlsScheme};
pub use capability::{KeyShare, ShareSet, ThresholdScheme};
pub use keys::LocalKeypair;
