//! The member's own secp256k1 keypair. It authenticates row encryption (ECDH)
//! and countersigns round randomness (ECDSA over a prehash).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use k256::SecretKey;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::VrfError;

pub struct LocalKeypair {
    secret: SecretKey,
}

impl LocalKeypair {
    /// Fresh random key.
    pub fn generate() -> Self {
        LocalKeypair {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VrfError> {
        let secret = SecretKey::from_slice(bytes)
            .map_err(|_| VrfError::Config("signing key is not a valid secp256k1 scalar".into()))?;
        Ok(LocalKeypair { secret })
    }

    /// Parses a 32-byte hex secret, tolerating a `0x` prefix and whitespace.
    pub fn from_hex(encoded: &str) -> Result<Self, VrfError> {
        let trimmed = encoded.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = Zeroizing::new(
            hex::decode(trimmed).map_err(|e| VrfError::Config(format!("signing key hex: {e}")))?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.secret.to_bytes()))
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    /// Compressed SEC1 public key (33 bytes), the form registered on the ledger.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.secret
            .public_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    pub fn public_key_base64(&self) -> String {
        STANDARD.encode(self.public_key_bytes())
    }

    /// Compact 64-byte ECDSA signature over an already-hashed message.
    pub fn sign_prehash(&self, prehash: &[u8]) -> Result<Vec<u8>, VrfError> {
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .sign_prehash(prehash)
            .map_err(|e| VrfError::CryptoError(format!("ecdsa signing failed: {e}")))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// Verifies a compact ECDSA signature produced by [`LocalKeypair::sign_prehash`].
pub fn verify_prehash(pubkey: &[u8], prehash: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(pubkey) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify_prehash(prehash, &signature).is_ok()
}
