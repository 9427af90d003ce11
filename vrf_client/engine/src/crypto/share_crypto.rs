//! Per-recipient encryption of VSS rows.
//!
//! The row key is `HKDF-SHA256(commit || ECDH(local_priv, peer_pub))`, so every
//! row is bound to its own commitment and a leaked key cannot open any other
//! row. Ciphertexts are laid out as `nonce(16) || tag(16) || ciphertext` and
//! sealed with AES-256-GCM.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use hkdf::Hkdf;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::VrfError;

pub const NONCE_LEN: usize = 16;
pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;

/// AES-256-GCM with a 128-bit nonce.
type RowCipher = AesGcm<Aes256, U16>;

/// Symmetric row key, wiped on drop.
pub struct RowKey(Zeroizing<[u8; KEY_LEN]>);

impl RowKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    fn cipher(&self) -> Result<RowCipher, VrfError> {
        RowCipher::new_from_slice(&self.0[..])
            .map_err(|_| VrfError::CryptoError("invalid row key length".into()))
    }
}

/// Uncompressed ECDH point `peer_pub * local_priv`.
fn shared_point(local_priv: &SecretKey, peer_pub: &[u8]) -> Result<Zeroizing<Vec<u8>>, VrfError> {
    let peer = PublicKey::from_sec1_bytes(peer_pub)
        .map_err(|_| VrfError::CryptoError("peer public key is not a valid secp256k1 point".into()))?;
    let point = (peer.to_projective() * *local_priv.to_nonzero_scalar()).to_affine();
    Ok(Zeroizing::new(point.to_encoded_point(false).as_bytes().to_vec()))
}

pub fn derive_key(local_priv: &SecretKey, peer_pub: &[u8], commit: &[u8]) -> Result<RowKey, VrfError> {
    let point = shared_point(local_priv, peer_pub)?;

    let mut master = Zeroizing::new(Vec::with_capacity(commit.len() + point.len()));
    master.extend_from_slice(commit);
    master.extend_from_slice(&point);

    let mut okm = Zeroizing::new([0u8; KEY_LEN]);
    Hkdf::<Sha256>::new(None, &master)
        .expand(&[], &mut okm[..])
        .map_err(|_| VrfError::CryptoError("hkdf expand failed".into()))?;
    Ok(RowKey(okm))
}

/// Seals `plaintext` under a fresh random nonce.
pub fn encrypt(key: &RowKey, plaintext: &[u8]) -> Result<Vec<u8>, VrfError> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    let mut buffer = plaintext.to_vec();
    let tag = key
        .cipher()?
        .encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| VrfError::CryptoError("row encryption failed".into()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + TAG_LEN + buffer.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&tag);
    sealed.extend_from_slice(&buffer);
    Ok(sealed)
}

/// Opens a blob produced by [`encrypt`]. A tag mismatch is always an error.
pub fn decrypt(key: &RowKey, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>, VrfError> {
    if blob.len() < NONCE_LEN + TAG_LEN {
        return Err(VrfError::MalformedCiphertext(blob.len()));
    }
    let (nonce, rest) = blob.split_at(NONCE_LEN);
    let (tag, ciphertext) = rest.split_at(TAG_LEN);

    let mut buffer = Zeroizing::new(ciphertext.to_vec());
    key.cipher()?
        .decrypt_in_place_detached(
            GenericArray::from_slice(nonce),
            b"",
            &mut buffer[..],
            GenericArray::from_slice(tag),
        )
        .map_err(|_| VrfError::AuthenticationError)?;
    Ok(buffer)
}

/// Encrypts a row for `peer_pub`, keyed to `commit`.
pub fn encrypt_row(
    local_priv: &SecretKey,
    peer_pub: &[u8],
    commit: &[u8],
    row: &[u8],
) -> Result<Vec<u8>, VrfError> {
    let key = derive_key(local_priv, peer_pub, commit)?;
    encrypt(&key, row)
}

pub fn decrypt_row(
    local_priv: &SecretKey,
    peer_pub: &[u8],
    commit: &[u8],
    sealed: &[u8],
) -> Result<Zeroizing<Vec<u8>>, VrfError> {
    let key = derive_key(local_priv, peer_pub, commit)?;
    decrypt(&key, sealed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::LocalKeypair;

    #[test]
    fn test_ecdh_keys_agree() {
        let alice = LocalKeypair::generate();
        let bob = LocalKeypair::generate();
        let commit = b"row commitment";

        let k_ab = derive_key(alice.secret(), &bob.public_key_bytes(), commit).unwrap();
        let k_ba = derive_key(bob.secret(), &alice.public_key_bytes(), commit).unwrap();
        assert_eq!(k_ab.as_bytes(), k_ba.as_bytes());

        let other = derive_key(alice.secret(), &bob.public_key_bytes(), b"another commit").unwrap();
        assert_ne!(k_ab.as_bytes(), other.as_bytes());
    }

    #[test]
    fn test_row_roundtrip_between_peers() {
        let dealer = LocalKeypair::generate();
        let recipient = LocalKeypair::generate();
        let commit = [3u8; 48];
        let row = b"secret polynomial row".to_vec();

        let sealed = encrypt_row(dealer.secret(), &recipient.public_key_bytes(), &commit, &row).unwrap();
        assert_eq!(sealed.len(), NONCE_LEN + TAG_LEN + row.len());

        let opened = decrypt_row(recipient.secret(), &dealer.public_key_bytes(), &commit, &sealed).unwrap();
        assert_eq!(opened.as_slice(), row.as_slice());
    }

    #[test]
    fn test_fresh_nonce_per_encryption() {
        let key = derive_key(LocalKeypair::generate().secret(), &LocalKeypair::generate().public_key_bytes(), b"c").unwrap();
        let a = encrypt(&key, b"same").unwrap();
        let b = encrypt(&key, b"same").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
        assert_eq!(decrypt(&key, &a).unwrap().as_slice(), decrypt(&key, &b).unwrap().as_slice());
    }

    #[test]
    fn test_any_flipped_bit_fails_authentication() {
        let key = derive_key(LocalKeypair::generate().secret(), &LocalKeypair::generate().public_key_bytes(), b"c").unwrap();
        let sealed = encrypt(&key, b"row bytes").unwrap();

        for byte in 0..sealed.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered[byte] ^= 1 << bit;
                assert!(matches!(decrypt(&key, &tampered), Err(VrfError::AuthenticationError)));
            }
        }
    }

    #[test]
    fn test_wrong_commit_cannot_open_row() {
        let dealer = LocalKeypair::generate();
        let recipient = LocalKeypair::generate();
        let sealed = encrypt_row(dealer.secret(), &recipient.public_key_bytes(), b"commit-1", b"row").unwrap();
        let result = decrypt_row(recipient.secret(), &dealer.public_key_bytes(), b"commit-2", &sealed);
        assert!(matches!(result, Err(VrfError::AuthenticationError)));
    }

    #[test]
    fn test_short_blob_is_malformed() {
        let key = derive_key(LocalKeypair::generate().secret(), &LocalKeypair::generate().public_key_bytes(), b"c").unwrap();
        assert!(matches!(decrypt(&key, &[0u8; 20]), Err(VrfError::MalformedCiphertext(20))));
    }

    #[test]
    fn test_invalid_peer_key_rejected() {
        let local = LocalKeypair::generate();
        assert!(derive_key(local.secret(), &[1, 2, 3], b"c").is_err());
    }
}
