//! BLS12-381 backend for the threshold capability.
//!
//! Each dealer samples a symmetric bivariate polynomial `f(x, y)` of degree
//! `threshold` in both variables. Member `i` (sorted position, evaluated at
//! `x = i + 1`) receives row `f(i + 1, y)`; the row collected from every
//! dealer is summed and its constant term is the member's secret key share.
//! Commitments live in G1, signatures in G2.
//!
//! Wire encodings:
//! - row: concatenated 32-byte little-endian scalars (`threshold + 1` of them)
//! - commitment: concatenated 48-byte compressed G1 points
//! - public key / public key share: one 48-byte compressed G1 point
//! - signature: 96-byte compressed G2 point

use std::collections::HashSet;

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{G1Affine, G1Projective, G2Affine, G2Projective, Scalar, pairing};
use ff::Field;
use group::Curve;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use sha2_v09::Sha256 as XmdSha256;
use zeroize::Zeroizing;

use super::capability::{KeyShare, ShareSet, ThresholdScheme};
use crate::error::VrfError;

pub const SCALAR_LEN: usize = 32;
pub const G1_LEN: usize = 48;
pub const G2_LEN: usize = 96;

/// Ciphersuite tag for signatures in G2 with public keys in G1.
pub const SIGNATURE_DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

fn random_scalar() -> Scalar {
    let mut bytes = [0u8; 64];
    OsRng.fill_bytes(&mut bytes);
    let scalar = Scalar::from_bytes_wide(&bytes);
    bytes.fill(0);
    scalar
}

/// Symmetric bivariate polynomial; `coeffs[i * n + j]` is the coefficient of
/// `x^i y^j`, with `n = degree + 1`.
struct BivarPoly {
    degree: usize,
    coeffs: Vec<Scalar>,
}

impl BivarPoly {
    fn random(degree: usize) -> Self {
        let n = degree + 1;
        let mut coeffs = vec![Scalar::ZERO; n * n];
        for i in 0..n {
            for j in i..n {
                let c = random_scalar();
                coeffs[i * n + j] = c;
                coeffs[j * n + i] = c;
            }
        }
        BivarPoly { degree, coeffs }
    }

    /// Coefficients in `y` of `f(x, y)` for a fixed `x`.
    fn row(&self, x: u64) -> Vec<Scalar> {
        let n = self.degree + 1;
        let x = Scalar::from(x);
        let mut row = vec![Scalar::ZERO; n];
        let mut x_pow = Scalar::ONE;
        for i in 0..n {
            for (j, coeff) in row.iter_mut().enumerate() {
                *coeff += self.coeffs[i * n + j] * x_pow;
            }
            x_pow *= x;
        }
        row
    }
}

impl Drop for BivarPoly {
    fn drop(&mut self) {
        wipe(&mut self.coeffs);
    }
}

fn wipe(scalars: &mut [Scalar]) {
    for s in scalars.iter_mut() {
        *s = Scalar::ZERO;
    }
}

fn commit_coefficients(coeffs: &[Scalar]) -> Vec<u8> {
    coeffs
        .iter()
        .flat_map(|c| (G1Projective::generator() * c).to_affine().to_compressed())
        .collect()
}

fn encode_scalars(coeffs: &[Scalar]) -> Zeroizing<Vec<u8>> {
    Zeroizing::new(coeffs.iter().flat_map(|c| c.to_bytes()).collect())
}

fn decode_scalars(bytes: &[u8]) -> Result<Vec<Scalar>, VrfError> {
    if bytes.is_empty() || bytes.len() % SCALAR_LEN != 0 {
        return Err(VrfError::CryptoError(format!(
            "row of {} bytes is not a sequence of scalars",
            bytes.len()
        )));
    }
    bytes
        .chunks_exact(SCALAR_LEN)
        .map(|chunk| {
            let mut buf = [0u8; SCALAR_LEN];
            buf.copy_from_slice(chunk);
            let scalar = Option::<Scalar>::from(Scalar::from_bytes(&buf));
            buf.fill(0);
            scalar.ok_or_else(|| VrfError::CryptoError("non-canonical scalar in row".into()))
        })
        .collect()
}

fn decode_g1(bytes: &[u8]) -> Result<G1Affine, VrfError> {
    let buf: [u8; G1_LEN] = bytes
        .try_into()
        .map_err(|_| VrfError::CryptoError(format!("expected {G1_LEN}-byte G1 point, got {}", bytes.len())))?;
    Option::<G1Affine>::from(G1Affine::from_compressed(&buf))
        .ok_or_else(|| VrfError::CryptoError("invalid G1 point".into()))
}

fn decode_g1_points(bytes: &[u8]) -> Result<Vec<G1Affine>, VrfError> {
    if bytes.is_empty() || bytes.len() % G1_LEN != 0 {
        return Err(VrfError::CryptoError(format!(
            "commitment of {} bytes is not a sequence of G1 points",
            bytes.len()
        )));
    }
    bytes.chunks_exact(G1_LEN).map(decode_g1).collect()
}

fn decode_g2(bytes: &[u8]) -> Result<G2Affine, VrfError> {
    let buf: [u8; G2_LEN] = bytes
        .try_into()
        .map_err(|_| VrfError::CryptoError(format!("expected {G2_LEN}-byte G2 point, got {}", bytes.len())))?;
    Option::<G2Affine>::from(G2Affine::from_compressed(&buf))
        .ok_or_else(|| VrfError::CryptoError("invalid G2 point".into()))
}

/// Message actually signed for a round.
pub fn round_message(input: &[u8], round: u64) -> Vec<u8> {
    let mut msg = Vec::with_capacity(input.len() + 8);
    msg.extend_from_slice(input);
    msg.extend_from_slice(&round.to_be_bytes());
    msg
}

pub fn hash_to_g2(msg: &[u8]) -> G2Projective {
    <G2Projective as HashToCurve<ExpandMsgXmd<XmdSha256>>>::hash_to_curve(msg, SIGNATURE_DST)
}

/// Randomness published for a round: SHA-256 of the combined signature.
pub fn derive_randomness(combined_sig: &[u8]) -> Vec<u8> {
    Sha256::digest(combined_sig).to_vec()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlsScheme;

pub struct BlsKeyShare {
    sk: Scalar,
}

impl Drop for BlsKeyShare {
    fn drop(&mut self) {
        self.sk = Scalar::ZERO;
    }
}

impl KeyShare for BlsKeyShare {
    fn public_share(&self) -> Vec<u8> {
        (G1Projective::generator() * self.sk)
            .to_affine()
            .to_compressed()
            .to_vec()
    }

    fn sign(&self, input: &[u8], round: u64) -> Vec<u8> {
        let point = hash_to_g2(&round_message(input, round));
        (point * self.sk).to_affine().to_compressed().to_vec()
    }
}

impl ThresholdScheme for BlsScheme {
    type KeyShare = BlsKeyShare;

    fn generate_shares(&self, threshold: u32, total: u32) -> Result<ShareSet, VrfError> {
        if total == 0 || threshold >= total {
            return Err(VrfError::CryptoError(format!(
                "threshold {threshold} must be below total {total}"
            )));
        }
        let poly = BivarPoly::random(threshold as usize);

        let mut commits = Vec::with_capacity(total as usize + 1);
        let mut rows = Vec::with_capacity(total as usize);
        commits.push(commit_coefficients(&poly.row(0)));
        for x in 1..=u64::from(total) {
            let mut row = poly.row(x);
            commits.push(commit_coefficients(&row));
            rows.push(encode_scalars(&row));
            wipe(&mut row);
        }
        Ok(ShareSet { commits, rows })
    }

    fn combine(
        &self,
        rows: &[Zeroizing<Vec<u8>>],
        commits: &[Vec<u8>],
    ) -> Result<BlsKeyShare, VrfError> {
        if rows.is_empty() || rows.len() != commits.len() {
            return Err(VrfError::CryptoError(format!(
                "{} rows cannot be combined with {} commitments",
                rows.len(),
                commits.len()
            )));
        }

        let mut sk = Scalar::ZERO;
        let mut degree = None;
        for (pos, (row, commit)) in rows.iter().zip(commits).enumerate() {
            let mut coeffs = decode_scalars(row)?;
            let points = decode_g1_points(commit)?;
            let checked = check_row(pos, &coeffs, &points, &mut degree);
            if checked.is_ok() {
                sk += coeffs[0];
            }
            wipe(&mut coeffs);
            checked?;
        }
        Ok(BlsKeyShare { sk })
    }
}

fn check_row(
    pos: usize,
    coeffs: &[Scalar],
    points: &[G1Affine],
    degree: &mut Option<usize>,
) -> Result<(), VrfError> {
    if coeffs.len() != points.len() {
        return Err(VrfError::CryptoError(format!(
            "row {pos} has {} coefficients but {} commitments",
            coeffs.len(),
            points.len()
        )));
    }
    if *degree.get_or_insert(coeffs.len()) != coeffs.len() {
        return Err(VrfError::CryptoError(format!("row {pos} has a different degree")));
    }
    for (c, p) in coeffs.iter().zip(points) {
        if (G1Projective::generator() * c).to_affine() != *p {
            return Err(VrfError::CryptoError(format!(
                "row {pos} does not match its commitment"
            )));
        }
    }
    Ok(())
}

/// Group public key material assembled from every dealer's sum commitment.
/// This is what a ledger needs to verify shares and combined signatures.
#[derive(Clone, Debug)]
pub struct PublicKeySet {
    commit: Vec<G1Projective>,
}

impl PublicKeySet {
    pub fn from_dealer_commits<B: AsRef<[u8]>>(sum_commits: &[B]) -> Result<Self, VrfError> {
        let mut commit: Vec<G1Projective> = Vec::new();
        for encoded in sum_commits {
            let points = decode_g1_points(encoded.as_ref())?;
            if commit.is_empty() {
                commit = vec![G1Projective::identity(); points.len()];
            } else if commit.len() != points.len() {
                return Err(VrfError::CryptoError("dealer commitments disagree on degree".into()));
            }
            for (acc, p) in commit.iter_mut().zip(points) {
                *acc += G1Projective::from(p);
            }
        }
        if commit.is_empty() {
            return Err(VrfError::CryptoError("no dealer commitments".into()));
        }
        Ok(PublicKeySet { commit })
    }

    pub fn threshold(&self) -> usize {
        self.commit.len() - 1
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.commit[0].to_affine().to_compressed().to_vec()
    }

    /// Public key share of the member at sorted position `index`.
    pub fn public_key_share(&self, index: u32) -> Vec<u8> {
        let x = Scalar::from(u64::from(index) + 1);
        let mut acc = G1Projective::identity();
        for c in self.commit.iter().rev() {
            acc = acc * x + c;
        }
        acc.to_affine().to_compressed().to_vec()
    }
}

/// Checks `e(pk, H(msg)) == e(g1, sig)`; works for both shares and combined signatures.
pub fn verify_signature(pubkey: &[u8], msg: &[u8], signature: &[u8]) -> bool {
    let (Ok(pk), Ok(sig)) = (decode_g1(pubkey), decode_g2(signature)) else {
        return false;
    };
    let hashed = hash_to_g2(msg).to_affine();
    pairing(&pk, &hashed) == pairing(&G1Affine::generator(), &sig)
}

/// Lagrange-combines signature shares `(index, sig)` at `x = index + 1`.
/// Exactly `threshold + 1` shares are used; extra ones are ignored.
pub fn combine_signatures(shares: &[(u32, Vec<u8>)], threshold: u32) -> Result<Vec<u8>, VrfError> {
    let needed = threshold as usize + 1;
    if shares.len() < needed {
        return Err(VrfError::CryptoError(format!(
            "{} signature shares, {needed} required",
            shares.len()
        )));
    }
    let shares = &shares[..needed];
    let distinct: HashSet<u32> = shares.iter().map(|(idx, _)| *idx).collect();
    if distinct.len() != shares.len() {
        return Err(VrfError::CryptoError("duplicate signature share index".into()));
    }

    let mut combined = G2Projective::identity();
    for (i, (idx_i, sig)) in shares.iter().enumerate() {
        let x_i = Scalar::from(u64::from(*idx_i) + 1);
        let mut numerator = Scalar::ONE;
        let mut denominator = Scalar::ONE;
        for (j, (idx_j, _)) in shares.iter().enumerate() {
            if i == j {
                continue;
            }
            let x_j = Scalar::from(u64::from(*idx_j) + 1);
            numerator *= x_j;
            denominator *= x_j - x_i;
        }
        let inverse = Option::<Scalar>::from(denominator.invert())
            .ok_or_else(|| VrfError::CryptoError("degenerate share indexes".into()))?;
        combined += G2Projective::from(decode_g2(sig)?) * (numerator * inverse);
    }
    Ok(combined.to_affine().to_compressed().to_vec())
}
