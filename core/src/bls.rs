//! Threshold BLS signing over BLS12-381 (spec.md §4.2).
//!
//! Full-signature verification follows the pairing check drand clients
//! already perform (adapted from `drand_core::bls_signatures`, itself
//! inspired by <https://github.com/noislabs/drand-verify>). Partial
//! signing and Lagrange recovery implement the same threshold scheme the
//! original Go node gets from `kyber`'s `share`/`tbls` packages: each
//! node holds a Shamir share of the group secret, signs by scalar-
//! multiplying the hashed round message, and `t` shares combine via
//! Lagrange interpolation in the exponent.

use std::ops::Neg;

use ark_bls12_381::{g2, Fr, G1Affine, G2Affine, G2Projective};
use ark_ec::{
    bls12::Bls12,
    hashing::{curve_maps::wb::WBMap, map_to_curve_hasher::MapToCurveBasedHasher, HashToCurve},
    models::short_weierstrass,
    pairing::Pairing,
    AffineRepr, CurveGroup,
};
use ark_ff::{field_hashers::DefaultFieldHasher, Field, One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{CoreError, Result};

const DOMAIN: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("malformed curve point")]
    InvalidPoint,
    #[error("partial signature index {index} out of range for group of size {n}")]
    InvalidPartialIndex { index: u32, n: usize },
    #[error("need {need} partial signatures, have {have}")]
    InsufficientPartials { have: usize, need: usize },
    #[error("cannot hash message onto curve")]
    HashToCurve,
    #[error("recovered signature failed full verification")]
    RecoverVerifyFailed,
}

/// One node's share of a threshold signature over a round message. Output
/// of [`sign_partial`]; `index` identifies which commitment verifies it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartialSignature {
    pub index: u32,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

fn hash_to_g2(msg: &[u8]) -> Result<G2Projective> {
    let mapper = MapToCurveBasedHasher::<
        short_weierstrass::Projective<g2::Config>,
        DefaultFieldHasher<sha2::Sha256, 128>,
        WBMap<g2::Config>,
    >::new(DOMAIN)
    .map_err(|_| Box::new(CryptoError::HashToCurve) as CoreError)?;
    let point = mapper
        .hash(msg)
        .map_err(|_| Box::new(CryptoError::HashToCurve) as CoreError)?;
    Ok(G2Projective::from(point))
}

fn g1_from_bytes(data: &[u8]) -> Result<G1Affine> {
    if data.len() != 48 {
        return Err(Box::new(CryptoError::InvalidPoint));
    }
    G1Affine::deserialize_compressed(data).map_err(|_| Box::new(CryptoError::InvalidPoint) as CoreError)
}

fn g2_from_bytes(data: &[u8]) -> Result<G2Affine> {
    if data.len() != 96 {
        return Err(Box::new(CryptoError::InvalidPoint));
    }
    G2Affine::deserialize_compressed(data).map_err(|_| Box::new(CryptoError::InvalidPoint) as CoreError)
}

fn fr_from_bytes(data: &[u8]) -> Result<Fr> {
    Fr::deserialize_compressed(data).map_err(|_| Box::new(CryptoError::InvalidPoint) as CoreError)
}

/// Checks `e(g1, signature) == e(public_key, hash)`: signature and hash
/// are on G2, public key is on G1. This is the scheme `sign_partial`/
/// `recover` below produce.
fn fast_pairing_equality(p: &G1Affine, q: &G2Affine, r: &G1Affine, s: &G2Affine) -> bool {
    let minus_p = p.neg();
    let looped = Bls12::<ark_bls12_381::Config>::multi_miller_loop([minus_p, *r], [*q, *s]);
    let value = Bls12::final_exponentiation(looped);
    value.map(|v| v.is_zero()).unwrap_or(false)
}

/// `e(g1, signature) == e(public_key, hash(msg))`.
pub fn verify(signature: &[u8], msg: &[u8], public_key: &[u8]) -> Result<bool> {
    let hash_on_curve = hash_to_g2(msg)?.into_affine();
    let g1 = G1Affine::generator();
    let sigma = g2_from_bytes(signature)?;
    let pk = g1_from_bytes(public_key)?;
    Ok(fast_pairing_equality(&g1, &sigma, &pk, &hash_on_curve))
}

/// Produces this node's partial signature over `msg`: `sigma_i = H(msg) *
/// share_i`. The index embedded in the result identifies the commitment a
/// verifier should check it against.
pub fn sign_partial(index: u32, secret_share: &[u8], msg: &[u8]) -> Result<PartialSignature> {
    let secret = fr_from_bytes(secret_share)?;
    let hash_on_curve = hash_to_g2(msg)?;
    let sigma = hash_on_curve * secret;
    let mut out = Vec::new();
    sigma
        .into_affine()
        .serialize_compressed(&mut out)
        .map_err(|_| Box::new(CryptoError::InvalidPoint) as CoreError)?;
    Ok(PartialSignature {
        index,
        signature: out,
    })
}

/// Verifies a peer's partial signature against its commitment (the
/// `index`-th entry of `commitments`).
pub fn verify_partial(
    commitments: &[Vec<u8>],
    msg: &[u8],
    partial: &PartialSignature,
) -> Result<bool> {
    let idx = partial.index as usize;
    if idx >= commitments.len() {
        return Err(Box::new(CryptoError::InvalidPartialIndex {
            index: partial.index,
            n: commitments.len(),
        }));
    }
    verify(&partial.signature, msg, &commitments[idx])
}

/// Lagrange coefficient `lambda_i(0)` for the share at `index`, evaluated
/// over the 1-indexed points `{index+1 : index in indices}` (x=0 is
/// reserved for the secret itself, as in standard Shamir sharing).
fn lagrange_coefficient(indices: &[u32], index: u32) -> Fr {
    let xi = Fr::from((index as u64) + 1);
    let mut num = Fr::one();
    let mut den = Fr::one();
    for &j in indices {
        if j == index {
            continue;
        }
        let xj = Fr::from((j as u64) + 1);
        num *= -xj;
        den *= xi - xj;
    }
    num * den.inverse().expect("distinct share indices never collide")
}

/// Recovers the full threshold signature from `>= threshold` valid
/// partials, deduplicating by share index (first occurrence wins) and
/// using only the first `threshold` of them, per spec.md §4.5 step 6.
pub fn recover(threshold: usize, n: usize, partials: &[PartialSignature]) -> Result<Vec<u8>> {
    let mut seen = std::collections::BTreeSet::new();
    let mut deduped = Vec::new();
    for p in partials {
        if p.index as usize >= n {
            return Err(Box::new(CryptoError::InvalidPartialIndex { index: p.index, n }));
        }
        if seen.insert(p.index) {
            deduped.push(p);
        }
    }
    if deduped.len() < threshold {
        return Err(Box::new(CryptoError::InsufficientPartials {
            have: deduped.len(),
            need: threshold,
        }));
    }
    let taken = &deduped[..threshold];
    let indices: Vec<u32> = taken.iter().map(|p| p.index).collect();

    let mut acc = G2Projective::zero();
    for p in taken {
        let point = g2_from_bytes(&p.signature)?;
        let coeff = lagrange_coefficient(&indices, p.index);
        acc += point * coeff;
    }

    let mut out = Vec::new();
    acc.into_affine()
        .serialize_compressed(&mut out)
        .map_err(|_| Box::new(CryptoError::InvalidPoint) as CoreError)?;
    Ok(out)
}

/// Cheap final check on a recovered signature: guards against bugs in
/// `recover`, not against a dishonest coalition (which can't produce a
/// verifying signature under `t`-of-`n` threshold security).
pub fn verify_full(group_public_key: &[u8], msg: &[u8], full_sig: &[u8]) -> Result<bool> {
    verify(full_sig, msg, group_public_key)
}
