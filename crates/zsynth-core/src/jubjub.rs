//! Jubjub (twisted Edwards over the BLS12-381 scalar field) in `U256`
//! coordinates, plus the signature scheme that binds a transaction to its
//! sender.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ed_on_bls12_381::{EdwardsAffine, Fq, Fr};
use ark_ff::{BigInt, PrimeField, Zero};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use revm::primitives::U256;

use crate::error::GadgetFault;
use crate::poseidon::poseidon_fold;

/// Affine point with coordinates in canonical form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JubjubPoint {
  pub x: U256,
  pub y: U256,
}

impl JubjubPoint {
  pub fn identity() -> Self {
    Self { x: U256::ZERO, y: U256::from(1u64) }
  }

  pub fn generator() -> Self {
    from_affine(&EdwardsAffine::generator())
  }

  pub fn is_on_curve(&self) -> bool {
    to_affine(*self).is_ok()
  }

  pub fn add(&self, other: &Self) -> Result<Self, GadgetFault> {
    let sum = to_affine(*self)?.into_group() + to_affine(*other)?;
    Ok(from_affine(&sum.into_affine()))
  }

  /// `scalar · self` for the plain integer `scalar`, without reducing it by
  /// the group order.
  pub fn mul(&self, scalar: U256) -> Result<Self, GadgetFault> {
    let product = to_affine(*self)?.mul_bigint(scalar.as_limbs());
    Ok(from_affine(&product.into_affine()))
  }

  /// `2^doublings · self`.
  pub fn double_n(&self, doublings: usize) -> Result<Self, GadgetFault> {
    let mut point = to_affine(*self)?.into_group();
    for _ in 0..doublings {
      point = point + point;
    }
    Ok(from_affine(&point.into_affine()))
  }
}

fn to_field(value: U256) -> Option<Fq> {
  Fq::from_bigint(BigInt::new(*value.as_limbs()))
}

fn from_field(value: Fq) -> U256 {
  U256::from_limbs(value.into_bigint().0)
}

fn to_affine(point: JubjubPoint) -> Result<EdwardsAffine, GadgetFault> {
  let off_curve = || GadgetFault::OffCurve { x: point.x, y: point.y };
  let x = to_field(point.x).ok_or_else(off_curve)?;
  let y = to_field(point.y).ok_or_else(off_curve)?;
  let affine = EdwardsAffine::new_unchecked(x, y);
  if affine.is_on_curve() { Ok(affine) } else { Err(off_curve()) }
}

fn from_affine(point: &EdwardsAffine) -> JubjubPoint {
  JubjubPoint { x: from_field(point.x), y: from_field(point.y) }
}

/// Order of the prime subgroup generated by [`JubjubPoint::generator`].
pub fn subgroup_order() -> U256 {
  U256::from_limbs(Fr::MODULUS.0)
}

fn to_scalar(value: U256) -> Fr {
  Fr::from_le_bytes_mod_order(&value.to_le_bytes::<32>())
}

fn from_scalar(value: Fr) -> U256 {
  U256::from_limbs(value.into_bigint().0)
}

// ============================================================
// Signatures
// ============================================================

/// Randomizer point and response scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
  pub randomizer: JubjubPoint,
  pub scalar: U256,
}

#[derive(Clone)]
pub struct SigningKey {
  secret: Fr,
}

impl std::fmt::Debug for SigningKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SigningKey").finish_non_exhaustive()
  }
}

impl SigningKey {
  pub fn from_seed(seed: u64) -> Self {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bytes = [0u8; 64];
    rng.fill_bytes(&mut bytes);
    let secret = Fr::from_le_bytes_mod_order(&bytes);
    Self { secret: if secret.is_zero() { Fr::from(1u64) } else { secret } }
  }

  pub fn public_key(&self) -> JubjubPoint {
    let public = EdwardsAffine::generator() * self.secret;
    from_affine(&public.into_affine())
  }

  /// Deterministic signature over `message`; the nonce is derived from the
  /// secret and the message so that signing twice gives the same result.
  pub fn sign(&self, message: &[U256]) -> Signature {
    let mut seed = Vec::with_capacity(message.len() + 1);
    seed.push(from_scalar(self.secret));
    seed.extend_from_slice(message);
    let mut nonce = to_scalar(poseidon_fold(&seed));
    if nonce.is_zero() {
      nonce = Fr::from(1u64);
    }
    let randomizer = from_affine(&(EdwardsAffine::generator() * nonce).into_affine());
    let public_key = self.public_key();
    let challenge = to_scalar(challenge(&randomizer, &public_key, message));
    let scalar = nonce + challenge * self.secret;
    Signature { randomizer, scalar: from_scalar(scalar) }
  }
}

/// `H(R, A, message)` as the circuit derives it.
pub fn challenge(randomizer: &JubjubPoint, public_key: &JubjubPoint, message: &[U256]) -> U256 {
  let mut words = Vec::with_capacity(4 + message.len());
  words.extend_from_slice(&[randomizer.x, randomizer.y, public_key.x, public_key.y]);
  words.extend_from_slice(message);
  poseidon_fold(&words)
}

/// Off-circuit check of `s·G = R + e·A`.
pub fn verify(public_key: &JubjubPoint, message: &[U256], signature: &Signature) -> bool {
  let e = challenge(&signature.randomizer, public_key, message);
  let lhs = JubjubPoint::generator().mul(signature.scalar);
  let rhs = public_key.mul(e).and_then(|ea| signature.randomizer.add(&ea));
  matches!((lhs, rhs), (Ok(lhs), Ok(rhs)) if lhs == rhs)
}
