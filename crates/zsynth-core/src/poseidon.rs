//! The circuit's 4-input hash and the storage tree built from it.
//!
//! Poseidon2 over Mersenne31 (width 16, rate 8) absorbs each 256-bit word as
//! sixteen 16-bit limbs, least significant first. The eight squeezed field
//! elements are packed into a 248-bit digest, so digests always fit the
//! 255-bit wires used for field values.

use std::sync::OnceLock;

use p3_field::{PrimeCharacteristicRing, PrimeField32};
use p3_mersenne_31::{Mersenne31, Poseidon2Mersenne31};
use p3_symmetric::{CryptographicHasher, PaddingFreeSponge};
use rand::SeedableRng;
use rand_xoshiro::Xoroshiro128Plus;
use revm::primitives::U256;

pub const POSEIDON_INPUTS: usize = 4;

const LIMBS_PER_WORD: usize = 16;
const DIGEST_ELEMENT_BITS: usize = 31;

type Sponge = PaddingFreeSponge<Poseidon2Mersenne31<16>, 16, 8, 8>;

fn sponge() -> &'static Sponge {
  static SPONGE: OnceLock<Sponge> = OnceLock::new();
  SPONGE.get_or_init(|| {
    let mut rng = Xoroshiro128Plus::seed_from_u64(0x7a73_796e_7468);
    Sponge::new(Poseidon2Mersenne31::<16>::new_from_rng_128(&mut rng))
  })
}

/// Hash exactly four words.
pub fn poseidon4(words: [U256; POSEIDON_INPUTS]) -> U256 {
  let mut input = Vec::with_capacity(POSEIDON_INPUTS * LIMBS_PER_WORD);
  for word in words {
    for limb in word.as_limbs() {
      for shift in (0..64).step_by(16) {
        input.push(Mersenne31::from_u32(((limb >> shift) & 0xffff) as u32));
      }
    }
  }
  let digest = sponge().hash_iter(input);
  digest.iter().enumerate().fold(U256::ZERO, |acc, (i, element)| {
    acc | (U256::from(element.as_canonical_u32()) << (i * DIGEST_ELEMENT_BITS))
  })
}

/// Fold any number of words by hashing zero-padded groups of four until a
/// single word remains. The in-circuit fold places the same groups.
pub fn poseidon_fold(words: &[U256]) -> U256 {
  let mut layer: Vec<U256> = if words.is_empty() { vec![U256::ZERO] } else { words.to_vec() };
  loop {
    layer = layer
      .chunks(POSEIDON_INPUTS)
      .map(|chunk| {
        let mut group = [U256::ZERO; POSEIDON_INPUTS];
        group[..chunk.len()].copy_from_slice(chunk);
        poseidon4(group)
      })
      .collect();
    if layer.len() == 1 {
      return layer[0];
    }
  }
}

/// Leaf commitment of one storage slot.
pub fn leaf_hash(key: U256, value: U256) -> U256 {
  poseidon4([key, value, U256::ZERO, U256::ZERO])
}

/// Root of the 4-ary tree of `depth` levels over `leaves`; positions past the
/// end of `leaves` hold the empty leaf `leaf_hash(0, 0)`.
pub fn merkle_root(leaves: &[U256], depth: usize) -> U256 {
  let width = POSEIDON_INPUTS.pow(depth as u32);
  let empty = leaf_hash(U256::ZERO, U256::ZERO);
  let mut layer: Vec<U256> = (0..width).map(|i| leaves.get(i).copied().unwrap_or(empty)).collect();
  while layer.len() > 1 {
    layer = layer
      .chunks(POSEIDON_INPUTS)
      .map(|chunk| poseidon4([chunk[0], chunk[1], chunk[2], chunk[3]]))
      .collect();
  }
  layer[0]
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digest_fits_field_wire() {
    let digest = poseidon4([U256::MAX; 4]);
    assert!(digest.bit_len() <= 248);
    assert_eq!(digest, poseidon4([U256::MAX; 4]));
  }

  #[test]
  fn limb_split_is_injective_on_small_changes() {
    let a = poseidon4([U256::from(1u64), U256::ZERO, U256::ZERO, U256::ZERO]);
    let b = poseidon4([U256::from(1u64) << 16, U256::ZERO, U256::ZERO, U256::ZERO]);
    assert_ne!(a, b);
  }

  #[test]
  fn fold_of_four_is_single_hash() {
    let words = [U256::from(1u64), U256::from(2u64), U256::from(3u64), U256::from(4u64)];
    assert_eq!(poseidon_fold(&words), poseidon4(words));
  }
}
