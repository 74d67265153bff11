use std::collections::HashSet;

use revm::primitives::U256;
use zsynth_core::SynthesizerOptions;
use zsynth_core::arith::Operation;
use zsynth_core::error::SynthError;
use zsynth_core::gadget::CircuitBuilder;
use zsynth_core::poseidon::poseidon_fold;
use zsynth_core::wire::{BufferKind, Provenance, WORD_BITS, Wire};

fn builder() -> CircuitBuilder {
  CircuitBuilder::new(&SynthesizerOptions::default())
}

fn input(builder: &mut CircuitBuilder, value: u64, bits: u16) -> Wire {
  builder.buffers_mut().labelled(BufferKind::PublicIn, U256::from(value), bits, "input")
}

#[test]
fn every_wire_is_produced_once_and_consumed_after() {
  let mut b = builder();
  let x = input(&mut b, 7, WORD_BITS);
  let y = input(&mut b, 9, WORD_BITS);
  let sum = b.place_one(Operation::Add, &[x.clone(), y.clone()]).expect("add");
  let product = b.place_one(Operation::Mul, &[sum.clone(), x]).expect("mul");
  b.place_exp(&product, &y).expect("exp");
  b.place_poseidon(&[sum, product]).expect("hash");

  let mut produced: HashSet<Provenance> = HashSet::new();
  for (id, entry) in b.graph().iter() {
    for wire in &entry.inputs {
      assert!(wire.provenance().source_placement() < id, "placement {id} reads a later wire");
    }
    for wire in &entry.outputs {
      assert!(produced.insert(wire.provenance()), "wire {:?} produced twice", wire.provenance());
    }
  }
}

#[test]
fn alu_placements_carry_their_selector() {
  let mut b = builder();
  let x = input(&mut b, 10, WORD_BITS);
  let y = input(&mut b, 3, WORD_BITS);
  let out = b.place_one(Operation::Sub, &[x, y]).expect("sub");
  assert_eq!(out.value(), U256::from(7u64));

  let (_, entry) = b.graph().iter().next().expect("placement");
  assert_eq!(entry.template, "ALU1");
  assert_eq!(entry.inputs.len(), 3);
  assert_eq!(Some(entry.inputs[0].value()), Operation::Sub.selector());
}

#[test]
fn exp_shape_hides_the_exponent() {
  let shape_for = |base: u64, exponent: U256, bits: u16| {
    let mut b = builder();
    let base = input(&mut b, base, WORD_BITS);
    let exponent = b.buffers_mut().labelled(BufferKind::PublicIn, exponent, bits, "exponent");
    let result = b.place_exp(&base, &exponent).expect("exp");
    (b.graph().shape(), result.value())
  };
  let (small, two_pow) = shape_for(2, U256::from(10u64), 4);
  let (large, three_pow) = shape_for(3, U256::from(1u64) << 200, WORD_BITS);
  assert_eq!(small, large);
  assert_eq!(two_pow, U256::from(1024u64));
  assert_eq!(three_pow, U256::from(3u64).pow(U256::from(1u64) << 200));
  // One decomposition and 256 / 8 ladder rows.
  assert_eq!(small.len(), 33);
}

#[test]
fn wider_exp_batches_shorten_the_ladder() {
  let options = SynthesizerOptions { exp_batch_bits: 32, ..SynthesizerOptions::default() };
  let mut b = CircuitBuilder::new(&options);
  let base = input(&mut b, 5, WORD_BITS);
  let exponent = input(&mut b, 3, 2);
  let result = b.place_exp(&base, &exponent).expect("exp");
  assert_eq!(result.value(), U256::from(125u64));
  assert_eq!(b.graph().count_template("SubExpBatch"), 8);
}

#[test]
fn accumulator_splits_past_its_input_limit() {
  let mut b = builder();
  let terms: Vec<Wire> = (0..40u64).map(|i| input(&mut b, 1 << (i % 8), WORD_BITS)).collect();
  let expected: u64 = (0..40u64).map(|i| 1 << (i % 8)).sum();
  let total = b.accumulate(terms).expect("accumulate");
  assert_eq!(total.value(), U256::from(expected));
  assert_eq!(b.graph().count_template("Accumulator"), 3);
}

#[test]
fn poseidon_folds_like_the_reference() {
  let mut b = builder();
  let words: Vec<Wire> = (1..=6u64).map(|i| input(&mut b, i, WORD_BITS)).collect();
  let digest = b.place_poseidon(&words).expect("hash");
  let reference = poseidon_fold(&(1..=6u64).map(U256::from).collect::<Vec<_>>());
  assert_eq!(digest.value(), reference);
  // Two groups of four, then one over the two digests.
  assert_eq!(b.graph().count_template("Poseidon"), 3);
}

#[test]
fn shift_beyond_a_byte_is_unsupported() {
  let mut b = builder();
  let shift = input(&mut b, 300, WORD_BITS);
  let x = input(&mut b, 1, WORD_BITS);
  assert!(matches!(b.place_one(Operation::Shl, &[shift, x]), Err(SynthError::Unsupported { .. })));
  assert!(b.graph().is_empty());
}
