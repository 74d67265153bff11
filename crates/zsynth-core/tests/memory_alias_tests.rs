use proptest::prelude::*;
use revm::primitives::U256;
use zsynth_core::SynthesizerOptions;
use zsynth_core::gadget::CircuitBuilder;
use zsynth_core::memory::{MemoryAliasModel, WORD_BYTES, copy_region, load_word};
use zsynth_core::wire::{BufferKind, WORD_BITS};

const MEMORY: usize = 1024;

#[derive(Debug, Clone)]
struct Write {
  offset: usize,
  size: usize,
  value: U256,
}

fn write() -> impl Strategy<Value = Write> {
  (prop_oneof![Just(1usize), Just(8), Just(32)], 0..MEMORY - WORD_BYTES, any::<[u8; 32]>()).prop_map(
    |(size, offset, bytes)| {
      let value = U256::from_be_bytes(bytes);
      let value = if size == WORD_BYTES { value } else { value & ((U256::from(1u64) << (8 * size)) - U256::from(1u64)) };
      Write { offset, size, value }
    },
  )
}

/// Model and flat reference memory after applying `writes`.
fn apply(builder: &mut CircuitBuilder, writes: &[Write]) -> (MemoryAliasModel, Vec<u8>) {
  let mut model = MemoryAliasModel::new();
  let mut flat = vec![0u8; MEMORY];
  for write in writes {
    let wire = builder.buffers_mut().labelled(BufferKind::PrivateIn, write.value, WORD_BITS, "word");
    model.write(write.offset, write.size, wire).expect("write");
    let bytes = write.value.to_be_bytes::<32>();
    flat[write.offset..write.offset + write.size].copy_from_slice(&bytes[WORD_BYTES - write.size..]);
  }
  (model, flat)
}

fn word_of(bytes: &[u8]) -> U256 {
  U256::from_be_slice(bytes)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(64))]

  #[test]
  fn simulation_matches_flat_memory(writes in prop::collection::vec(write(), 1..24)) {
    let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
    let (model, flat) = apply(&mut builder, &writes);
    prop_assert_eq!(model.simulate(0, MEMORY), flat.clone());
    prop_assert!(model.check_against(0, MEMORY, &flat).is_ok());
  }

  #[test]
  fn every_record_keeps_a_visible_byte(writes in prop::collection::vec(write(), 1..64)) {
    let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
    let (model, _) = apply(&mut builder, &writes);
    prop_assert_eq!(model.resolve(0, MEMORY, usize::MAX).len(), model.records().len());
  }

  #[test]
  fn loads_resolve_to_flat_memory(
    writes in prop::collection::vec(write(), 1..24),
    offset in 0..MEMORY - WORD_BYTES,
    length in 1..=WORD_BYTES,
  ) {
    let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
    let (model, flat) = apply(&mut builder, &writes);
    let wire = load_word(&mut builder, &model, offset, length, usize::MAX).expect("load");
    prop_assert_eq!(wire.value(), word_of(&flat[offset..offset + length]));
  }

  #[test]
  fn copies_reproduce_the_source(
    writes in prop::collection::vec(write(), 1..16),
    offset in 0..MEMORY / 2,
    length in 1..MEMORY / 4,
  ) {
    let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
    let (model, flat) = apply(&mut builder, &writes);
    let records = copy_region(&mut builder, &model, offset, length, usize::MAX, 0).expect("copy");
    let mut copied = MemoryAliasModel::new();
    copied.write_all(records).expect("records");
    prop_assert_eq!(copied.simulate(0, length), flat[offset..offset + length].to_vec());
  }
}

#[test]
fn overlapping_write_shadows_only_its_bytes() {
  let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
  let writes = [
    Write { offset: 0, size: 32, value: U256::MAX },
    Write { offset: 8, size: 1, value: U256::ZERO },
  ];
  let (model, flat) = apply(&mut builder, &writes);
  assert_eq!(model.records().len(), 2);
  let wire = load_word(&mut builder, &model, 0, 32, usize::MAX).expect("load");
  assert_eq!(wire.value(), word_of(&flat[..32]));
  assert!(builder.graph().count_template("Accumulator") >= 1);
}

#[test]
fn covering_write_drops_the_older_record() {
  let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
  let writes = [
    Write { offset: 4, size: 8, value: U256::from(7u64) },
    Write { offset: 0, size: 32, value: U256::from(9u64) },
  ];
  let (model, _) = apply(&mut builder, &writes);
  assert_eq!(model.records().len(), 1);
}

#[test]
fn loads_past_the_bound_read_zero() {
  let mut builder = CircuitBuilder::new(&SynthesizerOptions::default());
  let (model, _) = apply(&mut builder, &[Write { offset: 0, size: 32, value: U256::MAX }]);
  let wire = load_word(&mut builder, &model, 0, 32, 16).expect("load");
  assert_eq!(wire.value(), U256::MAX << 128);
}
