use proptest::prelude::*;
use revm::{
  bytecode::opcode,
  primitives::{Bytes, U256},
};
use zsynth_core::{SynthError, SynthesizedCircuit, SynthesizerOptions, synthesize_transaction};
use zsynth_revm_tests::{
  Channel, binary_op_code, memory_code, ternary_op_code, unary_op_code, words_then,
};

const WORD_OPS: [u8; 16] = [
  opcode::ADD,
  opcode::MUL,
  opcode::SUB,
  opcode::DIV,
  opcode::SDIV,
  opcode::MOD,
  opcode::SMOD,
  opcode::EXP,
  opcode::LT,
  opcode::GT,
  opcode::SLT,
  opcode::SGT,
  opcode::EQ,
  opcode::AND,
  opcode::OR,
  opcode::XOR,
];

/// Operations whose top operand is a shift, byte index or size.
const BYTE_OPS: [u8; 5] = [opcode::SHL, opcode::SHR, opcode::SAR, opcode::BYTE, opcode::SIGNEXTEND];

fn word() -> impl Strategy<Value = U256> {
  prop_oneof![
    Just(U256::ZERO),
    Just(U256::MAX),
    Just(U256::from(1u64) << 255),
    any::<[u8; 32]>().prop_map(U256::from_be_bytes),
    any::<u64>().prop_map(U256::from),
  ]
}

fn synthesize(code: Bytes) -> zsynth_core::Result<SynthesizedCircuit> {
  let channel = Channel::open(100, 0)?;
  synthesize_transaction(&channel.snapshot, code, &channel.transfer(0), SynthesizerOptions::default())
}

fn steps(code: Bytes) -> Result<usize, TestCaseError> {
  synthesize(code).map(|circuit| circuit.steps).map_err(|err| TestCaseError::fail(err.to_string()))
}

fn run(op: u8, a: U256, b: U256) -> zsynth_core::Result<usize> {
  synthesize(binary_op_code(op, a, b)).map(|circuit| circuit.steps)
}

proptest! {
  #![proptest_config(ProptestConfig::with_cases(24))]

  #[test]
  fn word_ops_match_the_interpreter(op in proptest::sample::select(WORD_OPS.to_vec()), a in word(), b in word()) {
    prop_assert_eq!(run(op, a, b).map_err(|err| TestCaseError::fail(err.to_string()))?, 4);
  }

  #[test]
  fn byte_operand_ops_match_the_interpreter(
    op in proptest::sample::select(BYTE_OPS.to_vec()),
    a in 0u64..256,
    b in word(),
  ) {
    prop_assert_eq!(run(op, U256::from(a), b).map_err(|err| TestCaseError::fail(err.to_string()))?, 4);
  }

  #[test]
  fn byte_operands_past_the_template_range_are_refused(
    op in proptest::sample::select(BYTE_OPS.to_vec()),
    a in 256u64..,
    b in word(),
  ) {
    prop_assert!(matches!(run(op, U256::from(a), b), Err(SynthError::Unsupported { .. })), "expected Unsupported");
  }

  #[test]
  fn unary_ops_match_the_interpreter(op in proptest::sample::select(vec![opcode::NOT, opcode::ISZERO]), a in word()) {
    prop_assert_eq!(steps(unary_op_code(op, a))?, 3);
  }

  #[test]
  fn modular_ops_match_the_interpreter(
    op in proptest::sample::select(vec![opcode::ADDMOD, opcode::MULMOD]),
    a in word(),
    b in word(),
    n in word(),
  ) {
    prop_assert_eq!(steps(ternary_op_code(op, a, b, n))?, 5);
  }

  #[test]
  fn dup_and_swap_track_the_stack(
    depth in 1u8..=16,
    swap in any::<bool>(),
    words in prop::collection::vec(word(), 17),
  ) {
    let op = if swap { opcode::SWAP1 + depth - 1 } else { opcode::DUP1 + depth - 1 };
    // Seventeen pushes, the shuffle and STOP.
    prop_assert_eq!(steps(words_then(&words, &[op]))?, 19);
  }

  #[test]
  fn unaligned_memory_matches_the_interpreter(
    word_at in 0u16..256,
    word in word(),
    byte_at in 0u16..320,
    byte in word(),
    load_at in 0u16..320,
  ) {
    prop_assert_eq!(steps(memory_code(word_at, word, byte_at, byte, load_at))?, 9);
  }
}

#[test]
fn exp_of_zero_width_exponent() {
  assert_eq!(run(opcode::EXP, U256::from(3u64), U256::ZERO).expect("synthesis"), 4);
}

#[test]
fn exp_placements_do_not_depend_on_the_exponent() {
  let placements = |exponent: U256| {
    synthesize(binary_op_code(opcode::EXP, U256::from(3u64), exponent)).expect("synthesis").graph.len()
  };
  assert_eq!(placements(U256::from(3u64)), placements(U256::from(1u64) << 200));
  assert_eq!(placements(U256::ZERO), placements(U256::MAX));
}
