use revm::{
  bytecode::opcode,
  primitives::{Address, Bytes, U256},
};
use zsynth_core::jubjub::SigningKey;
use zsynth_core::{L2Transaction, SynthError, SynthesizerOptions, synthesize_transaction};
use zsynth_revm_tests::{Channel, TRANSFER_SELECTOR, call_code, call_word_code, transfer_code};

fn run(channel: &Channel, code: Bytes) -> zsynth_core::Result<zsynth_core::SynthesizedCircuit> {
  synthesize_transaction(&channel.snapshot, code, &channel.transfer(1), SynthesizerOptions::default())
}

#[test]
fn precompile_call_is_unsupported() {
  let channel = Channel::open(100, 0).expect("channel");
  let err = run(&channel, call_code(Address::with_last_byte(0x02))).unwrap_err();
  match err {
    SynthError::Unsupported { location: Some(location), .. } => {
      assert_eq!(location.opcode, opcode::CALL);
      assert_eq!(location.code_address, channel.contract);
    }
    other => panic!("expected an unsupported-construct fault, got {other}"),
  }
}

#[test]
fn prague_precompiles_are_unsupported() {
  let channel = Channel::open(100, 0).expect("channel");
  // BLS12_G1ADD.
  let err = run(&channel, call_code(Address::with_last_byte(0x0b))).unwrap_err();
  assert!(matches!(err, SynthError::Unsupported { .. }), "got {err}");
}

#[test]
fn precompile_target_is_truncated_to_an_address() {
  let channel = Channel::open(100, 0).expect("channel");
  // Reaches SHA256 at 0x02 once the high bits are dropped.
  let target = (U256::from(1u64) << 160) + U256::from(2u64);
  let err = run(&channel, call_word_code(target)).unwrap_err();
  match err {
    SynthError::Unsupported { location: Some(location), .. } => assert_eq!(location.opcode, opcode::CALL),
    other => panic!("expected an unsupported-construct fault, got {other}"),
  }
}

#[test]
fn call_to_an_empty_account_returns_cleanly() {
  let channel = Channel::open(100, 0).expect("channel");
  let circuit = run(&channel, call_code(Address::repeat_byte(0x77))).expect("synthesis");
  // Six pushes, GAS, CALL and STOP.
  assert_eq!(circuit.steps, 9);
}

#[test]
fn revert_rolls_back_storage_writes() {
  let channel = Channel::open(100, 0).expect("channel");
  let code = Bytes::from(vec![
    opcode::PUSH1,
    0x07,
    opcode::PUSH1,
    0x99,
    opcode::SSTORE,
    opcode::PUSH1,
    0x00,
    opcode::PUSH1,
    0x00,
    opcode::REVERT,
  ]);
  let circuit = run(&channel, code).expect("synthesis");
  assert_eq!(circuit.steps, 6);
  assert!(circuit.storage.writes.is_empty());
  assert_eq!(circuit.storage.result_root, circuit.storage.initial_root);
}

#[test]
fn halted_instruction_is_dropped_and_prefix_kept() {
  let channel = Channel::open(100, 0).expect("channel");
  // JUMP to a STOP that is not a JUMPDEST.
  let code = Bytes::from(vec![opcode::PUSH1, 0x03, opcode::JUMP, opcode::STOP]);
  let circuit = run(&channel, code).expect("synthesis");
  assert_eq!(circuit.steps, 1);
}

#[test]
fn undefined_opcode_names_its_location() {
  let channel = Channel::open(100, 0).expect("channel");
  let code = Bytes::from(vec![opcode::PUSH1, 0x01, 0x0c]);
  let err = run(&channel, code).unwrap_err();
  let location = err.location().expect("location");
  assert_eq!(location.pc, 2);
  assert_eq!(location.opcode, 0x0c);
}

#[test]
fn tampered_input_fails_authentication() {
  let channel = Channel::open(100, 0).expect("channel");
  let mut tx = channel.transfer(1);
  tx.inputs[1] = U256::from(100u64);
  let result = synthesize_transaction(&channel.snapshot, transfer_code(), &tx, SynthesizerOptions::default());
  assert!(matches!(result, Err(SynthError::Authentication(_))));
}

#[test]
fn foreign_signer_fails_authentication() {
  let channel = Channel::open(100, 0).expect("channel");
  let mut tx = channel.transfer(1);
  let forged = L2Transaction::signed(
    &SigningKey::from_seed(99),
    tx.nonce,
    tx.to,
    TRANSFER_SELECTOR,
    tx.inputs,
  );
  tx.signature = forged.signature;
  let result = synthesize_transaction(&channel.snapshot, transfer_code(), &tx, SynthesizerOptions::default());
  assert!(matches!(result, Err(SynthError::Authentication(_))));
}

#[test]
fn transaction_to_another_contract_is_refused() {
  let channel = Channel::open(100, 0).expect("channel");
  let inputs = channel.transfer(1).inputs;
  let tx = L2Transaction::signed(&channel.key, 0, Address::repeat_byte(0x0d), TRANSFER_SELECTOR, inputs);
  let result = synthesize_transaction(&channel.snapshot, transfer_code(), &tx, SynthesizerOptions::default());
  assert!(matches!(result, Err(SynthError::Consistency { .. })));
}
