use revm::primitives::{Address, Bytes, U256, keccak256};
use zsynth_core::auth::{TRANSACTION_INPUTS, address_of};
use zsynth_core::jubjub::SigningKey;
use zsynth_core::opcode::byte;
use zsynth_core::snapshot::SnapshotStorage;
use zsynth_core::step::StepSnapshot;
use zsynth_core::wire::BufferKind;
use zsynth_core::{
  L2Transaction, StateSnapshot, SynthError, SynthesizedCircuit, Synthesizer, SynthesizerOptions,
  synthesize_transaction,
};

const INPUT0: u64 = 0xfeed_f00d;

fn fixture() -> (StateSnapshot, L2Transaction) {
  let key = SigningKey::from_seed(8);
  let sender = address_of(&key.public_key());
  let contract = Address::repeat_byte(0xc0);
  let snapshot = StateSnapshot::genesis(contract, &[], &[sender], 2).expect("genesis");
  let mut inputs = [U256::ZERO; TRANSACTION_INPUTS];
  inputs[0] = U256::from(INPUT0);
  (snapshot, L2Transaction::signed(&key, 0, contract, 0x12345678, inputs))
}

fn run(code: Vec<u8>) -> SynthesizedCircuit {
  let (snapshot, tx) = fixture();
  synthesize_transaction(&snapshot, Bytes::from(code), &tx, SynthesizerOptions::default()).expect("synthesis")
}

fn descriptions(circuit: &SynthesizedCircuit, kind: BufferKind) -> Vec<String> {
  circuit
    .buffers
    .buffer(kind)
    .slots()
    .iter()
    .filter_map(|slot| slot.external.description().map(str::to_string))
    .collect()
}

#[test]
fn overlapping_memory_writes_resolve_like_the_interpreter() {
  let mut code = vec![byte::PUSH32];
  code.extend_from_slice(&[0xab; 32]);
  code.extend_from_slice(&[
    byte::PUSH1, 3, byte::MSTORE, // [3, 35) = 0xab..
    byte::PUSH1, 0x55, byte::PUSH1, 10, byte::MSTORE8, // byte 10 = 0x55
    byte::PUSH1, 0, byte::MLOAD,
    byte::PUSH1, 20, byte::MLOAD,
    byte::ADD, byte::PUSH1, 64, byte::MSTORE,
    byte::PUSH1, 40, byte::PUSH1, 1, byte::PUSH1, 100, byte::MCOPY,
    byte::PUSH1, 90, byte::MLOAD,
    byte::STOP,
  ]);
  let circuit = run(code);
  assert_eq!(circuit.steps, 20);
  assert!(circuit.graph.count_template("Accumulator") >= 2);
}

#[test]
fn calldata_copy_keeps_input_wires() {
  let code = vec![
    byte::CALLDATASIZE, byte::PUSH1, 0, byte::PUSH1, 7, byte::CALLDATACOPY,
    byte::PUSH1, 0x24, byte::PUSH1, 7, byte::KECCAK256,
    byte::PUSH1, 11, byte::MLOAD,
    byte::STOP,
  ];
  let circuit = run(code);
  assert_eq!(circuit.steps, 10);
  let public_out = descriptions(&circuit, BufferKind::PublicOut);
  assert!(public_out.iter().any(|d| d == "KECCAK256 preimage word 0"));
  assert!(public_out.iter().any(|d| d == "KECCAK256 preimage word 1"));
  let public_in = descriptions(&circuit, BufferKind::PublicIn);
  assert!(public_in.iter().any(|d| d == "KECCAK256 digest"));
  assert!(public_in.iter().any(|d| d == "CALLDATASIZE"));
}

#[test]
fn context_values_bind_to_the_sender_and_reserved_inputs() {
  let code = vec![
    byte::ADDRESS, byte::ORIGIN, byte::CALLER, byte::TIMESTAMP, byte::NUMBER, byte::CHAINID,
    byte::CALLVALUE, byte::TIMESTAMP, byte::STOP,
  ];
  let circuit = run(code);
  assert_eq!(circuit.steps, 9);
  let public_in = descriptions(&circuit, BufferKind::PublicIn);
  assert_eq!(public_in.iter().filter(|d| *d == "BlockTimestamp").count(), 1);
  assert!(public_in.iter().any(|d| d == "BlockChainId"));
  assert!(public_in.iter().any(|d| d == "CALLVALUE"));
  assert!(!public_in.iter().any(|d| d == "ORIGIN" || d == "CALLER"));
}

#[test]
fn loops_and_transient_storage() {
  let code = vec![
    byte::PUSH1, 3,
    byte::JUMPDEST,
    byte::PUSH1, 1, byte::SWAP1, byte::SUB,
    byte::DUP1, byte::PUSH1, 2, byte::JUMPI,
    byte::PUSH1, 9, byte::PUSH1, 1, byte::TSTORE,
    byte::PUSH1, 1, byte::TLOAD,
    byte::STOP,
  ];
  let circuit = run(code);
  assert_eq!(circuit.steps, 28);
  assert_eq!(circuit.graph.count_template("ALU1"), 3);
  assert!(circuit.storage.writes.is_empty());
}

#[test]
fn logs_export_topics_and_data() {
  let code = vec![
    byte::PUSH1, 0xaa, byte::PUSH1, 0, byte::MSTORE,
    byte::PUSH1 + 1, 0xbe, 0xef, byte::PUSH1, 32, byte::PUSH1, 0, byte::LOG0 + 1,
    byte::STOP,
  ];
  let circuit = run(code);
  let public_out = descriptions(&circuit, BufferKind::PublicOut);
  assert!(public_out.iter().any(|d| d == "LOG1 topic 0"));
  assert!(public_out.iter().any(|d| d == "LOG1 data word 0"));
}

fn step(pc: usize, opcode: u8, stack: &[u64], memory: &[u8]) -> StepSnapshot {
  StepSnapshot {
    pc,
    opcode,
    address: Address::repeat_byte(0xc0),
    code_address: Address::repeat_byte(0xc0),
    stack: stack.iter().copied().map(U256::from).collect(),
    memory: memory.to_vec(),
    ..StepSnapshot::default()
  }
}

/// `PUSH1 32; PUSH1 0; KECCAK256` where the interpreter reports `memory`
/// and the digest of `hashed`. Nothing was ever written symbolically.
fn hash_step(memory: &[u8], hashed: &[u8]) -> zsynth_core::Result<()> {
  let (snapshot, tx) = fixture();
  let backend = SnapshotStorage::new(&snapshot);
  let mut synth = Synthesizer::new(SynthesizerOptions::default(), &backend, tx)?;
  synth.begin_transaction()?;
  synth.apply_step(&step(0, byte::PUSH1, &[], &[]), &step(2, byte::PUSH1, &[32], &[]))?;
  synth.apply_step(&step(2, byte::PUSH1, &[32], &[]), &step(4, byte::KECCAK256, &[32, 0], &[]))?;

  let before = step(4, byte::KECCAK256, &[32, 0], memory);
  let mut after = step(5, byte::STOP, &[], memory);
  after.stack = vec![U256::from_be_slice(keccak256(hashed).as_slice())];
  synth.before_step(&before)?;
  synth.apply_step(&before, &after)
}

#[test]
fn keccak_digest_follows_symbolic_memory() {
  assert!(hash_step(&[0u8; 32], &[0u8; 32]).is_ok());
  // Concrete memory agrees with the reported digest, symbolic memory is zero.
  let forged = [0xffu8; 32];
  assert!(matches!(hash_step(&forged, &forged), Err(SynthError::Consistency { .. })));
}
