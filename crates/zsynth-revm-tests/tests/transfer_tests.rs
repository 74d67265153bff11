use revm::primitives::U256;
use zsynth_core::auth::address_to_word;
use zsynth_core::wire::BufferKind;
use zsynth_core::{FrozenCircuit, StateSnapshot, SynthError, SynthesizerOptions, freeze, synthesize_transaction};
use zsynth_revm_tests::{Channel, transfer_code};

/// Sender proof: five challenge hashes, two scalar decompositions, sixteen
/// ladder rows, the verification, the key hash and the address mask.
const AUTH_PLACEMENTS: usize = 5 + 2 + 16 + 1 + 1 + 1;
/// Two leaves, four inner nodes and the root of a depth-2 tree.
const TREE_PLACEMENTS: usize = 2 + 4 + 1;

fn transfer(channel: &Channel, amount: u64) -> zsynth_core::SynthesizedCircuit {
  synthesize_transaction(
    &channel.snapshot,
    transfer_code(),
    &channel.transfer(amount),
    SynthesizerOptions::default(),
  )
  .expect("transfer synthesis")
}

#[test]
fn transfer_moves_balance_between_slots() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let circuit = transfer(&channel, 25);

  assert_eq!(circuit.written_value(address_to_word(channel.sender)), Some(U256::from(975u64)));
  assert_eq!(circuit.written_value(address_to_word(channel.recipient)), Some(U256::from(35u64)));
  assert_eq!(circuit.origin, address_to_word(channel.sender));
  assert_eq!(circuit.steps, 18);
}

#[test]
fn transfer_placement_count_matches_gadget_count() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let circuit = transfer(&channel, 25);

  // SUB and ADD, then the prior tree, its root check and the updated tree.
  let expected = AUTH_PLACEMENTS + 2 + TREE_PLACEMENTS + 1 + TREE_PLACEMENTS;
  assert_eq!(circuit.graph.len(), expected);
  assert_eq!(circuit.graph.count_template("JubjubExpBatch"), 16);
  assert_eq!(circuit.graph.count_template("VerifyMerkleRoot"), 1);
  assert_eq!(circuit.graph.count_template("ALU1"), 2);
}

#[test]
fn transfer_is_deterministic() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let first = transfer(&channel, 25);
  let second = transfer(&channel, 25);
  assert_eq!(first.graph.shape(), second.graph.shape());
  assert_eq!(freeze(&first).expect("freeze"), freeze(&second).expect("freeze"));
}

#[test]
fn frozen_transfer_exports_result_root_and_balances() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let circuit = transfer(&channel, 25);
  let frozen = freeze(&circuit).expect("freeze");

  let private_out = frozen.buffer(BufferKind::PrivateOut).expect("private outputs");
  let descriptions: Vec<_> =
    private_out.slots.iter().filter_map(|slot| slot.description.as_deref()).collect();
  assert_eq!(descriptions.len(), 2);
  assert!(descriptions.iter().all(|description| description.starts_with("final")));
  let public_out = frozen.buffer(BufferKind::PublicOut).expect("public outputs");
  let root = public_out
    .slots
    .iter()
    .find(|slot| slot.description.as_deref() == Some("ResultMerkleRoot"))
    .expect("result root slot");
  assert_eq!(root.wires.len(), 1);
  assert_eq!(root.wires[0].value, circuit.storage.result_root);

  let json = frozen.to_json().expect("serialize");
  assert_eq!(FrozenCircuit::from_json(&json).expect("deserialize"), frozen);
}

#[test]
fn state_chain_advances_root_and_nonce() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let circuit = transfer(&channel, 25);
  let next = channel.snapshot.advance(&circuit).expect("advance");

  let expected = StateSnapshot::genesis(
    channel.contract,
    &[
      (address_to_word(channel.sender), U256::from(975u64)),
      (address_to_word(channel.recipient), U256::from(35u64)),
    ],
    &[channel.sender, channel.recipient],
    2,
  )
  .expect("expected state");
  assert_eq!(next.state_root, expected.state_root);
  assert_eq!(next.nonce(channel.sender), Some(1));

  let advanced = Channel { snapshot: next, ..channel.clone() };
  let circuit = transfer(&advanced, 5);
  assert_eq!(circuit.written_value(address_to_word(channel.sender)), Some(U256::from(970u64)));
  assert_eq!(circuit.storage.initial_root, advanced.snapshot.state_root);
}

#[test]
fn zero_transfer_keeps_the_root() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let circuit = transfer(&channel, 0);
  assert_eq!(circuit.storage.result_root, circuit.storage.initial_root);

  let next = channel.snapshot.advance(&circuit).expect("advance");
  assert_eq!(next.state_root, channel.snapshot.state_root);
  assert_eq!(next.storage_entries, channel.snapshot.storage_entries);
}

#[test]
fn replayed_transaction_is_rejected() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let tx = channel.transfer(25);
  let circuit = synthesize_transaction(&channel.snapshot, transfer_code(), &tx, SynthesizerOptions::default())
    .expect("first run");
  let next = channel.snapshot.advance(&circuit).expect("advance");

  let replay = synthesize_transaction(&next, transfer_code(), &tx, SynthesizerOptions::default());
  assert!(matches!(replay, Err(SynthError::Authentication(_))));
}

#[test]
fn advance_refuses_a_circuit_from_another_state() {
  let channel = Channel::open(1_000, 10).expect("channel");
  let other = Channel::open(500, 10).expect("channel");
  let circuit = transfer(&other, 25);
  assert!(matches!(channel.snapshot.advance(&circuit), Err(SynthError::Consistency { .. })));
}
