//! Persisted channel state: the bundle one run ends with and the next run
//! starts from.

use std::time::{SystemTime, UNIX_EPOCH};

use revm::primitives::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};
use crate::poseidon::{POSEIDON_INPUTS, leaf_hash, merkle_root};
use crate::storage::StorageBackend;
use crate::synthesizer::SynthesizedCircuit;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEntry {
  pub index: usize,
  #[serde(with = "crate::hex::word")]
  pub key: U256,
  #[serde(with = "crate::hex::word")]
  pub value: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
  #[serde(with = "crate::hex::word")]
  pub state_root: U256,
  #[serde(with = "crate::hex::words")]
  pub registered_keys: Vec<U256>,
  pub storage_entries: Vec<StorageEntry>,
  #[serde(with = "crate::hex::address")]
  pub contract_address: Address,
  #[serde(with = "crate::hex::addresses")]
  pub participants: Vec<Address>,
  /// Nonce of each participant, in participant order.
  pub nonces: Vec<u64>,
  /// Seconds since the Unix epoch.
  pub timestamp: u64,
}

fn now() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |elapsed| elapsed.as_secs())
}

impl StateSnapshot {
  /// Initial state over `entries` (key, value) in leaf order.
  pub fn genesis(
    contract_address: Address,
    entries: &[(U256, U256)],
    participants: &[Address],
    merkle_depth: usize,
  ) -> Result<Self> {
    let leaves = POSEIDON_INPUTS.pow(merkle_depth as u32);
    if entries.len() > leaves {
      return Err(SynthError::Capacity {
        buffer: "merkle leaves".to_string(),
        required: entries.len(),
        available: leaves,
      });
    }
    let storage_entries: Vec<StorageEntry> = entries
      .iter()
      .enumerate()
      .map(|(index, (key, value))| StorageEntry { index, key: *key, value: *value })
      .collect();
    Ok(Self {
      state_root: root_of(&storage_entries, merkle_depth),
      registered_keys: entries.iter().map(|(key, _)| *key).collect(),
      storage_entries,
      contract_address,
      participants: participants.to_vec(),
      nonces: vec![0; participants.len()],
      timestamp: now(),
    })
  }

  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn value(&self, key: U256) -> Option<U256> {
    self.storage_entries.iter().find(|entry| entry.key == key).map(|entry| entry.value)
  }

  pub fn nonce(&self, participant: Address) -> Option<u64> {
    let position = self.participants.iter().position(|p| *p == participant)?;
    self.nonces.get(position).copied()
  }

  /// State after `circuit` ran on top of this one: tracked slots take their
  /// final values, the sender's nonce advances and the root becomes the
  /// circuit's resulting root.
  pub fn advance(&self, circuit: &SynthesizedCircuit) -> Result<Self> {
    if circuit.storage.initial_root != self.state_root {
      return Err(SynthError::consistency(format!(
        "circuit started from root {:#x}, snapshot root is {:#x}",
        circuit.storage.initial_root, self.state_root
      )));
    }
    let mut next = self.clone();
    for write in &circuit.storage.writes {
      if write.address != self.contract_address || write.merkle_index.is_none() {
        continue;
      }
      if let Some(entry) = next.storage_entries.iter_mut().find(|entry| entry.key == write.key) {
        entry.value = write.value;
      }
    }
    let sender = circuit.transaction.sender;
    match next.participants.iter().position(|p| *p == sender) {
      Some(position) => next.nonces[position] = circuit.transaction.nonce + 1,
      None => {
        next.participants.push(sender);
        next.nonces.push(circuit.transaction.nonce + 1);
      }
    }
    next.state_root = circuit.storage.result_root;
    next.timestamp = now();
    Ok(next)
  }
}

/// Root of the tree over `entries`, with empty leaves elsewhere.
fn root_of(entries: &[StorageEntry], depth: usize) -> U256 {
  let empty = leaf_hash(U256::ZERO, U256::ZERO);
  let mut leaves = vec![empty; POSEIDON_INPUTS.pow(depth as u32)];
  for entry in entries {
    if let Some(leaf) = leaves.get_mut(entry.index) {
      *leaf = leaf_hash(entry.key, entry.value);
    }
  }
  merkle_root(&leaves, depth)
}

/// Serves a snapshot as the prior state of a synthesis run.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotStorage<'a> {
  snapshot: &'a StateSnapshot,
}

impl<'a> SnapshotStorage<'a> {
  pub fn new(snapshot: &'a StateSnapshot) -> Self {
    Self { snapshot }
  }
}

impl StorageBackend for SnapshotStorage<'_> {
  fn contract(&self) -> Address {
    self.snapshot.contract_address
  }

  fn storage(&self, address: Address, key: U256) -> U256 {
    if address != self.snapshot.contract_address {
      return U256::ZERO;
    }
    self.snapshot.value(key).unwrap_or(U256::ZERO)
  }

  fn merkle_index(&self, key: U256) -> Option<usize> {
    self.snapshot.storage_entries.iter().find(|entry| entry.key == key).map(|entry| entry.index)
  }

  fn merkle_root(&self) -> U256 {
    self.snapshot.state_root
  }

  fn registered_keys(&self) -> Vec<U256> {
    self.snapshot.registered_keys.clone()
  }

  fn participant_nonce(&self, address: Address) -> Option<u64> {
    self.snapshot.nonce(address)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn genesis() -> StateSnapshot {
    StateSnapshot::genesis(
      Address::repeat_byte(0xcc),
      &[(U256::from(1u64), U256::from(100u64)), (U256::from(2u64), U256::from(5u64))],
      &[Address::repeat_byte(0xaa)],
      2,
    )
    .expect("genesis")
  }

  #[test]
  fn genesis_root_commits_to_entries() {
    let snapshot = genesis();
    let expected = merkle_root(
      &[leaf_hash(U256::from(1u64), U256::from(100u64)), leaf_hash(U256::from(2u64), U256::from(5u64))],
      2,
    );
    assert_eq!(snapshot.state_root, expected);
    assert_eq!(snapshot.nonce(Address::repeat_byte(0xaa)), Some(0));
  }

  #[test]
  fn json_round_trip_keeps_every_field() {
    let snapshot = genesis();
    let json = snapshot.to_json().expect("serialize");
    assert!(json.contains("\"0x64\""));
    assert_eq!(StateSnapshot::from_json(&json).expect("deserialize"), snapshot);
  }

  #[test]
  fn too_many_entries_for_the_tree() {
    let entries: Vec<(U256, U256)> = (0..17u64).map(|k| (U256::from(k), U256::ZERO)).collect();
    let result = StateSnapshot::genesis(Address::ZERO, &entries, &[], 2);
    assert!(matches!(result, Err(SynthError::Capacity { .. })));
  }

  #[test]
  fn backend_answers_from_the_snapshot() {
    let snapshot = genesis();
    let backend = SnapshotStorage::new(&snapshot);
    assert_eq!(backend.storage(snapshot.contract_address, U256::from(2u64)), U256::from(5u64));
    assert_eq!(backend.merkle_index(U256::from(2u64)), Some(1));
    assert_eq!(backend.merkle_index(U256::from(3u64)), None);
    assert_eq!(backend.storage(Address::ZERO, U256::from(2u64)), U256::ZERO);
  }
}
