//! Storage/Merkle bridge.
//!
//! Slots of the tracked contract that the backend places in the commitment
//! tree are *tracked*: their first touch loads Merkle index, key and value
//! as private inputs, and finalisation proves the initial root and derives
//! the resulting one. Every other slot is a plain public load.

use std::collections::{BTreeMap, HashMap};

use revm::primitives::{Address, U256};
use tracing::{debug, instrument};

use crate::arith::Operation;
use crate::buffer::ReservedVariable;
use crate::error::{Result, SynthError};
use crate::gadget::CircuitBuilder;
use crate::poseidon::{POSEIDON_INPUTS, leaf_hash};
use crate::wire::{BufferKind, WORD_BITS, Wire};

/// Bit width of Merkle leaf index wires.
const INDEX_BITS: u16 = 64;

/// Source of prior state. Implementations answer from a persisted snapshot
/// or any other store holding the same commitment.
pub trait StorageBackend {
  /// The contract whose storage the Merkle tree commits to.
  fn contract(&self) -> Address;

  fn storage(&self, address: Address, key: U256) -> U256;

  /// Leaf position of a tracked key, `None` when the key is not registered.
  fn merkle_index(&self, key: U256) -> Option<usize>;

  fn merkle_root(&self) -> U256;

  /// Tracked keys in leaf order.
  fn registered_keys(&self) -> Vec<U256>;

  /// Recorded nonce of a known participant.
  fn participant_nonce(&self, _address: Address) -> Option<u64> {
    None
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
  Read,
  Write,
}

#[derive(Debug, Clone)]
pub struct StorageCacheEntry {
  /// Leaf position; `Some` exactly for tracked slots.
  pub merkle_index: Option<usize>,
  /// Private key wire of a tracked slot.
  pub key: Option<Wire>,
  /// Value before the transaction, absent for untracked slots first written.
  pub initial: Option<Wire>,
  pub current: Wire,
  pub access: Access,
}

impl StorageCacheEntry {
  pub fn is_tracked(&self) -> bool {
    self.merkle_index.is_some()
  }
}

/// Backend answer for a slot on its first touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotFetch {
  pub value: U256,
  pub merkle_index: Option<usize>,
}

/// A slot whose value changed during the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageWrite {
  pub address: Address,
  pub key: U256,
  pub value: U256,
  pub merkle_index: Option<usize>,
}

/// Result of the finalisation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageOutcome {
  pub initial_root: U256,
  pub result_root: U256,
  pub writes: Vec<StorageWrite>,
}

type SlotId = (Address, U256);

#[derive(Debug, Clone)]
struct Checkpoint {
  slots: BTreeMap<SlotId, (Wire, Access)>,
  transient: HashMap<SlotId, Wire>,
}

#[derive(Debug, Clone, Default)]
pub struct StorageBridge {
  cache: BTreeMap<SlotId, StorageCacheEntry>,
  transient: HashMap<SlotId, Wire>,
  checkpoints: Vec<Checkpoint>,
}

impl StorageBridge {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn entry(&self, address: Address, key: U256) -> Option<&StorageCacheEntry> {
    self.cache.get(&(address, key))
  }

  pub fn entries(&self) -> impl Iterator<Item = (&(Address, U256), &StorageCacheEntry)> + '_ {
    self.cache.iter()
  }

  // ── Two-phase access ──────────────────────────────────────────────

  /// Gather phase: ask the backend about a slot that is not cached yet.
  pub fn fetch(&self, backend: &dyn StorageBackend, address: Address, key: U256) -> Option<SlotFetch> {
    if self.cache.contains_key(&(address, key)) {
      return None;
    }
    let merkle_index =
      if address == backend.contract() { backend.merkle_index(key) } else { None };
    Some(SlotFetch { value: backend.storage(address, key), merkle_index })
  }

  fn register(
    &mut self,
    builder: &mut CircuitBuilder,
    address: Address,
    key: U256,
    fetch: SlotFetch,
  ) -> &StorageCacheEntry {
    let slot = format!("{address}[{key:#x}]");
    let entry = match fetch.merkle_index {
      Some(index) => {
        let buffers = builder.buffers_mut();
        buffers.labelled(
          BufferKind::PrivateIn,
          U256::from(index),
          INDEX_BITS,
          format!("merkle index of {slot}"),
        );
        let key = buffers.labelled(BufferKind::PrivateIn, key, WORD_BITS, format!("key of {slot}"));
        let value =
          buffers.labelled(BufferKind::PrivateIn, fetch.value, WORD_BITS, format!("value of {slot}"));
        StorageCacheEntry {
          merkle_index: Some(index),
          key: Some(key),
          initial: Some(value.clone()),
          current: value,
          access: Access::Read,
        }
      }
      None => {
        let value = builder.buffers_mut().labelled(
          BufferKind::PublicIn,
          fetch.value,
          WORD_BITS,
          format!("storage {slot}"),
        );
        StorageCacheEntry {
          merkle_index: None,
          key: None,
          initial: Some(value.clone()),
          current: value,
          access: Access::Read,
        }
      }
    };
    debug!(%address, key = %format_args!("{key:#x}"), tracked = entry.is_tracked(), "cold storage slot");
    self.cache.entry((address, key)).or_insert(entry)
  }

  /// Emit phase of SLOAD. `fetch` is the gather-phase result, `None` for a
  /// warm slot.
  pub fn load(
    &mut self,
    builder: &mut CircuitBuilder,
    address: Address,
    key: U256,
    fetch: Option<SlotFetch>,
    concrete: U256,
  ) -> Result<Wire> {
    let cached = self.cache.get(&(address, key)).map(|entry| entry.current.clone());
    let wire = match (cached, fetch) {
      (Some(current), _) => current,
      (None, Some(fetch)) => {
        if fetch.value != concrete {
          return Err(SynthError::consistency(format!(
            "backend holds {:#x} for {address}[{key:#x}], interpreter read {concrete:#x}",
            fetch.value
          )));
        }
        self.register(builder, address, key, fetch).current.clone()
      }
      (None, None) => {
        return Err(SynthError::consistency(format!(
          "cold slot {address}[{key:#x}] reached emission without a backend fetch"
        )));
      }
    };
    if wire.value() != concrete {
      return Err(SynthError::consistency(format!(
        "cached value {:#x} of {address}[{key:#x}] differs from interpreter value {concrete:#x}",
        wire.value()
      )));
    }
    Ok(wire)
  }

  /// Emit phase of SSTORE.
  pub fn store(
    &mut self,
    builder: &mut CircuitBuilder,
    address: Address,
    key: U256,
    fetch: Option<SlotFetch>,
    value: Wire,
  ) -> Result<()> {
    if !self.cache.contains_key(&(address, key)) {
      match fetch {
        Some(fetch) if fetch.merkle_index.is_some() => {
          self.register(builder, address, key, fetch);
        }
        _ => {
          self.cache.insert(
            (address, key),
            StorageCacheEntry {
              merkle_index: None,
              key: None,
              initial: None,
              current: value.clone(),
              access: Access::Write,
            },
          );
        }
      }
    }
    let entry = self
      .cache
      .get_mut(&(address, key))
      .ok_or_else(|| SynthError::consistency("storage slot vanished from the cache"))?;
    entry.current = value;
    entry.access = Access::Write;
    Ok(())
  }

  pub fn transient_load(&mut self, builder: &mut CircuitBuilder, address: Address, key: U256) -> Wire {
    match self.transient.get(&(address, key)) {
      Some(wire) => wire.clone(),
      None => builder.zero(),
    }
  }

  pub fn transient_store(&mut self, address: Address, key: U256, value: Wire) {
    self.transient.insert((address, key), value);
  }

  // ── Frames ────────────────────────────────────────────────────────

  /// Remember the current values; paired with [`Self::commit`] or
  /// [`Self::rollback`].
  pub fn checkpoint(&mut self) {
    let slots =
      self.cache.iter().map(|(slot, entry)| (*slot, (entry.current.clone(), entry.access))).collect();
    self.checkpoints.push(Checkpoint { slots, transient: self.transient.clone() });
  }

  pub fn commit(&mut self) {
    self.checkpoints.pop();
  }

  /// Restore values to the last checkpoint. Slots first touched since then
  /// stay cached, with their pre-transaction value.
  pub fn rollback(&mut self) -> Result<()> {
    let checkpoint = self
      .checkpoints
      .pop()
      .ok_or_else(|| SynthError::consistency("storage rollback without a checkpoint"))?;
    self.cache.retain(|slot, entry| {
      match checkpoint.slots.get(slot) {
        Some((current, access)) => {
          entry.current = current.clone();
          entry.access = *access;
          true
        }
        None => match &entry.initial {
          Some(initial) => {
            entry.current = initial.clone();
            entry.access = Access::Read;
            true
          }
          None => false,
        },
      }
    });
    self.transient = checkpoint.transient;
    Ok(())
  }

  // ── Finalisation ──────────────────────────────────────────────────

  /// Prove the initial root, derive the resulting one and export every
  /// written slot.
  #[instrument(skip_all, fields(depth = depth))]
  pub fn finalize(
    &mut self,
    builder: &mut CircuitBuilder,
    backend: &dyn StorageBackend,
    depth: usize,
  ) -> Result<StorageOutcome> {
    let contract = backend.contract();
    let width = POSEIDON_INPUTS.pow(depth as u32);
    let registered = backend.registered_keys();
    if registered.len() > width {
      return Err(SynthError::Capacity {
        buffer: "merkle leaves".to_string(),
        required: registered.len(),
        available: width,
      });
    }
    for key in &registered {
      if !self.cache.contains_key(&(contract, *key)) {
        let fetch = SlotFetch {
          value: backend.storage(contract, *key),
          merkle_index: backend.merkle_index(*key),
        };
        if fetch.merkle_index.is_none() {
          return Err(SynthError::consistency(format!(
            "registered key {key:#x} has no Merkle index"
          )));
        }
        self.register(builder, contract, *key, fetch);
      }
    }

    let empty = builder.constant(leaf_hash(U256::ZERO, U256::ZERO));
    let mut leaves = vec![empty; width];
    let mut written = Vec::new();
    for entry in self.cache.values().filter(|entry| entry.is_tracked()) {
      let (Some(index), Some(key), Some(initial)) = (entry.merkle_index, &entry.key, &entry.initial)
      else {
        continue;
      };
      if index >= width {
        return Err(SynthError::consistency(format!(
          "Merkle index {index} outside a tree of {width} leaves"
        )));
      }
      leaves[index] = place_leaf(builder, key, initial)?;
      if entry.access == Access::Write {
        written.push((index, key.clone(), entry.current.clone()));
      }
    }
    let computed = place_tree(builder, leaves.clone())?;
    let declared =
      builder.buffers_mut().reserved(ReservedVariable::InitialMerkleRoot, backend.merkle_root());
    builder.place(Operation::VerifyMerkleRoot, &[computed.clone(), declared])?;

    let result_root = if written.is_empty() {
      computed.value()
    } else {
      for (index, key, value) in &written {
        leaves[*index] = place_leaf(builder, key, value)?;
      }
      let root = place_tree(builder, leaves)?;
      builder.buffers_mut().export_reserved(ReservedVariable::ResultMerkleRoot, &root);
      root.value()
    };

    let mut writes = Vec::new();
    for ((address, key), entry) in &self.cache {
      if entry.access != Access::Write {
        continue;
      }
      let kind = if entry.is_tracked() { BufferKind::PrivateOut } else { BufferKind::PublicOut };
      builder.buffers_mut().export(kind, &entry.current, format!("final {address}[{key:#x}]"));
      writes.push(StorageWrite {
        address: *address,
        key: *key,
        value: entry.current.value(),
        merkle_index: entry.merkle_index,
      });
    }
    debug!(written = writes.len(), result_root = %format_args!("{result_root:#x}"), "storage finalised");
    Ok(StorageOutcome { initial_root: computed.value(), result_root, writes })
  }
}

fn place_leaf(builder: &mut CircuitBuilder, key: &Wire, value: &Wire) -> Result<Wire> {
  let zero = builder.zero();
  builder.place_one(Operation::Poseidon, &[key.clone(), value.clone(), zero.clone(), zero])
}

fn place_tree(builder: &mut CircuitBuilder, leaves: Vec<Wire>) -> Result<Wire> {
  let mut layer = leaves;
  while layer.len() > 1 {
    let mut next = Vec::with_capacity(layer.len() / POSEIDON_INPUTS);
    for chunk in layer.chunks(POSEIDON_INPUTS) {
      next.push(builder.place_one(Operation::Poseidon, chunk)?);
    }
    layer = next;
  }
  layer.pop().ok_or_else(|| SynthError::consistency("empty Merkle tree"))
}
