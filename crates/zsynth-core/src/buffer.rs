//! Boundary buffers and the load caches in front of them.
//!
//! Every value entering the circuit from outside is a *load*: an external
//! wire on the buffer's outer side paired with an internal wire that
//! placements consume. Exports go the other way. Loads of undescribed
//! constants and of reserved variables are cached, so repeated requests
//! return the very same wire.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use revm::primitives::U256;

use crate::wire::{BufferKind, FIELD_BITS, Provenance, WORD_BITS, Wire, bit_length};

// ── Reserved variables ──────────────────────────────────────────────

/// Block fields readable through dedicated opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BlockField {
  Coinbase,
  Timestamp,
  Number,
  PrevRandao,
  GasLimit,
  ChainId,
  BaseFee,
}

/// Named circuit inputs and outputs with a fixed meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReservedVariable {
  InitialMerkleRoot,
  ResultMerkleRoot,
  AddressMask,
  JubjubBaseX,
  JubjubBaseY,
  JubjubIdentityX,
  JubjubIdentityY,
  ContractAddress,
  FunctionSelector,
  TransactionNonce,
  TransactionInput(u8),
  PublicKeyX,
  PublicKeyY,
  RandomizerX,
  RandomizerY,
  SignatureScalar,
  Block(BlockField),
  BlockHash(U256),
}

impl ReservedVariable {
  pub fn buffer(self) -> BufferKind {
    use ReservedVariable::*;
    match self {
      ResultMerkleRoot => BufferKind::PublicOut,
      InitialMerkleRoot | AddressMask | JubjubBaseX | JubjubBaseY | JubjubIdentityX
      | JubjubIdentityY | ContractAddress | FunctionSelector | Block(_) | BlockHash(_) => {
        BufferKind::PublicIn
      }
      TransactionNonce | TransactionInput(_) | PublicKeyX | PublicKeyY | RandomizerX
      | RandomizerY | SignatureScalar => BufferKind::PrivateIn,
    }
  }

  pub fn bit_width(self) -> u16 {
    use ReservedVariable::*;
    match self {
      AddressMask | ContractAddress => 160,
      FunctionSelector => 32,
      TransactionNonce => 64,
      InitialMerkleRoot | ResultMerkleRoot | JubjubBaseX | JubjubBaseY | JubjubIdentityX
      | JubjubIdentityY | PublicKeyX | PublicKeyY | RandomizerX | RandomizerY => FIELD_BITS,
      Block(BlockField::Coinbase) => 160,
      Block(BlockField::Timestamp | BlockField::Number | BlockField::GasLimit) => 64,
      TransactionInput(_) | SignatureScalar | Block(_) | BlockHash(_) => WORD_BITS,
    }
  }
}

impl fmt::Display for ReservedVariable {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReservedVariable::TransactionInput(i) => write!(f, "TransactionInput{i}"),
      ReservedVariable::Block(field) => write!(f, "Block{field:?}"),
      ReservedVariable::BlockHash(number) => write!(f, "BlockHash({number})"),
      other => write!(f, "{other:?}"),
    }
  }
}

// ── Buffers ─────────────────────────────────────────────────────────

/// Why a slot was loaded; only constants may be dropped by the refactor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOrigin {
  Constant,
  Reserved,
  Labelled,
}

#[derive(Debug, Clone)]
pub struct BufferSlot {
  /// Wire on the circuit side: produced by an input buffer, consumed by an
  /// output buffer.
  pub internal: Wire,
  /// Wire on the outer side.
  pub external: Wire,
  pub origin: LoadOrigin,
}

#[derive(Debug, Clone)]
pub struct BoundaryBuffer {
  kind: BufferKind,
  slots: Vec<BufferSlot>,
}

impl BoundaryBuffer {
  fn new(kind: BufferKind) -> Self {
    Self { kind, slots: Vec::new() }
  }

  pub fn kind(&self) -> BufferKind {
    self.kind
  }

  pub fn slots(&self) -> &[BufferSlot] {
    &self.slots
  }

  pub fn len(&self) -> usize {
    self.slots.len()
  }

  pub fn is_empty(&self) -> bool {
    self.slots.is_empty()
  }
}

#[derive(Debug, Clone)]
pub struct BufferManager {
  buffers: [BoundaryBuffer; 4],
  constants: HashMap<U256, Wire>,
  reserved: BTreeMap<ReservedVariable, Wire>,
}

impl Default for BufferManager {
  fn default() -> Self {
    Self::new()
  }
}

impl BufferManager {
  pub fn new() -> Self {
    Self {
      buffers: BufferKind::ALL.map(BoundaryBuffer::new),
      constants: HashMap::new(),
      reserved: BTreeMap::new(),
    }
  }

  pub fn buffer(&self, kind: BufferKind) -> &BoundaryBuffer {
    &self.buffers[kind.placement_id()]
  }

  pub fn buffers(&self) -> &[BoundaryBuffer; 4] {
    &self.buffers
  }

  fn load(
    &mut self,
    kind: BufferKind,
    value: U256,
    bit_width: u16,
    description: Option<Arc<str>>,
    origin: LoadOrigin,
  ) -> Wire {
    debug_assert!(kind.is_input());
    let buffer = &mut self.buffers[kind.placement_id()];
    let index = buffer.slots.len();
    let external = Wire::new(
      Provenance::External { buffer: kind, index },
      value,
      bit_width,
      description.clone(),
    );
    let internal = Wire::new(
      Provenance::Placement { placement: kind.placement_id(), index },
      value,
      bit_width,
      description,
    );
    buffer.slots.push(BufferSlot { internal: internal.clone(), external, origin });
    internal
  }

  /// Public constant, deduplicated by value.
  pub fn constant(&mut self, value: U256) -> Wire {
    if let Some(wire) = self.constants.get(&value) {
      return wire.clone();
    }
    let wire = self.load(BufferKind::PublicIn, value, bit_length(value), None, LoadOrigin::Constant);
    self.constants.insert(value, wire.clone());
    wire
  }

  /// Public constant carrying its own description; never deduplicated.
  pub fn described_constant(
    &mut self,
    value: U256,
    bit_width: u16,
    description: impl Into<Arc<str>>,
  ) -> Wire {
    self.load(BufferKind::PublicIn, value, bit_width, Some(description.into()), LoadOrigin::Constant)
  }

  /// Fresh, externally tagged load that is not a constant of the program.
  pub fn labelled(
    &mut self,
    kind: BufferKind,
    value: U256,
    bit_width: u16,
    description: impl Into<Arc<str>>,
  ) -> Wire {
    self.load(kind, value, bit_width, Some(description.into()), LoadOrigin::Labelled)
  }

  /// Load a reserved input once; later requests get the cached wire.
  pub fn reserved(&mut self, variable: ReservedVariable, value: U256) -> Wire {
    if let Some(wire) = self.reserved.get(&variable) {
      return wire.clone();
    }
    let wire = self.load(
      variable.buffer(),
      value,
      variable.bit_width(),
      Some(variable.to_string().into()),
      LoadOrigin::Reserved,
    );
    self.reserved.insert(variable, wire.clone());
    wire
  }

  pub fn cached_reserved(&self, variable: ReservedVariable) -> Option<&Wire> {
    self.reserved.get(&variable)
  }

  /// Route `wire` out through an output buffer.
  pub fn export(&mut self, kind: BufferKind, wire: &Wire, description: impl Into<Arc<str>>) -> Wire {
    debug_assert!(!kind.is_input());
    let buffer = &mut self.buffers[kind.placement_id()];
    let index = buffer.slots.len();
    let external = Wire::new(
      Provenance::External { buffer: kind, index },
      wire.value(),
      wire.bit_width(),
      Some(description.into()),
    );
    buffer.slots.push(BufferSlot {
      internal: wire.clone(),
      external: external.clone(),
      origin: LoadOrigin::Labelled,
    });
    external
  }

  /// Export a reserved output such as the resulting Merkle root.
  pub fn export_reserved(&mut self, variable: ReservedVariable, wire: &Wire) -> Wire {
    let external = self.export(variable.buffer(), wire, variable.to_string());
    self.reserved.insert(variable, external.clone());
    external
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn loads_pair_external_and_internal_wires() {
    let mut buffers = BufferManager::new();
    let wire = buffers.labelled(BufferKind::PrivateIn, U256::from(5u64), 8, "five");
    let slot = &buffers.buffer(BufferKind::PrivateIn).slots()[0];
    assert!(slot.internal.same_as(&wire));
    assert_eq!(
      slot.external.provenance(),
      Provenance::External { buffer: BufferKind::PrivateIn, index: 0 }
    );
    assert_eq!(wire.provenance(), Provenance::Placement { placement: 3, index: 0 });
  }

  #[test]
  fn reserved_variables_are_cached() {
    let mut buffers = BufferManager::new();
    let a = buffers.reserved(ReservedVariable::AddressMask, U256::from(1u64));
    let b = buffers.reserved(ReservedVariable::AddressMask, U256::from(1u64));
    assert!(a.same_as(&b));
    assert_eq!(buffers.buffer(BufferKind::PublicIn).len(), 1);
  }
}
