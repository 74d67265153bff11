//! Wires: immutable value-carrying edges of the placement graph.

use std::fmt;
use std::sync::Arc;

use revm::primitives::U256;

/// Bit width given to every 256-bit EVM word.
pub const WORD_BITS: u16 = 256;
/// Bit width of field-element outputs (hash digests, curve coordinates).
pub const FIELD_BITS: u16 = 255;

// ============================================================
// Boundary buffers
// ============================================================

/// The four boundary pools. Their discriminant is the placement id the buffer
/// occupies at the head of the placement graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BufferKind {
  PublicOut = 0,
  PublicIn = 1,
  PrivateOut = 2,
  PrivateIn = 3,
}

impl BufferKind {
  pub const ALL: [BufferKind; 4] =
    [BufferKind::PublicOut, BufferKind::PublicIn, BufferKind::PrivateOut, BufferKind::PrivateIn];

  pub const fn placement_id(self) -> usize {
    self as usize
  }

  pub const fn is_input(self) -> bool {
    matches!(self, BufferKind::PublicIn | BufferKind::PrivateIn)
  }

  pub const fn name(self) -> &'static str {
    match self {
      BufferKind::PublicOut => "PublicOut",
      BufferKind::PublicIn => "PublicIn",
      BufferKind::PrivateOut => "PrivateOut",
      BufferKind::PrivateIn => "PrivateIn",
    }
  }
}

impl fmt::Display for BufferKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// Placement id of the first non-buffer placement.
pub const FIRST_ARITHMETIC_PLACEMENT: usize = BufferKind::ALL.len();

// ============================================================
// Wire
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provenance {
  /// Output `index` of placement `placement` (buffers included).
  Placement { placement: usize, index: usize },
  /// Slot `index` on the outer side of a boundary buffer.
  External { buffer: BufferKind, index: usize },
}

impl Provenance {
  /// Placement that must exist before this wire can be consumed.
  pub fn source_placement(&self) -> usize {
    match *self {
      Provenance::Placement { placement, .. } => placement,
      Provenance::External { buffer, .. } => buffer.placement_id(),
    }
  }
}

/// A symbolic value. The carried value is only used for consistency checks
/// against the concrete machine; identity is the provenance alone.
#[derive(Debug, Clone)]
pub struct Wire {
  provenance: Provenance,
  value: U256,
  bit_width: u16,
  description: Option<Arc<str>>,
}

impl Wire {
  pub(crate) fn new(
    provenance: Provenance,
    value: U256,
    bit_width: u16,
    description: Option<Arc<str>>,
  ) -> Self {
    Self { provenance, value, bit_width, description }
  }

  pub fn provenance(&self) -> Provenance {
    self.provenance
  }

  pub fn value(&self) -> U256 {
    self.value
  }

  pub fn bit_width(&self) -> u16 {
    self.bit_width
  }

  pub fn description(&self) -> Option<&str> {
    self.description.as_deref()
  }

  /// Same circuit wire, regardless of how the handle was obtained.
  pub fn same_as(&self, other: &Wire) -> bool {
    self.provenance == other.provenance
  }
}

impl PartialEq for Wire {
  fn eq(&self, other: &Self) -> bool {
    self.same_as(other)
  }
}

impl Eq for Wire {}

/// Bit length of `value`, at least one.
pub fn bit_length(value: U256) -> u16 {
  value.bit_len().max(1) as u16
}
