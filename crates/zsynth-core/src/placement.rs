//! Append-only placement graph. Insertion order is circuit row order.

use crate::arith::Operation;
use crate::wire::{FIRST_ARITHMETIC_PLACEMENT, Wire};

/// One instantiated subcircuit template.
#[derive(Debug, Clone)]
pub struct PlacementEntry {
  pub template_id: usize,
  pub template: &'static str,
  pub operation: Operation,
  pub inputs: Vec<Wire>,
  pub outputs: Vec<Wire>,
}

#[derive(Debug, Clone, Default)]
pub struct PlacementGraph {
  entries: Vec<PlacementEntry>,
}

impl PlacementGraph {
  pub fn new() -> Self {
    Self::default()
  }

  /// Id the next pushed placement will receive.
  pub fn next_id(&self) -> usize {
    FIRST_ARITHMETIC_PLACEMENT + self.entries.len()
  }

  pub(crate) fn push(&mut self, entry: PlacementEntry) -> usize {
    let id = self.next_id();
    debug_assert!(
      entry.inputs.iter().all(|wire| wire.provenance().source_placement() < id),
      "placement {id} consumes a wire produced later"
    );
    self.entries.push(entry);
    id
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Entry with placement id `id`; buffers are not stored here.
  pub fn get(&self, id: usize) -> Option<&PlacementEntry> {
    id.checked_sub(FIRST_ARITHMETIC_PLACEMENT).and_then(|i| self.entries.get(i))
  }

  /// `(placement id, entry)` pairs in row order.
  pub fn iter(&self) -> impl Iterator<Item = (usize, &PlacementEntry)> + '_ {
    self.entries.iter().enumerate().map(|(i, entry)| (FIRST_ARITHMETIC_PLACEMENT + i, entry))
  }

  /// Template names in row order, the "shape" of the circuit.
  pub fn shape(&self) -> Vec<&'static str> {
    self.entries.iter().map(|entry| entry.template).collect()
  }

  pub fn count_template(&self, template: &str) -> usize {
    self.entries.iter().filter(|entry| entry.template == template).count()
  }
}
