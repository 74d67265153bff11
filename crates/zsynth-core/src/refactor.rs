//! Final pass over a synthesized circuit.
//!
//! Drops public constant loads nothing consumes, splits every wire wider
//! than a field element into 128-bit halves, checks the result against the
//! catalog's limits and freezes it into the artifact handed to circuit
//! flattening.

use std::collections::{HashMap, HashSet};

use revm::primitives::U256;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::buffer::{BufferSlot, LoadOrigin};
use crate::error::{Result, SynthError};
use crate::synthesizer::SynthesizedCircuit;
use crate::wire::{BufferKind, FIELD_BITS, Provenance, Wire};

/// Width of each half of a split wire.
pub const HALF_BITS: u16 = 128;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenWire {
  /// Producing placement.
  pub placement: usize,
  /// Output index on the producing placement, after splitting.
  pub index: usize,
  #[serde(with = "crate::hex::word")]
  pub value: U256,
  pub bits: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenPlacement {
  pub id: usize,
  pub template_id: usize,
  pub template: String,
  pub operation: String,
  pub inputs: Vec<FrozenWire>,
  pub outputs: Vec<FrozenWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenSlot {
  pub description: Option<String>,
  /// Circuit-side wires of the slot, one or two after splitting.
  pub wires: Vec<FrozenWire>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenBuffer {
  pub name: String,
  pub placement: usize,
  pub template_id: usize,
  pub slots: Vec<FrozenSlot>,
}

impl FrozenBuffer {
  /// Wire count after splitting, the figure checked against capacity.
  pub fn width(&self) -> usize {
    self.slots.iter().map(|slot| slot.wires.len()).sum()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrozenCircuit {
  pub catalog_version: String,
  pub buffers: Vec<FrozenBuffer>,
  pub placements: Vec<FrozenPlacement>,
}

impl FrozenCircuit {
  pub fn to_json(&self) -> Result<String> {
    Ok(serde_json::to_string_pretty(self)?)
  }

  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn buffer(&self, kind: BufferKind) -> Option<&FrozenBuffer> {
    self.buffers.iter().find(|buffer| buffer.placement == kind.placement_id())
  }

  /// Placements including the four buffers.
  pub fn placement_count(&self) -> usize {
    self.buffers.len() + self.placements.len()
  }
}

/// `(low, high)` halves of a wide value.
fn halves(value: U256) -> (U256, U256) {
  let mask = (U256::from(1u64) << HALF_BITS as usize) - U256::from(1u64);
  (value & mask, value >> HALF_BITS as usize)
}

fn split(placement: usize, first_index: usize, wire: &Wire) -> Vec<FrozenWire> {
  if wire.bit_width() <= FIELD_BITS {
    return vec![FrozenWire { placement, index: first_index, value: wire.value(), bits: wire.bit_width() }];
  }
  let (low, high) = halves(wire.value());
  vec![
    FrozenWire { placement, index: first_index, value: low, bits: HALF_BITS },
    FrozenWire { placement, index: first_index + 1, value: high, bits: HALF_BITS },
  ]
}

/// Renumbers wires as slots are dropped and wires split.
#[derive(Default)]
struct WireMap {
  produced: HashMap<Provenance, Vec<FrozenWire>>,
}

impl WireMap {
  /// Register the outputs of `placement` and return their frozen form.
  fn produce<'w>(&mut self, placement: usize, wires: impl Iterator<Item = &'w Wire>) -> Vec<FrozenWire> {
    let mut frozen = Vec::new();
    for wire in wires {
      let parts = split(placement, frozen.len(), wire);
      frozen.extend(parts.iter().cloned());
      self.produced.insert(wire.provenance(), parts);
    }
    frozen
  }

  fn consume(&self, wires: &[Wire]) -> Result<Vec<FrozenWire>> {
    let mut frozen = Vec::new();
    for wire in wires {
      let parts = self.produced.get(&wire.provenance()).ok_or_else(|| {
        SynthError::consistency(format!("wire {:?} is consumed but never produced", wire.provenance()))
      })?;
      frozen.extend(parts.iter().cloned());
    }
    Ok(frozen)
  }
}

/// Run the refactor pass and validate against the circuit's catalog.
#[instrument(skip_all, fields(placements = circuit.graph.len()))]
pub fn freeze(circuit: &SynthesizedCircuit) -> Result<FrozenCircuit> {
  let catalog = &circuit.catalog;

  // Everything a placement or an output buffer consumes.
  let mut consumed: HashSet<Provenance> = HashSet::new();
  for (_, entry) in circuit.graph.iter() {
    consumed.extend(entry.inputs.iter().map(Wire::provenance));
  }
  for kind in [BufferKind::PublicOut, BufferKind::PrivateOut] {
    consumed.extend(circuit.buffers.buffer(kind).slots().iter().map(|slot| slot.internal.provenance()));
  }
  let keep = |kind: BufferKind, slot: &BufferSlot| {
    kind != BufferKind::PublicIn
      || slot.origin != LoadOrigin::Constant
      || consumed.contains(&slot.internal.provenance())
  };

  let mut map = WireMap::default();
  let mut buffers = Vec::with_capacity(BufferKind::ALL.len());
  let mut dropped = 0usize;
  for kind in [BufferKind::PublicIn, BufferKind::PrivateIn] {
    let placement = kind.placement_id();
    let mut slots = Vec::new();
    for slot in circuit.buffers.buffer(kind).slots() {
      if !keep(kind, slot) {
        dropped += 1;
        continue;
      }
      let first = slots.iter().map(|s: &FrozenSlot| s.wires.len()).sum();
      let wires = split(placement, first, &slot.internal);
      map.produced.insert(slot.internal.provenance(), wires.clone());
      slots.push(FrozenSlot { description: slot.internal.description().map(str::to_string), wires });
    }
    buffers.push(FrozenBuffer {
      name: kind.name().to_string(),
      placement,
      template_id: catalog.template_id(template_name(kind))?,
      slots,
    });
  }

  let mut placements = Vec::with_capacity(circuit.graph.len());
  for (id, entry) in circuit.graph.iter() {
    let inputs = map.consume(&entry.inputs)?;
    let outputs = map.produce(id, entry.outputs.iter());
    placements.push(FrozenPlacement {
      id,
      template_id: entry.template_id,
      template: entry.template.to_string(),
      operation: entry.operation.name().to_string(),
      inputs,
      outputs,
    });
  }

  for kind in [BufferKind::PublicOut, BufferKind::PrivateOut] {
    let slots = circuit
      .buffers
      .buffer(kind)
      .slots()
      .iter()
      .map(|slot| {
        Ok(FrozenSlot {
          description: slot.external.description().map(str::to_string),
          wires: map.consume(std::slice::from_ref(&slot.internal))?,
        })
      })
      .collect::<Result<Vec<_>>>()?;
    buffers.push(FrozenBuffer {
      name: kind.name().to_string(),
      placement: kind.placement_id(),
      template_id: catalog.template_id(template_name(kind))?,
      slots,
    });
  }
  buffers.sort_by_key(|buffer| buffer.placement);

  let frozen = FrozenCircuit { catalog_version: catalog.version().to_string(), buffers, placements };
  for kind in BufferKind::ALL {
    let required = frozen.buffer(kind).map_or(0, FrozenBuffer::width);
    let available = catalog.capacity(kind);
    if required > available {
      return Err(SynthError::Capacity { buffer: kind.name().to_string(), required, available });
    }
  }
  if frozen.placement_count() > catalog.max_placements() {
    return Err(SynthError::Capacity {
      buffer: "placements".to_string(),
      required: frozen.placement_count(),
      available: catalog.max_placements(),
    });
  }
  debug!(dropped, placements = frozen.placement_count(), "circuit frozen");
  Ok(frozen)
}

fn template_name(kind: BufferKind) -> &'static str {
  match kind {
    BufferKind::PublicOut => "bufferPubOut",
    BufferKind::PublicIn => "bufferPubIn",
    BufferKind::PrivateOut => "bufferPrvOut",
    BufferKind::PrivateIn => "bufferPrvIn",
  }
}
