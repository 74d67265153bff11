//! Gadget manager: turns operations into placements.
//!
//! [`CircuitBuilder`] owns the placement graph and the buffers of one
//! transaction. Each `place_*` call simulates the gadget on the input wires'
//! values, appends the placement and hands back the output wires.

use std::sync::Arc;

use revm::primitives::U256;
use tracing::trace;

use crate::arith::{Operation, execute};
use crate::buffer::{BufferManager, ReservedVariable};
use crate::catalog::SubcircuitCatalog;
use crate::config::SynthesizerOptions;
use crate::error::{Result, SynthError};
use crate::jubjub::JubjubPoint;
use crate::placement::{PlacementEntry, PlacementGraph};
use crate::poseidon::POSEIDON_INPUTS;
use crate::wire::{Provenance, WORD_BITS, Wire};

/// Bit width of ALU selector wires.
const SELECTOR_BITS: u16 = 128;

/// A point as a pair of coordinate wires.
#[derive(Debug, Clone)]
pub struct PointWires {
  pub x: Wire,
  pub y: Wire,
}

impl PointWires {
  pub fn value(&self) -> JubjubPoint {
    JubjubPoint { x: self.x.value(), y: self.y.value() }
  }
}

#[derive(Debug, Clone)]
pub struct CircuitBuilder {
  catalog: Arc<SubcircuitCatalog>,
  exp_batch_bits: usize,
  jubjub_batch_bits: usize,
  accumulator_inputs: usize,
  pub(crate) graph: PlacementGraph,
  pub(crate) buffers: BufferManager,
}

impl CircuitBuilder {
  pub fn new(options: &SynthesizerOptions) -> Self {
    Self {
      catalog: options.catalog.clone(),
      exp_batch_bits: options.exp_batch_bits,
      jubjub_batch_bits: options.jubjub_batch_bits,
      accumulator_inputs: options.accumulator_inputs,
      graph: PlacementGraph::new(),
      buffers: BufferManager::new(),
    }
  }

  pub fn graph(&self) -> &PlacementGraph {
    &self.graph
  }

  pub fn buffers(&self) -> &BufferManager {
    &self.buffers
  }

  pub fn buffers_mut(&mut self) -> &mut BufferManager {
    &mut self.buffers
  }

  pub fn catalog(&self) -> &SubcircuitCatalog {
    &self.catalog
  }

  pub fn into_parts(self) -> (PlacementGraph, BufferManager) {
    (self.graph, self.buffers)
  }

  /// Shorthand for a deduplicated public constant.
  pub fn constant(&mut self, value: U256) -> Wire {
    self.buffers.constant(value)
  }

  pub fn zero(&mut self) -> Wire {
    self.buffers.constant(U256::ZERO)
  }

  // ── Single placements ─────────────────────────────────────────────

  /// Place one gadget and return its outputs.
  pub fn place(&mut self, operation: Operation, inputs: &[Wire]) -> Result<Vec<Wire>> {
    let values: Vec<U256> = inputs.iter().map(Wire::value).collect();
    if operation.has_byte_operand() && values.first().is_some_and(|v| *v > U256::from(255u64)) {
      return Err(SynthError::unsupported(format!(
        "{operation} operand {:#x} exceeds the 255 limit of {}",
        values[0],
        operation.template().0
      )));
    }
    let outputs = execute(operation, &values).map_err(|fault| SynthError::Gadget {
      location: None,
      operation: operation.name(),
      fault,
    })?;

    let (template, _) = operation.template();
    let template_id = self.catalog.template_id(template)?;
    let mut placed_inputs = Vec::with_capacity(inputs.len() + 1);
    if let Some(selector) = operation.selector() {
      placed_inputs.push(self.buffers.described_constant(
        selector,
        SELECTOR_BITS,
        format!("{template} selector for {operation}"),
      ));
    }
    placed_inputs.extend_from_slice(inputs);

    let id = self.graph.next_id();
    let bits = operation.output_bits();
    let outputs: Vec<Wire> = outputs
      .into_iter()
      .enumerate()
      .map(|(index, value)| Wire::new(Provenance::Placement { placement: id, index }, value, bits, None))
      .collect();
    trace!(placement = id, %operation, inputs = placed_inputs.len(), "place");
    self.graph.push(PlacementEntry {
      template_id,
      template,
      operation,
      inputs: placed_inputs,
      outputs: outputs.clone(),
    });
    Ok(outputs)
  }

  /// Place a gadget with exactly one output.
  pub fn place_one(&mut self, operation: Operation, inputs: &[Wire]) -> Result<Wire> {
    self.place(operation, inputs)?.into_iter().next().ok_or_else(|| {
      SynthError::consistency(format!("{operation} produced no output wire"))
    })
  }

  /// Sum `terms` with as few `Accumulator` placements as the input limit
  /// allows. A single term is returned unchanged.
  pub fn accumulate(&mut self, terms: Vec<Wire>) -> Result<Wire> {
    let mut layer = terms;
    loop {
      match layer.len() {
        0 => return Ok(self.zero()),
        1 => return Ok(layer.remove(0)),
        _ => {
          let mut next = Vec::with_capacity(layer.len().div_ceil(self.accumulator_inputs));
          for chunk in layer.chunks(self.accumulator_inputs) {
            next.push(if chunk.len() == 1 {
              chunk[0].clone()
            } else {
              self.place_one(Operation::Accumulator, chunk)?
            });
          }
          layer = next;
        }
      }
    }
  }

  // ── Decompositions ────────────────────────────────────────────────

  /// `base ^ exponent mod 2^256` as `DecToBit` followed by a ladder of
  /// `SubExpBatch` rows covering all 256 exponent bits, whatever the
  /// exponent's value or declared width.
  pub fn place_exp(&mut self, base: &Wire, exponent: &Wire) -> Result<Wire> {
    let bits = self.place(Operation::DecToBit, std::slice::from_ref(exponent))?;
    let rows = usize::from(WORD_BITS).div_ceil(self.exp_batch_bits);
    if bits.len() < rows * self.exp_batch_bits {
      return Err(SynthError::consistency(format!("DecToBit produced only {} bits", bits.len())));
    }
    let mut acc = self.constant(U256::from(1u64));
    let mut power = base.clone();
    for row in 0..rows {
      let start = row * self.exp_batch_bits;
      let mut inputs = Vec::with_capacity(2 + self.exp_batch_bits);
      inputs.push(acc);
      inputs.push(power);
      inputs.extend_from_slice(&bits[start..start + self.exp_batch_bits]);
      let mut outputs = self.place(Operation::SubExpBatch, &inputs)?.into_iter();
      acc = outputs.next().ok_or_else(|| SynthError::consistency("SubExpBatch lost its accumulator"))?;
      power = outputs.next().ok_or_else(|| SynthError::consistency("SubExpBatch lost its base"))?;
    }
    Ok(acc)
  }

  /// Hash any number of words by folding zero-padded groups of four.
  pub fn place_poseidon(&mut self, words: &[Wire]) -> Result<Wire> {
    let mut layer: Vec<Wire> = if words.is_empty() { vec![self.zero()] } else { words.to_vec() };
    loop {
      let mut next = Vec::with_capacity(layer.len().div_ceil(POSEIDON_INPUTS));
      for chunk in layer.chunks(POSEIDON_INPUTS) {
        let mut group = chunk.to_vec();
        while group.len() < POSEIDON_INPUTS {
          group.push(self.zero());
        }
        next.push(self.place_one(Operation::Poseidon, &group)?);
      }
      if next.len() == 1 {
        return Ok(next.remove(0));
      }
      layer = next;
    }
  }

  /// `scalar · base` for 256 scalar bits (LSB first) as a fixed ladder of
  /// `JubjubExpBatch` rows starting from the identity.
  pub fn place_jubjub_mul(&mut self, base: &PointWires, bits: &[Wire]) -> Result<PointWires> {
    let identity = JubjubPoint::identity();
    let mut partial = PointWires {
      x: self.buffers.reserved(ReservedVariable::JubjubIdentityX, identity.x),
      y: self.buffers.reserved(ReservedVariable::JubjubIdentityY, identity.y),
    };
    let mut running = base.clone();
    for chunk in bits.chunks(self.jubjub_batch_bits) {
      let mut inputs = Vec::with_capacity(4 + chunk.len());
      inputs.extend([partial.x, partial.y, running.x, running.y]);
      inputs.extend_from_slice(chunk);
      let outputs = self.place(Operation::JubjubExpBatch, &inputs)?;
      let [px, py, gx, gy]: [Wire; 4] = outputs
        .try_into()
        .map_err(|_| SynthError::consistency("JubjubExpBatch must output two points"))?;
      partial = PointWires { x: px, y: py };
      running = PointWires { x: gx, y: gy };
    }
    Ok(partial)
  }
}
