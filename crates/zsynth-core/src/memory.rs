//! Alias-aware symbolic memory.
//!
//! Memory is a list of records in write order. A record claims the bytes it
//! covers; later records shadow earlier ones byte by byte. Reads resolve a
//! byte range into the records that still own part of it and, when a record
//! is only partly visible, extract the visible part with shift and mask
//! placements. Bytes owned by no record read as the constant zero.

use itertools::Itertools;
use revm::primitives::U256;

use crate::arith::Operation;
use crate::error::{Result, SynthError};
use crate::gadget::CircuitBuilder;
use crate::wire::Wire;

/// Largest container a record may hold.
pub const WORD_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct MemoryRecord {
  pub offset: usize,
  pub size: usize,
  pub wire: Wire,
}

impl MemoryRecord {
  pub fn end(&self) -> usize {
    self.offset + self.size
  }

  /// Byte at absolute address `address`, which must lie inside the record.
  fn byte_at(&self, address: usize) -> u8 {
    self.wire.value().byte(self.end() - 1 - address)
  }
}

/// One record's surviving share of a resolved range.
#[derive(Debug, Clone)]
pub struct AliasFragment {
  pub record: MemoryRecord,
  /// Absolute addresses owned by the record, ascending.
  pub owned: Vec<usize>,
}

impl AliasFragment {
  fn covers_whole_record(&self) -> bool {
    self.owned.len() == self.record.size
  }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryAliasModel {
  records: Vec<MemoryRecord>,
}

impl MemoryAliasModel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn records(&self) -> &[MemoryRecord] {
    &self.records
  }

  /// Record `wire` over `[offset, offset + size)`. Records left without a
  /// visible byte are dropped.
  pub fn write(&mut self, offset: usize, size: usize, wire: Wire) -> Result<()> {
    if size == 0 || size > WORD_BYTES {
      return Err(SynthError::consistency(format!("memory container of {size} bytes")));
    }
    if wire.value().bit_len() > size * 8 {
      return Err(SynthError::consistency(format!(
        "value {:#x} does not fit a {size}-byte container",
        wire.value()
      )));
    }
    self.records.push(MemoryRecord { offset, size, wire });
    self.prune();
    Ok(())
  }

  /// Drop every record whose bytes are all shadowed by later records, so
  /// each surviving record owns at least one byte.
  fn prune(&mut self) {
    let mut shadow: Vec<(usize, usize)> = Vec::new();
    let mut visible = vec![true; self.records.len()];
    for (index, record) in self.records.iter().enumerate().rev() {
      let (start, end) = (record.offset, record.end());
      if shadow.iter().any(|&(lo, hi)| lo <= start && end <= hi) {
        visible[index] = false;
      } else {
        add_span(&mut shadow, start, end);
      }
    }
    let mut visible = visible.into_iter();
    self.records.retain(|_| visible.next().unwrap_or(true));
  }

  pub fn write_all(&mut self, records: Vec<MemoryRecord>) -> Result<()> {
    for record in records {
      self.write(record.offset, record.size, record.wire)?;
    }
    Ok(())
  }

  /// Records still owning bytes of `[offset, offset + length)`, oldest first.
  /// Addresses at or past `bound` are treated as unowned.
  pub fn resolve(&self, offset: usize, length: usize, bound: usize) -> Vec<AliasFragment> {
    let end = (offset + length).min(bound.max(offset));
    let mut owner: Vec<Option<usize>> = vec![None; end - offset];
    for (index, record) in self.records.iter().enumerate() {
      let lo = record.offset.max(offset);
      let hi = record.end().min(end);
      for address in lo..hi {
        owner[address - offset] = Some(index);
      }
    }
    let mut owned: Vec<Vec<usize>> = vec![Vec::new(); self.records.len()];
    for (i, slot) in owner.iter().enumerate() {
      if let Some(index) = slot {
        owned[*index].push(offset + i);
      }
    }
    owned
      .into_iter()
      .enumerate()
      .filter(|(_, addresses)| !addresses.is_empty())
      .map(|(index, owned)| AliasFragment { record: self.records[index].clone(), owned })
      .collect()
  }

  /// Flat bytes of `[offset, offset + length)` as simulated from the records.
  pub fn simulate(&self, offset: usize, length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    for fragment in self.resolve(offset, length, usize::MAX) {
      for address in &fragment.owned {
        bytes[address - offset] = fragment.record.byte_at(*address);
      }
    }
    bytes
  }

  /// Compare the simulated range against concrete memory, which reads as
  /// zero past its end.
  pub fn check_against(&self, offset: usize, length: usize, concrete: &[u8]) -> Result<()> {
    let symbolic = self.simulate(offset, length);
    let actual: Vec<u8> =
      (offset..offset + length).map(|address| concrete.get(address).copied().unwrap_or(0)).collect();
    if symbolic == actual {
      return Ok(());
    }
    Err(SynthError::MemoryMismatch {
      location: None,
      offset,
      length,
      symbolic: hex_string(&symbolic),
      concrete: hex_string(&actual),
    })
  }
}

/// Merge `[start, end)` into a set of disjoint spans.
fn add_span(spans: &mut Vec<(usize, usize)>, mut start: usize, mut end: usize) {
  spans.retain(|&(lo, hi)| {
    if hi < start || lo > end {
      return true;
    }
    start = start.min(lo);
    end = end.max(hi);
    false
  });
  spans.push((start, end));
}

fn hex_string(bytes: &[u8]) -> String {
  bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Mask with `0xff` at each address of `owned` inside a view ending at `view_end`.
fn byte_mask(owned: &[usize], view_end: usize) -> U256 {
  owned.iter().fold(U256::ZERO, |mask, address| {
    mask | (U256::from(0xffu64) << (8 * (view_end - 1 - address)))
  })
}

/// Low `bytes` bytes set.
fn low_mask(bytes: usize) -> U256 {
  if bytes >= WORD_BYTES { U256::MAX } else { (U256::from(1u64) << (8 * bytes)) - U256::from(1u64) }
}

// ============================================================
// Windows
// ============================================================

/// A byte range of some frame's memory, frozen when it was captured and
/// resolved lazily on each read. Calldata and return data are windows.
#[derive(Debug, Clone, Default)]
pub struct MemoryWindow {
  model: MemoryAliasModel,
  offset: usize,
  length: usize,
}

impl MemoryWindow {
  pub fn capture(model: &MemoryAliasModel, offset: usize, length: usize) -> Self {
    Self { model: model.clone(), offset, length }
  }

  /// A window over records laid out from address zero.
  pub fn from_records(records: Vec<MemoryRecord>, length: usize) -> Result<Self> {
    let mut model = MemoryAliasModel::new();
    model.write_all(records)?;
    Ok(Self { model, offset: 0, length })
  }

  pub fn len(&self) -> usize {
    self.length
  }

  pub fn is_empty(&self) -> bool {
    self.length == 0
  }

  fn base(&self, offset: usize) -> usize {
    self.offset.saturating_add(offset)
  }

  fn bound(&self) -> usize {
    self.offset + self.length
  }

  /// Word of `length` bytes at window offset `offset`; bytes past the window
  /// read as zero.
  pub fn load(&self, builder: &mut CircuitBuilder, offset: usize, length: usize) -> Result<Wire> {
    if offset >= self.length {
      return Ok(builder.zero());
    }
    load_word(builder, &self.model, self.base(offset), length, self.bound())
  }

  /// Records reproducing window bytes `[offset, offset + length)` at
  /// `destination`.
  pub fn copy(
    &self,
    builder: &mut CircuitBuilder,
    offset: usize,
    length: usize,
    destination: usize,
  ) -> Result<Vec<MemoryRecord>> {
    if offset >= self.length {
      return zero_records(builder, destination, length);
    }
    copy_region(builder, &self.model, self.base(offset), length, self.bound(), destination)
  }

  /// Simulated window bytes, for consistency checks.
  pub fn simulate(&self, offset: usize, length: usize) -> Vec<u8> {
    let visible = length.min(self.length.saturating_sub(offset));
    let mut bytes = self.model.simulate(self.base(offset), visible);
    bytes.resize(length, 0);
    bytes
  }
}

// ============================================================
// Placement-emitting reads
// ============================================================

/// Reconstruct `[offset, offset + length)` (at most one word) as a single
/// wire holding the bytes big-endian.
pub fn load_word(
  builder: &mut CircuitBuilder,
  model: &MemoryAliasModel,
  offset: usize,
  length: usize,
  bound: usize,
) -> Result<Wire> {
  if length == 0 || length > WORD_BYTES {
    return Err(SynthError::consistency(format!("cannot load {length} bytes as one word")));
  }
  let view_end = offset + length;
  let fragments = model.resolve(offset, length, bound);
  let mut slices = Vec::with_capacity(fragments.len());
  for fragment in fragments {
    let mut wire = fragment.record.wire.clone();
    let record_end = fragment.record.end();
    if view_end > record_end {
      let shift = builder.constant(U256::from(8 * (view_end - record_end)));
      wire = builder.place_one(Operation::Shl, &[shift, wire])?;
    } else if record_end > view_end {
      let shift = builder.constant(U256::from(8 * (record_end - view_end)));
      wire = builder.place_one(Operation::Shr, &[shift, wire])?;
    }
    if !fragment.covers_whole_record() {
      let mask = builder.constant(byte_mask(&fragment.owned, view_end));
      wire = builder.place_one(Operation::And, &[mask, wire])?;
    }
    slices.push(wire);
  }
  builder.accumulate(slices)
}

/// Records that place the bytes of `[offset, offset + length)` at
/// `destination`. Each contiguous run a record still owns becomes one record;
/// unowned runs become zero records of at most one word.
pub fn copy_region(
  builder: &mut CircuitBuilder,
  model: &MemoryAliasModel,
  offset: usize,
  length: usize,
  bound: usize,
  destination: usize,
) -> Result<Vec<MemoryRecord>> {
  let mut records = Vec::new();
  let mut covered = vec![false; length];
  for fragment in model.resolve(offset, length, bound) {
    for address in &fragment.owned {
      covered[address - offset] = true;
    }
    let record_end = fragment.record.end();
    let runs = fragment.owned.iter().copied().enumerate().chunk_by(|(i, address)| address - i);
    for (_, run) in &runs {
      let run: Vec<usize> = run.map(|(_, address)| address).collect();
      let (first, last) = (run[0], run[run.len() - 1]);
      let mut wire = fragment.record.wire.clone();
      let dropped_low = record_end - (last + 1);
      if dropped_low > 0 {
        let shift = builder.constant(U256::from(8 * dropped_low));
        wire = builder.place_one(Operation::Shr, &[shift, wire])?;
      }
      if first > fragment.record.offset {
        let mask = builder.constant(low_mask(run.len()));
        wire = builder.place_one(Operation::And, &[mask, wire])?;
      }
      records.push(MemoryRecord { offset: destination + (first - offset), size: run.len(), wire });
    }
  }
  let gaps = covered.iter().enumerate().filter(|(_, c)| !**c).map(|(i, _)| i);
  for (_, run) in &gaps.enumerate().chunk_by(|(n, i)| i - n) {
    let run: Vec<usize> = run.map(|(_, i)| i).collect();
    for chunk in run.chunks(WORD_BYTES) {
      let zero = builder.zero();
      records.push(MemoryRecord { offset: destination + chunk[0], size: chunk.len(), wire: zero });
    }
  }
  records.sort_by_key(|record| record.offset);
  Ok(records)
}

/// Zero records covering `[destination, destination + length)`.
pub fn zero_records(
  builder: &mut CircuitBuilder,
  destination: usize,
  length: usize,
) -> Result<Vec<MemoryRecord>> {
  let zero = builder.zero();
  Ok(
    (0..length)
      .step_by(WORD_BYTES)
      .map(|start| MemoryRecord {
        offset: destination + start,
        size: WORD_BYTES.min(length - start),
        wire: zero.clone(),
      })
      .collect(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::SynthesizerOptions;

  fn builder() -> CircuitBuilder {
    CircuitBuilder::new(&SynthesizerOptions::default())
  }

  #[test]
  fn covered_records_are_dropped() {
    let mut b = builder();
    let mut model = MemoryAliasModel::new();
    let small = b.constant(U256::from(0xaau64));
    let word = b.constant(U256::from(0x1234u64));
    model.write(40, 1, small).expect("write byte");
    model.write(32, 32, word).expect("write word");
    assert_eq!(model.records().len(), 1);
  }

  #[test]
  fn records_shadowed_piecewise_are_dropped() {
    let mut b = builder();
    let mut model = MemoryAliasModel::new();
    for round in 0..50u64 {
      let middle = b.constant(U256::from(round));
      let low = b.constant(U256::from(round + 1));
      let high = b.constant(U256::from(round + 2));
      model.write(8, 32, middle).expect("write middle");
      model.write(0, 32, low).expect("write low");
      model.write(32, 32, high).expect("write high");
      assert_eq!(model.records().len(), 2);
    }
    assert_eq!(model.simulate(63, 1), vec![51]);
  }

  #[test]
  fn aligned_read_reuses_the_stored_wire() {
    let mut b = builder();
    let mut model = MemoryAliasModel::new();
    let word = b.constant(U256::from(0xdeadu64));
    model.write(0, 32, word.clone()).expect("write");
    let read = load_word(&mut b, &model, 0, 32, usize::MAX).expect("read");
    assert!(read.same_as(&word));
    assert!(b.graph().is_empty());
  }

  #[test]
  fn split_read_extracts_and_accumulates() {
    let mut b = builder();
    let mut model = MemoryAliasModel::new();
    let hi = b.constant(U256::from(0x11u64));
    let lo = b.constant(U256::from(0x22u64));
    model.write(0, 32, hi).expect("write hi");
    model.write(32, 32, lo).expect("write lo");
    let read = load_word(&mut b, &model, 16, 32, usize::MAX).expect("read");
    assert_eq!(read.value(), U256::from(0x11u64) << 128);
    assert_eq!(b.graph().count_template("Accumulator"), 1);
  }
}
