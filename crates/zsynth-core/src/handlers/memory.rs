//! Memory, copy, hashing, logging and frame-output instructions.

use revm::primitives::{U256, keccak256};

use super::StepContext;
use crate::arith::Operation;
use crate::error::{Result, SynthError};
use crate::memory::{MemoryRecord, MemoryWindow, WORD_BYTES, copy_region, load_word};
use crate::wire::BufferKind;

/// Operand `depth` as an offset that only matters when `length` is non-zero.
fn offset_for(ctx: &StepContext<'_>, depth: usize, length: usize) -> Result<usize> {
  if length == 0 { Ok(0) } else { ctx.arg(depth) }
}

pub(super) fn mload(ctx: &mut StepContext<'_>) -> Result<()> {
  ctx.operands(1)?;
  let offset = ctx.arg(0)?;
  let wire = load_word(ctx.builder, &ctx.frame.memory, offset, WORD_BYTES, usize::MAX)?;
  ctx.push(wire)
}

pub(super) fn mstore(ctx: &mut StepContext<'_>) -> Result<()> {
  let mut operands = ctx.operands(2)?;
  let offset = ctx.arg(0)?;
  let value = operands.remove(1);
  ctx.frame.memory.write(offset, WORD_BYTES, value)?;
  ctx.check_memory(offset, WORD_BYTES)
}

pub(super) fn mstore8(ctx: &mut StepContext<'_>) -> Result<()> {
  let mut operands = ctx.operands(2)?;
  let offset = ctx.arg(0)?;
  let mut value = operands.remove(1);
  if value.bit_width() > 8 {
    let mask = ctx.builder.constant(U256::from(0xffu64));
    value = ctx.builder.place_one(Operation::And, &[mask, value])?;
  }
  ctx.frame.memory.write(offset, 1, value)?;
  ctx.check_memory(offset, 1)
}

pub(super) fn mcopy(ctx: &mut StepContext<'_>) -> Result<()> {
  ctx.operands(3)?;
  let length = ctx.arg(2)?;
  if length == 0 {
    return Ok(());
  }
  let (destination, source) = (ctx.arg(0)?, ctx.arg(1)?);
  let records = copy_region(ctx.builder, &ctx.frame.memory, source, length, usize::MAX, destination)?;
  ctx.frame.memory.write_all(records)?;
  ctx.check_memory(destination, length)
}

/// CALLDATACOPY and RETURNDATACOPY: resolve through a frozen window.
fn window_copy(ctx: &mut StepContext<'_>, window: MemoryWindow) -> Result<()> {
  ctx.operands(3)?;
  let length = ctx.arg(2)?;
  if length == 0 {
    return Ok(());
  }
  let destination = ctx.arg(0)?;
  let source = usize::try_from(ctx.before.peek(1)?).unwrap_or(usize::MAX);
  let records = window.copy(ctx.builder, source, length, destination)?;
  ctx.frame.memory.write_all(records)?;
  ctx.check_memory(destination, length)
}

pub(super) fn calldata_copy(ctx: &mut StepContext<'_>) -> Result<()> {
  let window = ctx.frame.calldata.clone();
  window_copy(ctx, window)
}

pub(super) fn returndata_copy(ctx: &mut StepContext<'_>) -> Result<()> {
  let window = ctx.frame.return_data.clone();
  window_copy(ctx, window)
}

/// CODECOPY (`skip` 0) and EXTCODECOPY (`skip` 1, the address operand).
/// Code is public, so the copied bytes enter as constants.
pub(super) fn code_copy(ctx: &mut StepContext<'_>, skip: usize) -> Result<()> {
  ctx.operands(3 + skip)?;
  let length = ctx.arg(skip + 2)?;
  if length == 0 {
    return Ok(());
  }
  let destination = ctx.arg(skip)?;
  let bytes = ctx.after.memory_range(destination, length);
  let mut records = Vec::with_capacity(length.div_ceil(WORD_BYTES));
  for (i, chunk) in bytes.chunks(WORD_BYTES).enumerate() {
    let wire = ctx.builder.constant(U256::from_be_slice(chunk));
    records.push(MemoryRecord { offset: destination + i * WORD_BYTES, size: chunk.len(), wire });
  }
  ctx.frame.memory.write_all(records)?;
  ctx.check_memory(destination, length)
}

/// Export `[offset, offset + length)` word by word through PublicOut.
fn export_region(ctx: &mut StepContext<'_>, offset: usize, length: usize, label: &str) -> Result<()> {
  for (i, start) in (0..length).step_by(WORD_BYTES).enumerate() {
    let size = WORD_BYTES.min(length - start);
    let word = load_word(ctx.builder, &ctx.frame.memory, offset + start, size, usize::MAX)?;
    ctx.builder.buffers_mut().export(BufferKind::PublicOut, &word, format!("{label} word {i}"));
  }
  Ok(())
}

pub(super) fn keccak(ctx: &mut StepContext<'_>) -> Result<()> {
  ctx.operands(2)?;
  let length = ctx.arg(1)?;
  let offset = offset_for(ctx, 0, length)?;
  export_region(ctx, offset, length, "KECCAK256 preimage")?;
  let preimage = ctx.frame.memory.simulate(offset, length);
  let digest = U256::from_be_slice(keccak256(&preimage).as_slice());
  let concrete = ctx.result()?;
  if digest != concrete {
    return Err(SynthError::consistency(format!(
      "keccak256 of the symbolic preimage is {digest:#x}, interpreter pushed {concrete:#x}"
    )));
  }
  ctx.push_loaded("KECCAK256 digest".to_string())
}

pub(super) fn log(ctx: &mut StepContext<'_>, topics: usize) -> Result<()> {
  let operands = ctx.operands(2 + topics)?;
  let length = ctx.arg(1)?;
  let offset = offset_for(ctx, 0, length)?;
  for (i, topic) in operands[2..].iter().enumerate() {
    ctx.builder.buffers_mut().export(BufferKind::PublicOut, topic, format!("LOG{topics} topic {i}"));
  }
  export_region(ctx, offset, length, &format!("LOG{topics} data"))
}

/// RETURN and REVERT: the frame's output becomes a window on its memory.
pub(super) fn frame_output(ctx: &mut StepContext<'_>) -> Result<()> {
  ctx.operands(2)?;
  let length = ctx.arg(1)?;
  let offset = offset_for(ctx, 0, length)?;
  ctx.frame.output = MemoryWindow::capture(&ctx.frame.memory, offset, length);
  Ok(())
}
