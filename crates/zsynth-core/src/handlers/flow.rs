//! Stack shuffling, control flow and the post-call half of calls.

use super::{StepContext, call_return_window};
use crate::error::Result;
use crate::opcode::{CallKind, Opcode};
use crate::wire::BufferKind;

/// Control flow leaves no wires: the taken path is fixed by which
/// placements exist.
pub(super) fn discard(ctx: &mut StepContext<'_>, operands: usize) -> Result<()> {
  ctx.operands(operands).map(drop)
}

pub(super) fn push(ctx: &mut StepContext<'_>) -> Result<()> {
  let value = ctx.result()?;
  let wire = ctx.builder.constant(value);
  ctx.push(wire)
}

/// Reconnect the callee's output into caller memory and push the success
/// flag.
pub(super) fn post_call(ctx: &mut StepContext<'_>, kind: CallKind) -> Result<()> {
  let (offset_depth, length_depth) = call_return_window(kind);
  ctx.operands(Opcode::Call(kind).stack_io().0)?;
  let requested = ctx.arg(length_depth)?;
  let length = requested.min(ctx.frame.return_data.len());
  if length > 0 {
    let destination = ctx.arg(offset_depth)?;
    let output = ctx.frame.return_data.clone();
    let records = output.copy(ctx.builder, 0, length, destination)?;
    ctx.frame.memory.write_all(records)?;
    ctx.check_memory(destination, length)?;
  }
  let success = ctx.result()?;
  let target = ctx.before.peek(1)?;
  let flag = ctx.builder.buffers_mut().labelled(
    BufferKind::PublicIn,
    success,
    1,
    format!("{kind:?} to {target:#x} success"),
  );
  ctx.push(flag)
}
