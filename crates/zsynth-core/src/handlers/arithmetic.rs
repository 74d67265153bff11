//! Arithmetic, comparison and bitwise instructions.

use super::StepContext;
use crate::arith::Operation;
use crate::error::Result;
use crate::opcode::Opcode;

/// One gadget per instruction; operands in stack order, top first.
pub(super) fn alu(ctx: &mut StepContext<'_>, operation: Operation) -> Result<()> {
  let (inputs, _) = Opcode::Alu(operation).stack_io();
  let operands = ctx.operands(inputs)?;
  let result = ctx.builder.place_one(operation, &operands)?;
  ctx.push(result)
}

pub(super) fn exp(ctx: &mut StepContext<'_>) -> Result<()> {
  let operands = ctx.operands(2)?;
  let result = ctx.builder.place_exp(&operands[0], &operands[1])?;
  ctx.push(result)
}
