//! Context, block and calldata instructions.

use super::StepContext;
use crate::auth::address_to_word;
use crate::buffer::{BlockField, ReservedVariable};
use crate::error::{Result, SynthError};
use crate::memory::WORD_BYTES;
use crate::opcode::{AccountQuery, ContextValue};
use crate::wire::Wire;

pub(super) fn context(ctx: &mut StepContext<'_>, value: ContextValue) -> Result<()> {
  let concrete = ctx.result()?;
  match value {
    ContextValue::Address | ContextValue::Caller | ContextValue::Origin
      if concrete == ctx.origin.value() =>
    {
      let origin = ctx.origin.clone();
      ctx.push(origin)
    }
    ContextValue::Address if concrete == address_to_word(ctx.contract) => {
      let contract = ctx.builder.buffers_mut().reserved(ReservedVariable::ContractAddress, concrete);
      ctx.push(contract)
    }
    other => ctx.push_loaded(format!("{other:?}").to_uppercase()),
  }
}

pub(super) fn account(ctx: &mut StepContext<'_>, query: AccountQuery) -> Result<()> {
  let operand = ctx.operands(1)?;
  ctx.push_loaded(format!("{}({:#x})", format!("{query:?}").to_uppercase(), operand[0].value()))
}

fn push_reserved(ctx: &mut StepContext<'_>, variable: ReservedVariable) -> Result<()> {
  let concrete = ctx.result()?;
  let wire: Wire = ctx.builder.buffers_mut().reserved(variable, concrete);
  if wire.value() != concrete {
    return Err(SynthError::consistency(format!(
      "{variable} was loaded as {:#x} but now reads {concrete:#x}",
      wire.value()
    )));
  }
  ctx.push(wire)
}

pub(super) fn block(ctx: &mut StepContext<'_>, field: BlockField) -> Result<()> {
  push_reserved(ctx, ReservedVariable::Block(field))
}

pub(super) fn block_hash(ctx: &mut StepContext<'_>) -> Result<()> {
  let number = ctx.operands(1)?[0].value();
  push_reserved(ctx, ReservedVariable::BlockHash(number))
}

pub(super) fn calldata_load(ctx: &mut StepContext<'_>) -> Result<()> {
  ctx.operands(1)?;
  let offset = usize::try_from(ctx.before.peek(0)?).unwrap_or(usize::MAX);
  let wire = ctx.frame.calldata.load(ctx.builder, offset, WORD_BYTES)?;
  ctx.push(wire)
}
