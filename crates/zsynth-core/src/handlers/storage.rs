//! Persistent and transient storage instructions.

use super::StepContext;
use crate::error::Result;
use crate::storage::SlotFetch;

pub(super) fn sload(ctx: &mut StepContext<'_>, fetch: Option<SlotFetch>) -> Result<()> {
  let key = ctx.operands(1)?[0].value();
  let concrete = ctx.result()?;
  let wire = ctx.storage.load(ctx.builder, ctx.before.address, key, fetch, concrete)?;
  ctx.push(wire)
}

pub(super) fn sstore(ctx: &mut StepContext<'_>, fetch: Option<SlotFetch>) -> Result<()> {
  let mut operands = ctx.operands(2)?;
  let value = operands.remove(1);
  let key = operands[0].value();
  ctx.storage.store(ctx.builder, ctx.before.address, key, fetch, value)
}

pub(super) fn tload(ctx: &mut StepContext<'_>) -> Result<()> {
  let key = ctx.operands(1)?[0].value();
  let wire = ctx.storage.transient_load(ctx.builder, ctx.before.address, key);
  ctx.push(wire)
}

pub(super) fn tstore(ctx: &mut StepContext<'_>) -> Result<()> {
  let mut operands = ctx.operands(2)?;
  let value = operands.remove(1);
  ctx.storage.transient_store(ctx.before.address, operands[0].value(), value);
  Ok(())
}
