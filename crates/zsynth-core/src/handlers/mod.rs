//! Instruction handlers, one module per opcode family.
//!
//! Each instruction runs in two phases. [`gather`] performs every backend
//! access the instruction needs and leaves the circuit untouched; [`emit`]
//! then updates the symbolic stack, memory and storage and appends
//! placements without further I/O, so the graph changes atomically per
//! instruction.

mod arithmetic;
mod environment;
mod flow;
mod memory;
mod storage;

use revm::precompile::Precompiles;
use revm::primitives::{Address, B256, U256};

use crate::error::{Result, SynthError};
use crate::gadget::CircuitBuilder;
use crate::memory::MemoryWindow;
use crate::opcode::{CallKind, Opcode};
use crate::step::StepSnapshot;
use crate::storage::{SlotFetch, StorageBackend, StorageBridge};
use crate::synthesizer::CallFrame;
use crate::wire::{BufferKind, WORD_BITS, Wire};

/// Gather-phase result handed to the emit phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Prefetch {
  Nothing,
  /// Backend answer for a storage slot; `None` when the slot is warm.
  Slot(Option<SlotFetch>),
}

/// Handles one instruction needs, borrowed from the synthesizer.
pub(crate) struct StepContext<'s> {
  pub builder: &'s mut CircuitBuilder,
  pub frame: &'s mut CallFrame,
  pub storage: &'s mut StorageBridge,
  /// In-circuit sender address.
  pub origin: &'s Wire,
  /// Contract the transaction calls.
  pub contract: Address,
  pub before: &'s StepSnapshot,
  pub after: &'s StepSnapshot,
}

impl StepContext<'_> {
  /// Pop `n` operands, checking each against the concrete stack before the
  /// step. The former top comes first.
  pub fn operands(&mut self, n: usize) -> Result<Vec<Wire>> {
    let wires = self.frame.stack.pop_n(n)?;
    for (depth, wire) in wires.iter().enumerate() {
      let concrete = self.before.peek(depth)?;
      if wire.value() != concrete {
        return Err(SynthError::consistency(format!(
          "operand {depth} is {:#x} symbolically but {concrete:#x} concretely",
          wire.value()
        )));
      }
    }
    Ok(wires)
  }

  pub fn push(&mut self, wire: Wire) -> Result<()> {
    self.frame.stack.push(wire)
  }

  /// Concrete top of stack after the step.
  pub fn result(&self) -> Result<U256> {
    self.after.peek(0)
  }

  /// Push the concrete result as a fresh public load.
  pub fn push_loaded(&mut self, description: String) -> Result<()> {
    let value = self.result()?;
    let wire = self.builder.buffers_mut().labelled(BufferKind::PublicIn, value, WORD_BITS, description);
    self.push(wire)
  }

  /// Operand `depth` (before the step) as a memory offset or length.
  pub fn arg(&self, depth: usize) -> Result<usize> {
    self.before.peek_usize(depth)
  }

  /// Compare a range of symbolic memory against memory after the step.
  pub fn check_memory(&self, offset: usize, length: usize) -> Result<()> {
    if length == 0 {
      return Ok(());
    }
    self.frame.memory.check_against(offset, length, &self.after.memory)
  }
}

/// Pre-execution checks. Returns the calldata window of a call about to
/// execute. `precompiles` is the set active in the interpreter.
pub(crate) fn before_step(
  frame: &CallFrame,
  opcode: Opcode,
  before: &StepSnapshot,
  precompiles: &Precompiles,
) -> Result<Option<MemoryWindow>> {
  match opcode {
    Opcode::Create | Opcode::Create2 => Err(SynthError::unsupported("contract creation")),
    Opcode::SelfDestruct => Err(SynthError::unsupported("SELFDESTRUCT")),
    Opcode::Invalid => Err(SynthError::unsupported("INVALID")),
    Opcode::Call(kind) => {
      // The interpreter keeps only the low 160 bits of the target.
      let target = Address::from_word(B256::from(before.peek(1)?.to_be_bytes::<32>()));
      if precompiles.contains(&target) {
        return Err(SynthError::unsupported(format!("call to precompile {target}")));
      }
      let (offset, length) = call_args_window(kind);
      let length = before.peek_usize(length)?;
      let offset = if length == 0 { 0 } else { before.peek_usize(offset)? };
      Ok(Some(MemoryWindow::capture(&frame.memory, offset, length)))
    }
    _ => Ok(None),
  }
}

/// Stack depths of the argument offset and length of a call.
fn call_args_window(kind: CallKind) -> (usize, usize) {
  match kind {
    CallKind::Call | CallKind::CallCode => (3, 4),
    CallKind::DelegateCall | CallKind::StaticCall => (2, 3),
  }
}

/// Stack depths of the return offset and length of a call.
fn call_return_window(kind: CallKind) -> (usize, usize) {
  let (offset, length) = call_args_window(kind);
  (offset + 2, length + 2)
}

pub(crate) fn gather(
  storage: &StorageBridge,
  backend: &dyn StorageBackend,
  opcode: Opcode,
  before: &StepSnapshot,
) -> Result<Prefetch> {
  match opcode {
    Opcode::SLoad | Opcode::SStore => {
      let key = before.peek(0)?;
      Ok(Prefetch::Slot(storage.fetch(backend, before.address, key)))
    }
    _ => Ok(Prefetch::Nothing),
  }
}

pub(crate) fn emit(ctx: &mut StepContext<'_>, opcode: Opcode, prefetch: Prefetch) -> Result<()> {
  match opcode {
    Opcode::Alu(operation) => arithmetic::alu(ctx, operation),
    Opcode::Exp => arithmetic::exp(ctx),

    Opcode::Context(value) => environment::context(ctx, value),
    Opcode::Account(query) => environment::account(ctx, query),
    Opcode::Block(field) => environment::block(ctx, field),
    Opcode::BlockHash => environment::block_hash(ctx),
    Opcode::CallDataLoad => environment::calldata_load(ctx),

    Opcode::MLoad => memory::mload(ctx),
    Opcode::MStore => memory::mstore(ctx),
    Opcode::MStore8 => memory::mstore8(ctx),
    Opcode::MCopy => memory::mcopy(ctx),
    Opcode::CallDataCopy => memory::calldata_copy(ctx),
    Opcode::ReturnDataCopy => memory::returndata_copy(ctx),
    Opcode::CodeCopy => memory::code_copy(ctx, 0),
    Opcode::ExtCodeCopy => memory::code_copy(ctx, 1),
    Opcode::Keccak256 => memory::keccak(ctx),
    Opcode::Log(topics) => memory::log(ctx, usize::from(topics)),
    Opcode::Return | Opcode::Revert => memory::frame_output(ctx),

    Opcode::SLoad => storage::sload(ctx, slot(prefetch)?),
    Opcode::SStore => storage::sstore(ctx, slot(prefetch)?),
    Opcode::TLoad => storage::tload(ctx),
    Opcode::TStore => storage::tstore(ctx),

    Opcode::Stop | Opcode::JumpDest => Ok(()),
    Opcode::Pop | Opcode::Jump | Opcode::JumpI => flow::discard(ctx, opcode.stack_io().0),
    Opcode::Push(_) => flow::push(ctx),
    Opcode::Dup(n) => ctx.frame.stack.dup(usize::from(n)),
    Opcode::Swap(n) => ctx.frame.stack.swap(usize::from(n)),
    Opcode::Call(kind) => flow::post_call(ctx, kind),

    Opcode::Create | Opcode::Create2 | Opcode::SelfDestruct | Opcode::Invalid => {
      Err(SynthError::unsupported(format!("{opcode:?}")))
    }
  }
}

fn slot(prefetch: Prefetch) -> Result<Option<SlotFetch>> {
  match prefetch {
    Prefetch::Slot(fetch) => Ok(fetch),
    Prefetch::Nothing => Err(SynthError::consistency("storage access without a gather phase")),
  }
}
