//! Synthesis façade: one instance per transaction, driven step by step by
//! the concrete interpreter.
//!
//! The driver calls, in order:
//! 1. [`Synthesizer::begin_transaction`] once, before execution starts;
//! 2. [`Synthesizer::before_step`] before every instruction;
//! 3. [`Synthesizer::apply_step`] once the instruction's result is known;
//! 4. [`Synthesizer::enter_frame`] / [`Synthesizer::exit_frame`] around
//!    every nested call and exit for the outermost frame;
//! 5. [`Synthesizer::finish`].
//!
//! Every method fails with the first fault; a failed synthesizer must be
//! dropped.

use std::sync::Arc;

use revm::precompile::{PrecompileSpecId, Precompiles};
use revm::primitives::U256;
use revm::primitives::hardfork::SpecId;
use tracing::{debug, instrument, trace, warn};

use crate::auth::{AuthenticatedSender, L2Transaction, place_sender_auth};
use crate::buffer::BufferManager;
use crate::catalog::SubcircuitCatalog;
use crate::config::SynthesizerOptions;
use crate::error::{Result, SynthError};
use crate::gadget::CircuitBuilder;
use crate::handlers::{self, StepContext};
use crate::memory::{MemoryAliasModel, MemoryWindow};
use crate::opcode::Opcode;
use crate::placement::PlacementGraph;
use crate::stack::SymbolicStack;
use crate::step::StepSnapshot;
use crate::storage::{StorageBackend, StorageBridge, StorageOutcome};
use crate::wire::Wire;

/// How a call frame ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameExit {
  Success,
  Revert,
  /// Exceptional halt: out of gas, invalid jump, stack fault.
  Halt,
}

/// Symbolic state of one call frame.
#[derive(Debug, Clone, Default)]
pub struct CallFrame {
  pub stack: SymbolicStack,
  pub memory: MemoryAliasModel,
  pub calldata: MemoryWindow,
  /// Output of the most recent child call.
  pub return_data: MemoryWindow,
  /// This frame's own RETURN/REVERT data.
  pub output: MemoryWindow,
}

impl CallFrame {
  fn with_calldata(calldata: MemoryWindow) -> Self {
    Self { calldata, ..Self::default() }
  }
}

pub struct Synthesizer<'a> {
  options: SynthesizerOptions,
  backend: &'a dyn StorageBackend,
  transaction: L2Transaction,
  builder: CircuitBuilder,
  storage: StorageBridge,
  frames: Vec<CallFrame>,
  sender: Option<AuthenticatedSender>,
  pending_calldata: Option<MemoryWindow>,
  precompiles: &'static Precompiles,
  steps: usize,
}

impl<'a> Synthesizer<'a> {
  pub fn new(
    options: SynthesizerOptions,
    backend: &'a dyn StorageBackend,
    transaction: L2Transaction,
  ) -> Result<Self> {
    options.validate()?;
    let builder = CircuitBuilder::new(&options);
    Ok(Self {
      options,
      backend,
      transaction,
      builder,
      storage: StorageBridge::new(),
      frames: Vec::new(),
      sender: None,
      pending_calldata: None,
      precompiles: Precompiles::new(PrecompileSpecId::from_spec_id(SpecId::default())),
      steps: 0,
    })
  }

  /// Refuse calls into the precompiles of `spec` rather than those of the
  /// default hard fork.
  pub fn with_spec(mut self, spec: SpecId) -> Self {
    self.precompiles = Precompiles::new(PrecompileSpecId::from_spec_id(spec));
    self
  }

  pub fn transaction(&self) -> &L2Transaction {
    &self.transaction
  }

  pub fn graph(&self) -> &PlacementGraph {
    self.builder.graph()
  }

  pub fn buffers(&self) -> &BufferManager {
    self.builder.buffers()
  }

  pub fn storage(&self) -> &StorageBridge {
    &self.storage
  }

  pub fn depth(&self) -> usize {
    self.frames.len()
  }

  /// Current frame, if any.
  pub fn frame(&self) -> Option<&CallFrame> {
    self.frames.last()
  }

  /// Place the sender proof and open the outermost frame.
  #[instrument(skip_all, fields(to = %self.transaction.to))]
  pub fn begin_transaction(&mut self) -> Result<()> {
    if self.sender.is_some() {
      return Err(SynthError::consistency("transaction already started"));
    }
    if self.transaction.to != self.backend.contract() {
      return Err(SynthError::consistency(format!(
        "transaction calls {} but the storage backend tracks {}",
        self.transaction.to,
        self.backend.contract()
      )));
    }
    let recorded = self.backend.participant_nonce(self.transaction.sender);
    let sender = place_sender_auth(&mut self.builder, &self.transaction, recorded)?;
    debug!(placements = self.builder.graph().len(), "sender authenticated");
    self.frames.push(CallFrame::with_calldata(sender.calldata.clone()));
    self.storage.checkpoint();
    self.sender = Some(sender);
    Ok(())
  }

  fn origin(&self) -> Result<&Wire> {
    self
      .sender
      .as_ref()
      .map(|sender| &sender.origin)
      .ok_or_else(|| SynthError::consistency("step received before the transaction started"))
  }

  /// Pre-execution hook. Refuses constructs that cannot be synthesized and,
  /// for calls, captures the calldata window before the callee can touch
  /// shared memory.
  pub fn before_step(&mut self, before: &StepSnapshot) -> Result<()> {
    let location = before.location();
    let opcode = Opcode::decode(before.opcode).ok_or_else(|| {
      SynthError::unsupported(format!("undefined opcode 0x{:02x}", before.opcode)).at(&location)
    })?;
    let frame = self
      .frames
      .last()
      .ok_or_else(|| SynthError::consistency("no open call frame").at(&location))?;
    self.pending_calldata =
      handlers::before_step(frame, opcode, before, self.precompiles).map_err(|err| err.at(&location))?;
    Ok(())
  }

  /// A nested call frame was opened by the interpreter.
  pub fn enter_frame(&mut self) {
    let calldata = self.pending_calldata.take().unwrap_or_default();
    debug!(depth = self.frames.len(), calldata = calldata.len(), "enter frame");
    self.frames.push(CallFrame::with_calldata(calldata));
    self.storage.checkpoint();
  }

  /// The innermost frame ended. The parent, if any, sees its output as
  /// return data.
  pub fn exit_frame(&mut self, exit: FrameExit) -> Result<()> {
    let frame = self.frames.pop().ok_or_else(|| SynthError::consistency("exit without an open frame"))?;
    match exit {
      FrameExit::Success => self.storage.commit(),
      FrameExit::Revert | FrameExit::Halt => self.storage.rollback()?,
    }
    let output = if exit == FrameExit::Halt { MemoryWindow::default() } else { frame.output };
    debug!(depth = self.frames.len(), ?exit, output = output.len(), "exit frame");
    if let Some(parent) = self.frames.last_mut() {
      parent.return_data = output;
    }
    Ok(())
  }

  /// Note that the instruction at `before` halted upstream and will never
  /// be applied.
  pub fn drop_step(&self, before: &StepSnapshot) {
    warn!(location = %before.location(), "instruction halted upstream; dropped");
  }

  /// Synthesize one executed instruction.
  pub fn apply_step(&mut self, before: &StepSnapshot, after: &StepSnapshot) -> Result<()> {
    let location = before.location();
    self.apply(before, after).map_err(|err| err.at(&location))
  }

  fn apply(&mut self, before: &StepSnapshot, after: &StepSnapshot) -> Result<()> {
    let opcode = Opcode::decode(before.opcode)
      .ok_or_else(|| SynthError::unsupported(format!("undefined opcode 0x{:02x}", before.opcode)))?;
    let frame = self.frames.last().ok_or_else(|| SynthError::consistency("no open call frame"))?;
    if frame.stack.len() != before.stack.len() {
      return Err(SynthError::consistency(format!(
        "symbolic stack depth {} differs from concrete depth {} before the step",
        frame.stack.len(),
        before.stack.len()
      )));
    }

    // Gather: every backend access completes before the graph is touched.
    let prefetch = handlers::gather(&self.storage, self.backend, opcode, before)?;

    // Emit.
    let origin = self.origin()?.clone();
    let frame = self.frames.last_mut().ok_or_else(|| SynthError::consistency("no open call frame"))?;
    let mut ctx = StepContext {
      builder: &mut self.builder,
      frame,
      storage: &mut self.storage,
      origin: &origin,
      contract: self.transaction.to,
      before,
      after,
    };
    handlers::emit(&mut ctx, opcode, prefetch)?;
    self.check_stack(after)?;
    self.steps += 1;
    trace!(step = self.steps, ?opcode, placements = self.builder.graph().len(), "applied");
    Ok(())
  }

  fn check_stack(&self, after: &StepSnapshot) -> Result<()> {
    let frame = self.frames.last().ok_or_else(|| SynthError::consistency("no open call frame"))?;
    if frame.stack.len() != after.stack.len() {
      return Err(SynthError::consistency(format!(
        "symbolic stack depth {} differs from concrete depth {}",
        frame.stack.len(),
        after.stack.len()
      )));
    }
    if let (Ok(symbolic), Some(concrete)) = (frame.stack.peek(0), after.stack.last()) {
      if symbolic.value() != *concrete {
        return Err(SynthError::consistency(format!(
          "top of stack {:#x} differs from concrete {concrete:#x}",
          symbolic.value()
        )));
      }
    }
    Ok(())
  }

  /// Close the transaction: prove the prior storage root and derive the
  /// resulting one.
  #[instrument(skip_all, fields(steps = self.steps))]
  pub fn finish(mut self) -> Result<SynthesizedCircuit> {
    let sender = self.sender.take().ok_or_else(|| SynthError::consistency("transaction never started"))?;
    if !self.frames.is_empty() {
      warn!(open = self.frames.len(), "frames still open at finish");
    }
    let storage = self.storage.finalize(&mut self.builder, self.backend, self.options.merkle_depth)?;
    let catalog = self.options.catalog.clone();
    let (graph, buffers) = self.builder.into_parts();
    debug!(placements = graph.len(), writes = storage.writes.len(), "synthesis finished");
    Ok(SynthesizedCircuit {
      transaction: self.transaction,
      origin: sender.origin.value(),
      graph,
      buffers,
      storage,
      catalog,
      steps: self.steps,
    })
  }
}

/// Everything one transaction produced, before the refactor pass.
#[derive(Debug, Clone)]
pub struct SynthesizedCircuit {
  pub transaction: L2Transaction,
  /// Sender address derived in-circuit, as a word.
  pub origin: U256,
  pub graph: PlacementGraph,
  pub buffers: BufferManager,
  pub storage: StorageOutcome,
  pub catalog: Arc<SubcircuitCatalog>,
  /// Instructions applied.
  pub steps: usize,
}

impl SynthesizedCircuit {
  /// Final value of a written slot.
  pub fn written_value(&self, key: U256) -> Option<U256> {
    self
      .storage
      .writes
      .iter()
      .find(|write| write.address == self.transaction.to && write.key == key)
      .map(|write| write.value)
  }
}
