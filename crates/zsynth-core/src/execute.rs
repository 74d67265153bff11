use revm::{
  Context, InspectEvm, Inspector, MainBuilder, MainContext,
  context::TxEnv,
  database::{CacheDB, EmptyDB},
  interpreter::interpreter_types::{InputsTr, Jumps, MemoryTr},
  interpreter::{CallInputs, CallOutcome, Interpreter, InterpreterTypes, Stack},
  primitives::{Address, Bytes, KECCAK_EMPTY, TxKind, U256, hardfork::SpecId},
  state::{AccountInfo, Bytecode},
};
use tracing::{debug, info, instrument};

use crate::auth::L2Transaction;
use crate::config::SynthesizerOptions;
use crate::error::{Result, SynthError};
use crate::opcode::Opcode;
use crate::snapshot::{SnapshotStorage, StateSnapshot};
use crate::step::StepSnapshot;
use crate::synthesizer::{FrameExit, SynthesizedCircuit, Synthesizer};

/// Gas granted to every synthesized transaction.
pub const TRANSACTION_GAS: u64 = 10_000_000;

/// Hard fork the interpreter runs; its precompile set is refused.
pub const EVM_SPEC: SpecId = SpecId::PRAGUE;

// ============================================================
// Interpreter snapshots
// ============================================================

fn capture<INTR: InterpreterTypes<Stack = Stack>>(interp: &Interpreter<INTR>, depth: usize) -> StepSnapshot {
  let address = interp.input.target_address();
  let memory_size = interp.memory.size();
  StepSnapshot {
    pc: interp.bytecode.pc(),
    opcode: interp.bytecode.opcode(),
    depth,
    address,
    caller: interp.input.caller_address(),
    code_address: interp.input.bytecode_address().copied().unwrap_or(address),
    stack: interp.stack.data().to_vec(),
    memory: interp.memory.slice(0..memory_size).to_vec(),
  }
}

// ============================================================
// Synthesis inspector
// ============================================================

/// An instruction whose outcome is not known yet.
#[derive(Debug)]
struct PendingStep {
  before: StepSnapshot,
  /// State right after the instruction. Unset for calls, whose result only
  /// shows at the caller's next step.
  after: Option<StepSnapshot>,
}

/// An EVM inspector that forwards every executed instruction, with its
/// before and after state, to a [`Synthesizer`].
///
/// An instruction is applied only once it is known not to have halted: at
/// the next step of the same frame, or when the frame returns or reverts.
/// The first fault stops synthesis; execution itself runs to completion.
pub struct SynthesisInspector<'s, 'a> {
  synth: &'s mut Synthesizer<'a>,
  /// Pending instruction of each open frame, by depth.
  pending: Vec<Option<PendingStep>>,
  open_calls: usize,
  fault: Option<SynthError>,
}

impl<'s, 'a> SynthesisInspector<'s, 'a> {
  pub fn new(synth: &'s mut Synthesizer<'a>) -> Self {
    Self { synth, pending: Vec::new(), open_calls: 0, fault: None }
  }

  /// First fault raised during execution.
  pub fn take_fault(&mut self) -> Option<SynthError> {
    self.fault.take()
  }

  fn depth(&self) -> usize {
    self.open_calls.saturating_sub(1)
  }

  fn record(&mut self, result: Result<()>) {
    if let Err(err) = result {
      debug!(%err, "synthesis fault");
      self.fault.get_or_insert(err);
    }
  }

  fn slot(&mut self, depth: usize) -> &mut Option<PendingStep> {
    if self.pending.len() <= depth {
      self.pending.resize_with(depth + 1, || None);
    }
    &mut self.pending[depth]
  }

  fn on_step(&mut self, snapshot: StepSnapshot) -> Result<()> {
    if let Some(step) = self.slot(snapshot.depth).take() {
      let after = step.after.as_ref().unwrap_or(&snapshot);
      self.synth.apply_step(&step.before, after)?;
    }
    self.synth.before_step(&snapshot)?;
    let depth = snapshot.depth;
    *self.slot(depth) = Some(PendingStep { before: snapshot, after: None });
    Ok(())
  }

  fn on_step_end(&mut self, snapshot: StepSnapshot) {
    let depth = snapshot.depth;
    if let Some(step) = self.slot(depth).as_mut() {
      let is_call = Opcode::decode(step.before.opcode).is_some_and(Opcode::is_call);
      if !is_call {
        step.after = Some(snapshot);
      }
    }
  }

  fn on_frame_end(&mut self, exit: FrameExit) -> Result<()> {
    let depth = self.depth();
    if let Some(step) = self.slot(depth).take() {
      match (&step.after, exit) {
        (Some(after), FrameExit::Success | FrameExit::Revert) => {
          self.synth.apply_step(&step.before, after)?;
        }
        _ => self.synth.drop_step(&step.before),
      }
    }
    self.pending.truncate(depth);
    self.synth.exit_frame(exit)
  }
}

impl<CTX, INTR: InterpreterTypes<Stack = Stack>> Inspector<CTX, INTR> for SynthesisInspector<'_, '_> {
  fn step(&mut self, interp: &mut Interpreter<INTR>, _context: &mut CTX) {
    if self.fault.is_some() {
      return;
    }
    let snapshot = capture(interp, self.depth());
    let result = self.on_step(snapshot);
    self.record(result);
  }

  fn step_end(&mut self, interp: &mut Interpreter<INTR>, _context: &mut CTX) {
    if self.fault.is_some() {
      return;
    }
    let snapshot = capture(interp, self.depth());
    self.on_step_end(snapshot);
  }

  fn call(&mut self, _context: &mut CTX, _inputs: &mut CallInputs) -> Option<CallOutcome> {
    self.open_calls += 1;
    if self.open_calls > 1 && self.fault.is_none() {
      self.synth.enter_frame();
    }
    None
  }

  fn call_end(&mut self, _context: &mut CTX, _inputs: &CallInputs, outcome: &mut CallOutcome) {
    let status = outcome.result.result;
    let exit = if status.is_ok() {
      FrameExit::Success
    } else if status.is_revert() {
      FrameExit::Revert
    } else {
      FrameExit::Halt
    };
    if self.fault.is_none() {
      let result = self.on_frame_end(exit);
      self.record(result);
    }
    self.open_calls = self.open_calls.saturating_sub(1);
  }
}

// ============================================================
// Public API
// ============================================================

/// In-memory database holding the contract and its storage as recorded in
/// `snapshot`.
pub fn contract_db(
  snapshot: &StateSnapshot,
  code: Bytes,
  sender: Address,
) -> Result<CacheDB<EmptyDB>> {
  let mut db = CacheDB::new(EmptyDB::default());
  let bytecode = Bytecode::new_legacy(code);
  db.insert_account_info(
    snapshot.contract_address,
    AccountInfo::new(U256::ZERO, 1, bytecode.hash_slow(), bytecode),
  );
  db.insert_account_info(
    sender,
    AccountInfo::new(U256::ZERO, 0, KECCAK_EMPTY, Bytecode::default()),
  );
  for entry in &snapshot.storage_entries {
    db.insert_account_storage(snapshot.contract_address, entry.key, entry.value)
      .map_err(|err| SynthError::Execution(format!("failed to seed storage: {err:?}")))?;
  }
  Ok(db)
}

/// Execute `tx` against the contract `code` in the state of `snapshot` and
/// synthesize its circuit.
#[instrument(skip_all, fields(sender = %tx.sender, nonce = tx.nonce))]
pub fn synthesize_transaction(
  snapshot: &StateSnapshot,
  code: Bytes,
  tx: &L2Transaction,
  options: SynthesizerOptions,
) -> Result<SynthesizedCircuit> {
  let backend = SnapshotStorage::new(snapshot);
  let mut synth = Synthesizer::new(options, &backend, tx.clone())?.with_spec(EVM_SPEC);
  synth.begin_transaction()?;

  let db = contract_db(snapshot, code, tx.sender)?;
  let env = TxEnv::builder()
    .caller(tx.sender)
    .kind(TxKind::Call(tx.to))
    .data(Bytes::from(tx.calldata()))
    .gas_limit(TRANSACTION_GAS)
    .build()
    .map_err(|err| SynthError::Execution(format!("failed to build tx env: {err:?}")))?;

  let inspector = SynthesisInspector::new(&mut synth);
  let mut evm = Context::mainnet()
    .modify_cfg_chained(|cfg| cfg.spec = EVM_SPEC)
    .with_db(db)
    .build_mainnet_with_inspector(inspector);
  let outcome = evm
    .inspect_one_tx(env)
    .map_err(|err| SynthError::Execution(format!("failed to execute tx: {err}")));
  let fault = evm.inspector.take_fault();
  drop(evm);
  if let Some(fault) = fault {
    return Err(fault);
  }
  let outcome = outcome?;
  info!(success = outcome.is_success(), gas = outcome.gas_used(), "transaction executed");

  synth.finish()
}
