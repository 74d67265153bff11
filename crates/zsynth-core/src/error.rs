//! Error taxonomy for synthesis.
//!
//! Every fault is fatal for the transaction being synthesized: the caller gets
//! the first fault and the partially built circuit is dropped.

use std::fmt;

use revm::bytecode::OpCode;
use revm::primitives::Address;
use thiserror::Error;

/// Where in the concrete trace a fault was raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepLocation {
  pub opcode: u8,
  pub pc: usize,
  pub code_address: Address,
  pub depth: usize,
}

impl fmt::Display for StepLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = OpCode::new(self.opcode).map(|op| op.as_str()).unwrap_or("UNDEFINED");
    write!(
      f,
      "{name} (0x{:02x}) at pc {} of {} (depth {})",
      self.opcode, self.pc, self.code_address, self.depth
    )
  }
}

fn located(location: &Option<StepLocation>) -> String {
  match location {
    Some(location) => format!(" at {location}"),
    None => String::new(),
  }
}

/// A gadget simulation refused its inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GadgetFault {
  #[error("expected {expected} inputs, got {actual}")]
  Arity { expected: usize, actual: usize },
  #[error("input {index} must be a single bit")]
  NonBinary { index: usize },
  #[error("point ({x:#x}, {y:#x}) is not on the Jubjub curve")]
  OffCurve { x: revm::primitives::U256, y: revm::primitives::U256 },
  #[error("signature equation sG = R + eA does not hold")]
  SignatureMismatch,
  #[error("computed Merkle root {computed:#x} differs from declared root {declared:#x}")]
  RootMismatch { computed: revm::primitives::U256, declared: revm::primitives::U256 },
  #[error("accumulated value overflows 256 bits")]
  Overflow,
}

#[derive(Debug, Error)]
pub enum SynthError {
  /// Symbolic simulation disagrees with concrete execution.
  #[error("consistency fault{}: {reason}", located(.location))]
  Consistency { location: Option<StepLocation>, reason: String },

  /// Alias resolution disagrees with concrete flat memory.
  #[error(
    "memory mismatch{} over [{offset}, {offset}+{length}): symbolic 0x{symbolic}, concrete 0x{concrete}",
    located(.location)
  )]
  MemoryMismatch {
    location: Option<StepLocation>,
    offset: usize,
    length: usize,
    symbolic: String,
    concrete: String,
  },

  #[error("capacity exceeded for {buffer}: {required} required, {available} available")]
  Capacity { buffer: String, required: usize, available: usize },

  #[error("unsupported{}: {reason}", located(.location))]
  Unsupported { location: Option<StepLocation>, reason: String },

  #[error("sender authentication failed: {0}")]
  Authentication(String),

  #[error("gadget {operation} rejected its inputs{}: {fault}", located(.location))]
  Gadget { location: Option<StepLocation>, operation: &'static str, fault: GadgetFault },

  #[error("invalid subcircuit catalog: {0}")]
  Catalog(String),

  #[error("invalid synthesizer options: {0}")]
  Config(String),

  /// The concrete interpreter refused or failed the transaction.
  #[error("execution failed: {0}")]
  Execution(String),

  #[error(transparent)]
  Json(#[from] serde_json::Error),
}

impl SynthError {
  pub fn consistency(reason: impl Into<String>) -> Self {
    Self::Consistency { location: None, reason: reason.into() }
  }

  pub fn unsupported(reason: impl Into<String>) -> Self {
    Self::Unsupported { location: None, reason: reason.into() }
  }

  /// Attach the step location unless one is already present.
  pub fn at(mut self, step: &StepLocation) -> Self {
    match &mut self {
      Self::Consistency { location, .. }
      | Self::MemoryMismatch { location, .. }
      | Self::Unsupported { location, .. }
      | Self::Gadget { location, .. } => {
        if location.is_none() {
          *location = Some(step.clone());
        }
      }
      _ => {}
    }
    self
  }

  pub fn location(&self) -> Option<&StepLocation> {
    match self {
      Self::Consistency { location, .. }
      | Self::MemoryMismatch { location, .. }
      | Self::Unsupported { location, .. }
      | Self::Gadget { location, .. } => location.as_ref(),
      _ => None,
    }
  }
}

pub type Result<T, E = SynthError> = std::result::Result<T, E>;
