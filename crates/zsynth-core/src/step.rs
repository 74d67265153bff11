//! Concrete machine state captured around one instruction.

use revm::primitives::{Address, U256};

use crate::error::{Result, SynthError, StepLocation};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepSnapshot {
  pub pc: usize,
  pub opcode: u8,
  /// Call depth, zero for the transaction's own frame.
  pub depth: usize,
  /// Account whose storage and balance the frame acts on.
  pub address: Address,
  pub caller: Address,
  /// Account whose code is executing.
  pub code_address: Address,
  /// Stack bottom first.
  pub stack: Vec<U256>,
  pub memory: Vec<u8>,
}

impl StepSnapshot {
  pub fn location(&self) -> StepLocation {
    StepLocation { opcode: self.opcode, pc: self.pc, code_address: self.code_address, depth: self.depth }
  }

  /// Stack value `depth` below the top.
  pub fn peek(&self, depth: usize) -> Result<U256> {
    self
      .stack
      .len()
      .checked_sub(depth + 1)
      .map(|index| self.stack[index])
      .ok_or_else(|| {
        SynthError::consistency(format!("concrete stack has no item at depth {depth}"))
          .at(&self.location())
      })
  }

  /// Stack value `depth` below the top as a memory offset or length.
  pub fn peek_usize(&self, depth: usize) -> Result<usize> {
    let value = self.peek(depth)?;
    usize::try_from(value).map_err(|_| {
      SynthError::unsupported(format!("memory argument {value:#x} does not fit usize"))
        .at(&self.location())
    })
  }

  /// `[offset, offset + length)` of memory, zero-padded past its end.
  pub fn memory_range(&self, offset: usize, length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    if offset < self.memory.len() {
      let end = (offset + length).min(self.memory.len());
      bytes[..end - offset].copy_from_slice(&self.memory[offset..end]);
    }
    bytes
  }

  /// Big-endian word at `offset`.
  pub fn memory_word(&self, offset: usize, length: usize) -> U256 {
    U256::from_be_slice(&self.memory_range(offset, length))
  }
}
