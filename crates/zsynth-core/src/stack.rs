//! Symbolic operand stack of one call frame.

use crate::error::{Result, SynthError};
use crate::wire::Wire;

/// EVM stack limit.
pub const STACK_LIMIT: usize = 1024;

/// Wires in push order; the top of the stack is the last element.
#[derive(Debug, Clone, Default)]
pub struct SymbolicStack {
  items: Vec<Wire>,
}

impl SymbolicStack {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn push(&mut self, wire: Wire) -> Result<()> {
    if self.items.len() == STACK_LIMIT {
      return Err(SynthError::consistency("symbolic stack overflow"));
    }
    self.items.push(wire);
    Ok(())
  }

  pub fn pop(&mut self) -> Result<Wire> {
    self.items.pop().ok_or_else(|| SynthError::consistency("symbolic stack underflow"))
  }

  /// Pop `n` wires; the former top comes first.
  pub fn pop_n(&mut self, n: usize) -> Result<Vec<Wire>> {
    if n > self.items.len() {
      return Err(SynthError::consistency(format!(
        "need {n} operands, symbolic stack holds {}",
        self.items.len()
      )));
    }
    let mut popped = self.items.split_off(self.items.len() - n);
    popped.reverse();
    Ok(popped)
  }

  /// Wire `depth` positions below the top (0 is the top).
  pub fn peek(&self, depth: usize) -> Result<&Wire> {
    self
      .items
      .len()
      .checked_sub(depth + 1)
      .map(|index| &self.items[index])
      .ok_or_else(|| SynthError::consistency(format!("no stack item at depth {depth}")))
  }

  /// DUPn for `n` in 1..=16.
  pub fn dup(&mut self, n: usize) -> Result<()> {
    let wire = self.peek(n - 1)?.clone();
    self.push(wire)
  }

  /// SWAPn for `n` in 1..=16.
  pub fn swap(&mut self, n: usize) -> Result<()> {
    let len = self.items.len();
    if n >= len {
      return Err(SynthError::consistency(format!("SWAP{n} on a stack of {len}")));
    }
    self.items.swap(len - 1, len - 1 - n);
    Ok(())
  }
}
