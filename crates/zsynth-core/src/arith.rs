//! Operations the gadget catalog implements and their exact simulation.
//!
//! Simulation mirrors the concrete machine bit for bit: words wrap modulo
//! 2^256, division by zero yields zero and signed operations use two's
//! complement.

use std::fmt;

use revm::primitives::U256;

use crate::error::GadgetFault;
use crate::jubjub::JubjubPoint;
use crate::poseidon::{POSEIDON_INPUTS, poseidon4};
use crate::wire::{FIELD_BITS, WORD_BITS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
  Add,
  Mul,
  Sub,
  Div,
  SDiv,
  Mod,
  SMod,
  AddMod,
  MulMod,
  SignExtend,
  Lt,
  Gt,
  SLt,
  SGt,
  Eq,
  IsZero,
  And,
  Or,
  Xor,
  Not,
  Byte,
  Shl,
  Shr,
  Sar,
  DecToBit,
  SubExpBatch,
  Accumulator,
  Poseidon,
  JubjubExpBatch,
  EdDsaVerify,
  VerifyMerkleRoot,
}

impl Operation {
  /// Catalog template and, for shared ALU templates, the selector word.
  pub fn template(self) -> (&'static str, Option<u32>) {
    use Operation::*;
    match self {
      Add => ("ALU1", Some(1)),
      Mul => ("ALU1", Some(2)),
      Sub => ("ALU1", Some(3)),
      Div => ("ALU2", Some(4)),
      SDiv => ("ALU2", Some(5)),
      Mod => ("ALU2", Some(6)),
      SMod => ("ALU2", Some(7)),
      AddMod => ("ALU2", Some(8)),
      MulMod => ("ALU2", Some(9)),
      SignExtend => ("ALU5", Some(11)),
      Lt => ("ALU4", Some(16)),
      Gt => ("ALU4", Some(17)),
      SLt => ("ALU4", Some(18)),
      SGt => ("ALU4", Some(19)),
      Eq => ("ALU1", Some(20)),
      IsZero => ("ALU1", Some(21)),
      Not => ("ALU1", Some(25)),
      Byte => ("ALU5", Some(26)),
      Shl => ("ALU3", Some(27)),
      Shr => ("ALU3", Some(28)),
      Sar => ("ALU3", Some(29)),
      And => ("AND", None),
      Or => ("OR", None),
      Xor => ("XOR", None),
      DecToBit => ("DecToBit", None),
      SubExpBatch => ("SubExpBatch", None),
      Accumulator => ("Accumulator", None),
      Poseidon => ("Poseidon", None),
      JubjubExpBatch => ("JubjubExpBatch", None),
      EdDsaVerify => ("EdDsaVerify", None),
      VerifyMerkleRoot => ("VerifyMerkleRoot", None),
    }
  }

  /// Selector wire value, `1 << bit` for ALU templates.
  pub fn selector(self) -> Option<U256> {
    self.template().1.map(|bit| U256::from(1u64) << bit as usize)
  }

  /// ALU3 and ALU5 take a shift, byte index or size that must fit a byte.
  pub fn has_byte_operand(self) -> bool {
    matches!(self.template().0, "ALU3" | "ALU5")
  }

  pub fn output_bits(self) -> u16 {
    match self {
      Operation::DecToBit => 1,
      Operation::Poseidon | Operation::JubjubExpBatch => FIELD_BITS,
      _ => WORD_BITS,
    }
  }

  pub fn name(self) -> &'static str {
    use Operation::*;
    match self {
      Add => "ADD",
      Mul => "MUL",
      Sub => "SUB",
      Div => "DIV",
      SDiv => "SDIV",
      Mod => "MOD",
      SMod => "SMOD",
      AddMod => "ADDMOD",
      MulMod => "MULMOD",
      SignExtend => "SIGNEXTEND",
      Lt => "LT",
      Gt => "GT",
      SLt => "SLT",
      SGt => "SGT",
      Eq => "EQ",
      IsZero => "ISZERO",
      And => "AND",
      Or => "OR",
      Xor => "XOR",
      Not => "NOT",
      Byte => "BYTE",
      Shl => "SHL",
      Shr => "SHR",
      Sar => "SAR",
      DecToBit => "DecToBit",
      SubExpBatch => "SubExpBatch",
      Accumulator => "Accumulator",
      Poseidon => "Poseidon",
      JubjubExpBatch => "JubjubExpBatch",
      EdDsaVerify => "EdDsaVerify",
      VerifyMerkleRoot => "VerifyMerkleRoot",
    }
  }
}

impl fmt::Display for Operation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

// ============================================================
// Word helpers
// ============================================================

const SIGN_BIT: usize = 255;

fn is_negative(value: U256) -> bool {
  value.bit(SIGN_BIT)
}

fn abs(value: U256) -> U256 {
  if is_negative(value) { value.wrapping_neg() } else { value }
}

fn flag(condition: bool) -> U256 {
  if condition { U256::from(1u64) } else { U256::ZERO }
}

fn signed_lt(a: U256, b: U256) -> bool {
  let sign = U256::from(1u64) << SIGN_BIT;
  (a ^ sign) < (b ^ sign)
}

fn shift_amount(value: U256) -> Option<usize> {
  if value < U256::from(256u64) { Some(value.to::<usize>()) } else { None }
}

fn expect_arity(inputs: &[U256], expected: usize) -> Result<(), GadgetFault> {
  if inputs.len() == expected {
    Ok(())
  } else {
    Err(GadgetFault::Arity { expected, actual: inputs.len() })
  }
}

fn bits_to_scalar(bits: &[U256], offset: usize) -> Result<U256, GadgetFault> {
  bits.iter().enumerate().try_fold(U256::ZERO, |acc, (i, bit)| {
    if *bit > U256::from(1u64) {
      return Err(GadgetFault::NonBinary { index: offset + i });
    }
    Ok(acc | (*bit << i))
  })
}

pub fn sign_extend(byte_index: U256, value: U256) -> U256 {
  match shift_amount(byte_index) {
    Some(k) if k < 31 => {
      let bit = 8 * k + 7;
      let mask = (U256::from(1u64) << (bit + 1)) - U256::from(1u64);
      if value.bit(bit) { value | !mask } else { value & mask }
    }
    _ => value,
  }
}

// ============================================================
// Simulation
// ============================================================

/// Outputs of `operation` on `inputs` (selectors excluded).
pub fn execute(operation: Operation, inputs: &[U256]) -> Result<Vec<U256>, GadgetFault> {
  use Operation::*;
  let binary = |f: fn(U256, U256) -> U256| -> Result<Vec<U256>, GadgetFault> {
    expect_arity(inputs, 2)?;
    Ok(vec![f(inputs[0], inputs[1])])
  };
  match operation {
    Add => binary(|a, b| a.wrapping_add(b)),
    Mul => binary(|a, b| a.wrapping_mul(b)),
    Sub => binary(|a, b| a.wrapping_sub(b)),
    Div => binary(|a, b| if b.is_zero() { U256::ZERO } else { a / b }),
    Mod => binary(|a, b| if b.is_zero() { U256::ZERO } else { a % b }),
    SDiv => binary(|a, b| {
      if b.is_zero() {
        return U256::ZERO;
      }
      let quotient = abs(a) / abs(b);
      if is_negative(a) != is_negative(b) { quotient.wrapping_neg() } else { quotient }
    }),
    SMod => binary(|a, b| {
      if b.is_zero() {
        return U256::ZERO;
      }
      let remainder = abs(a) % abs(b);
      if is_negative(a) { remainder.wrapping_neg() } else { remainder }
    }),
    AddMod | MulMod => {
      expect_arity(inputs, 3)?;
      let (a, b, n) = (inputs[0], inputs[1], inputs[2]);
      let out = if n.is_zero() {
        U256::ZERO
      } else if operation == AddMod {
        a.add_mod(b, n)
      } else {
        a.mul_mod(b, n)
      };
      Ok(vec![out])
    }
    SignExtend => binary(sign_extend),
    Lt => binary(|a, b| flag(a < b)),
    Gt => binary(|a, b| flag(a > b)),
    SLt => binary(|a, b| flag(signed_lt(a, b))),
    SGt => binary(|a, b| flag(signed_lt(b, a))),
    Eq => binary(|a, b| flag(a == b)),
    And => binary(|a, b| a & b),
    Or => binary(|a, b| a | b),
    Xor => binary(|a, b| a ^ b),
    IsZero => {
      expect_arity(inputs, 1)?;
      Ok(vec![flag(inputs[0].is_zero())])
    }
    Not => {
      expect_arity(inputs, 1)?;
      Ok(vec![!inputs[0]])
    }
    Byte => binary(|i, x| match shift_amount(i) {
      Some(i) if i < 32 => (x >> (8 * (31 - i))) & U256::from(0xffu64),
      _ => U256::ZERO,
    }),
    Shl => binary(|shift, x| shift_amount(shift).map_or(U256::ZERO, |s| x << s)),
    Shr => binary(|shift, x| shift_amount(shift).map_or(U256::ZERO, |s| x >> s)),
    Sar => binary(|shift, x| match shift_amount(shift) {
      Some(s) => x.arithmetic_shr(s),
      None if is_negative(x) => U256::MAX,
      None => U256::ZERO,
    }),
    DecToBit => {
      expect_arity(inputs, 1)?;
      Ok((0..256).map(|i| flag(inputs[0].bit(i))).collect())
    }
    SubExpBatch => {
      if inputs.len() < 3 {
        return Err(GadgetFault::Arity { expected: 3, actual: inputs.len() });
      }
      let (mut acc, mut base) = (inputs[0], inputs[1]);
      let bits = &inputs[2..];
      bits_to_scalar(bits, 2)?;
      for bit in bits {
        if !bit.is_zero() {
          acc = acc.wrapping_mul(base);
        }
        base = base.wrapping_mul(base);
      }
      Ok(vec![acc, base])
    }
    Accumulator => inputs
      .iter()
      .try_fold(U256::ZERO, |acc, value| acc.checked_add(*value))
      .map(|sum| vec![sum])
      .ok_or(GadgetFault::Overflow),
    Poseidon => {
      expect_arity(inputs, POSEIDON_INPUTS)?;
      Ok(vec![poseidon4([inputs[0], inputs[1], inputs[2], inputs[3]])])
    }
    JubjubExpBatch => {
      if inputs.len() < 5 {
        return Err(GadgetFault::Arity { expected: 5, actual: inputs.len() });
      }
      let partial = JubjubPoint { x: inputs[0], y: inputs[1] };
      let base = JubjubPoint { x: inputs[2], y: inputs[3] };
      let bits = &inputs[4..];
      let scalar = bits_to_scalar(bits, 4)?;
      let next_partial = partial.add(&base.mul(scalar)?)?;
      let next_base = base.double_n(bits.len())?;
      Ok(vec![next_partial.x, next_partial.y, next_base.x, next_base.y])
    }
    EdDsaVerify => {
      expect_arity(inputs, 6)?;
      let signed = JubjubPoint { x: inputs[0], y: inputs[1] };
      let randomizer = JubjubPoint { x: inputs[2], y: inputs[3] };
      let challenged = JubjubPoint { x: inputs[4], y: inputs[5] };
      for point in [signed, randomizer, challenged] {
        if !point.is_on_curve() {
          return Err(GadgetFault::OffCurve { x: point.x, y: point.y });
        }
      }
      if randomizer.add(&challenged)? == signed {
        Ok(Vec::new())
      } else {
        Err(GadgetFault::SignatureMismatch)
      }
    }
    VerifyMerkleRoot => {
      expect_arity(inputs, 2)?;
      if inputs[0] == inputs[1] {
        Ok(Vec::new())
      } else {
        Err(GadgetFault::RootMismatch { computed: inputs[0], declared: inputs[1] })
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn one(operation: Operation, inputs: &[U256]) -> U256 {
    execute(operation, inputs).expect("simulation")[0]
  }

  fn neg(value: u64) -> U256 {
    U256::from(value).wrapping_neg()
  }

  #[test]
  fn division_by_zero_is_zero() {
    let seven = U256::from(7u64);
    assert_eq!(one(Operation::Div, &[seven, U256::ZERO]), U256::ZERO);
    assert_eq!(one(Operation::SMod, &[seven, U256::ZERO]), U256::ZERO);
    assert_eq!(one(Operation::AddMod, &[seven, seven, U256::ZERO]), U256::ZERO);
  }

  #[test]
  fn signed_division_truncates_toward_zero() {
    assert_eq!(one(Operation::SDiv, &[neg(7), U256::from(2u64)]), neg(3));
    assert_eq!(one(Operation::SMod, &[neg(7), U256::from(2u64)]), neg(1));
    let min = U256::from(1u64) << 255;
    assert_eq!(one(Operation::SDiv, &[min, U256::MAX]), min);
  }

  #[test]
  fn shifts_saturate_past_the_word() {
    let x = U256::from(0xf0u64);
    assert_eq!(one(Operation::Shl, &[U256::from(256u64), x]), U256::ZERO);
    assert_eq!(one(Operation::Sar, &[U256::from(300u64), neg(1)]), U256::MAX);
    assert_eq!(one(Operation::Sar, &[U256::from(4u64), neg(16)]), neg(1));
  }

  #[test]
  fn sign_extend_and_byte() {
    assert_eq!(one(Operation::SignExtend, &[U256::ZERO, U256::from(0xffu64)]), U256::MAX);
    assert_eq!(one(Operation::SignExtend, &[U256::from(40u64), U256::from(0xffu64)]), U256::from(0xffu64));
    assert_eq!(one(Operation::Byte, &[U256::from(31u64), U256::from(0x1234u64)]), U256::from(0x34u64));
    assert_eq!(one(Operation::Byte, &[U256::from(32u64), U256::from(0x1234u64)]), U256::ZERO);
  }

  #[test]
  fn sub_exp_batch_multiplies_selected_powers() {
    // 3^5 with bits 1,0,1 (LSB first)
    let inputs = [U256::from(1u64), U256::from(3u64), U256::from(1u64), U256::ZERO, U256::from(1u64)];
    let out = execute(Operation::SubExpBatch, &inputs).expect("batch");
    assert_eq!(out, vec![U256::from(243u64), U256::from(6561u64)]);
  }

  #[test]
  fn non_binary_bit_is_rejected() {
    let inputs = [U256::from(1u64), U256::from(3u64), U256::from(2u64)];
    assert_eq!(
      execute(Operation::SubExpBatch, &inputs),
      Err(GadgetFault::NonBinary { index: 2 })
    );
  }
}
