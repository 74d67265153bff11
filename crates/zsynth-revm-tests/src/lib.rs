//! Shared fixtures for revm-driven synthesis runs: a two-party channel
//! snapshot and the bytecode of the contracts the runs exercise.

use revm::{
  bytecode::opcode,
  primitives::{Address, Bytes, U256},
};
use zsynth_core::auth::{TRANSACTION_INPUTS, address_of, address_to_word};
use zsynth_core::jubjub::SigningKey;
use zsynth_core::{L2Transaction, Result, StateSnapshot};

/// `transfer(address,uint256)`.
pub const TRANSFER_SELECTOR: u32 = 0xa9059cbb;

/// Moves `input1` from the caller's balance slot to the slot keyed by
/// `input0`. Balances are keyed by the holder's address.
pub fn transfer_code() -> Bytes {
  Bytes::from(vec![
    opcode::PUSH1,
    0x24,
    opcode::CALLDATALOAD,
    opcode::DUP1,
    opcode::CALLER,
    opcode::SLOAD,
    opcode::SUB,
    opcode::CALLER,
    opcode::SSTORE,
    opcode::PUSH1,
    0x04,
    opcode::CALLDATALOAD,
    opcode::DUP1,
    opcode::SLOAD,
    opcode::DUP3,
    opcode::ADD,
    opcode::SWAP1,
    opcode::SSTORE,
    opcode::POP,
    opcode::STOP,
  ])
}

/// Append `PUSH32 value`.
pub fn push_word(code: &mut Vec<u8>, value: U256) {
  code.push(opcode::PUSH32);
  code.extend_from_slice(&value.to_be_bytes::<32>());
}

/// Push `words` in order, so the last one ends on top, then run `tail` and
/// STOP.
pub fn words_then(words: &[U256], tail: &[u8]) -> Bytes {
  let mut code = Vec::with_capacity(33 * words.len() + tail.len() + 1);
  for word in words {
    push_word(&mut code, *word);
  }
  code.extend_from_slice(tail);
  code.push(opcode::STOP);
  Bytes::from(code)
}

/// `op(a)`.
pub fn unary_op_code(op: u8, a: U256) -> Bytes {
  words_then(&[a], &[op])
}

/// `op(a, b)`.
pub fn binary_op_code(op: u8, a: U256, b: U256) -> Bytes {
  words_then(&[b, a], &[op])
}

/// `op(a, b, n)`, as in `ADDMOD(a, b, n)`.
pub fn ternary_op_code(op: u8, a: U256, b: U256, n: U256) -> Bytes {
  words_then(&[n, b, a], &[op])
}

/// `MSTORE(word_at, word); MSTORE8(byte_at, byte); MLOAD(load_at)`.
pub fn memory_code(word_at: u16, word: U256, byte_at: u16, byte: U256, load_at: u16) -> Bytes {
  let mut code = Vec::new();
  push_word(&mut code, word);
  push_word(&mut code, U256::from(word_at));
  code.push(opcode::MSTORE);
  push_word(&mut code, byte);
  push_word(&mut code, U256::from(byte_at));
  code.push(opcode::MSTORE8);
  push_word(&mut code, U256::from(load_at));
  code.extend_from_slice(&[opcode::MLOAD, opcode::STOP]);
  Bytes::from(code)
}

/// `CALL(gas, target, 0, 0, 0, 0, 0); STOP`.
pub fn call_code(target: Address) -> Bytes {
  let mut code = Vec::with_capacity(5 * 2 + 21 + 3);
  for _ in 0..5 {
    code.extend_from_slice(&[opcode::PUSH1, 0x00]);
  }
  code.push(opcode::PUSH20);
  code.extend_from_slice(target.as_slice());
  code.extend_from_slice(&[opcode::GAS, opcode::CALL, opcode::STOP]);
  Bytes::from(code)
}

/// [`call_code`] with the target pushed as a full word, high bits included.
pub fn call_word_code(target: U256) -> Bytes {
  let mut code = Vec::with_capacity(5 * 2 + 33 + 3);
  for _ in 0..5 {
    code.extend_from_slice(&[opcode::PUSH1, 0x00]);
  }
  push_word(&mut code, target);
  code.extend_from_slice(&[opcode::GAS, opcode::CALL, opcode::STOP]);
  Bytes::from(code)
}

/// Calls itself with the word `0x2a` as calldata. The inner frame returns
/// `calldata[0] + 1`; the outer frame stores the call's output at key 0 and
/// the same bytes read through RETURNDATACOPY at key 1.
pub fn echo_call_code() -> Bytes {
  const INNER: u8 = 45;
  let code = vec![
    // Inner frame when the caller is the contract itself.
    opcode::CALLER, opcode::ADDRESS, opcode::EQ, opcode::PUSH1, INNER, opcode::JUMPI,
    opcode::PUSH1, 0x2a, opcode::PUSH1, 0x00, opcode::MSTORE,
    // CALL(gas, self, 0, args [0, 32), out [32, 64))
    opcode::PUSH1, 0x20, opcode::PUSH1, 0x20, opcode::PUSH1, 0x20, opcode::PUSH1, 0x00,
    opcode::PUSH1, 0x00, opcode::ADDRESS, opcode::GAS, opcode::CALL,
    opcode::POP,
    opcode::PUSH1, 0x20, opcode::MLOAD, opcode::PUSH1, 0x00, opcode::SSTORE,
    opcode::PUSH1, 0x20, opcode::PUSH1, 0x00, opcode::PUSH1, 0x40, opcode::RETURNDATACOPY,
    opcode::PUSH1, 0x40, opcode::MLOAD, opcode::PUSH1, 0x01, opcode::SSTORE,
    opcode::STOP,
    // INNER
    opcode::JUMPDEST,
    opcode::PUSH1, 0x00, opcode::CALLDATALOAD, opcode::PUSH1, 0x01, opcode::ADD,
    opcode::PUSH1, 0x00, opcode::MSTORE,
    opcode::PUSH1, 0x20, opcode::PUSH1, 0x00, opcode::RETURN,
  ];
  debug_assert_eq!(code[usize::from(INNER)], opcode::JUMPDEST);
  Bytes::from(code)
}

/// Calls itself; the inner frame stores 7 at key 0 and reverts. The outer
/// frame stores the call's success flag at key 1.
pub fn reverting_call_code() -> Bytes {
  const INNER: u8 = 23;
  let code = vec![
    opcode::CALLER, opcode::ADDRESS, opcode::EQ, opcode::PUSH1, INNER, opcode::JUMPI,
    opcode::PUSH1, 0x00, opcode::PUSH1, 0x00, opcode::PUSH1, 0x00, opcode::PUSH1, 0x00,
    opcode::PUSH1, 0x00, opcode::ADDRESS, opcode::GAS, opcode::CALL,
    opcode::PUSH1, 0x01, opcode::SSTORE,
    opcode::STOP,
    // INNER
    opcode::JUMPDEST,
    opcode::PUSH1, 0x07, opcode::PUSH1, 0x00, opcode::SSTORE,
    opcode::PUSH1, 0x00, opcode::PUSH1, 0x00, opcode::REVERT,
  ];
  debug_assert_eq!(code[usize::from(INNER)], opcode::JUMPDEST);
  Bytes::from(code)
}

/// Channel of two participants over one contract, with the sender holding
/// `sender_balance` and the recipient `recipient_balance`.
#[derive(Debug, Clone)]
pub struct Channel {
  pub key: SigningKey,
  pub sender: Address,
  pub recipient: Address,
  pub contract: Address,
  pub snapshot: StateSnapshot,
}

impl Channel {
  pub fn open(sender_balance: u64, recipient_balance: u64) -> Result<Self> {
    let key = SigningKey::from_seed(0x5eed);
    let sender = address_of(&key.public_key());
    let recipient = Address::repeat_byte(0x42);
    let contract = Address::repeat_byte(0xc0);
    let snapshot = StateSnapshot::genesis(
      contract,
      &[
        (address_to_word(sender), U256::from(sender_balance)),
        (address_to_word(recipient), U256::from(recipient_balance)),
      ],
      &[sender, recipient],
      2,
    )?;
    Ok(Self { key, sender, recipient, contract, snapshot })
  }

  /// Signed transfer of `amount` to the recipient at the sender's current
  /// nonce.
  pub fn transfer(&self, amount: u64) -> L2Transaction {
    let mut inputs = [U256::ZERO; TRANSACTION_INPUTS];
    inputs[0] = address_to_word(self.recipient);
    inputs[1] = U256::from(amount);
    let nonce = self.snapshot.nonce(self.sender).unwrap_or(0);
    L2Transaction::signed(&self.key, nonce, self.contract, TRANSFER_SELECTOR, inputs)
  }

  pub fn balance(&self, holder: Address) -> U256 {
    self.snapshot.value(address_to_word(holder)).unwrap_or(U256::ZERO)
  }
}
