//! Instruction set seen by the synthesizer.
//!
//! Raw bytes decode through a 256-entry table into the closed [`Opcode`]
//! enum; bytes with no entry are undefined and refused upstream.

use crate::arith::Operation;
use crate::buffer::BlockField;

// ============================================================
// Opcode bytes
// ============================================================

pub mod byte {
  pub const STOP: u8 = 0x00;
  pub const ADD: u8 = 0x01;
  pub const MUL: u8 = 0x02;
  pub const SUB: u8 = 0x03;
  pub const DIV: u8 = 0x04;
  pub const SDIV: u8 = 0x05;
  pub const MOD: u8 = 0x06;
  pub const SMOD: u8 = 0x07;
  pub const ADDMOD: u8 = 0x08;
  pub const MULMOD: u8 = 0x09;
  pub const EXP: u8 = 0x0a;
  pub const SIGNEXTEND: u8 = 0x0b;
  pub const LT: u8 = 0x10;
  pub const GT: u8 = 0x11;
  pub const SLT: u8 = 0x12;
  pub const SGT: u8 = 0x13;
  pub const EQ: u8 = 0x14;
  pub const ISZERO: u8 = 0x15;
  pub const AND: u8 = 0x16;
  pub const OR: u8 = 0x17;
  pub const XOR: u8 = 0x18;
  pub const NOT: u8 = 0x19;
  pub const BYTE: u8 = 0x1a;
  pub const SHL: u8 = 0x1b;
  pub const SHR: u8 = 0x1c;
  pub const SAR: u8 = 0x1d;
  pub const KECCAK256: u8 = 0x20;
  pub const ADDRESS: u8 = 0x30;
  pub const BALANCE: u8 = 0x31;
  pub const ORIGIN: u8 = 0x32;
  pub const CALLER: u8 = 0x33;
  pub const CALLVALUE: u8 = 0x34;
  pub const CALLDATALOAD: u8 = 0x35;
  pub const CALLDATASIZE: u8 = 0x36;
  pub const CALLDATACOPY: u8 = 0x37;
  pub const CODESIZE: u8 = 0x38;
  pub const CODECOPY: u8 = 0x39;
  pub const GASPRICE: u8 = 0x3a;
  pub const EXTCODESIZE: u8 = 0x3b;
  pub const EXTCODECOPY: u8 = 0x3c;
  pub const RETURNDATASIZE: u8 = 0x3d;
  pub const RETURNDATACOPY: u8 = 0x3e;
  pub const EXTCODEHASH: u8 = 0x3f;
  pub const BLOCKHASH: u8 = 0x40;
  pub const COINBASE: u8 = 0x41;
  pub const TIMESTAMP: u8 = 0x42;
  pub const NUMBER: u8 = 0x43;
  pub const PREVRANDAO: u8 = 0x44;
  pub const GASLIMIT: u8 = 0x45;
  pub const CHAINID: u8 = 0x46;
  pub const SELFBALANCE: u8 = 0x47;
  pub const BASEFEE: u8 = 0x48;
  pub const BLOBHASH: u8 = 0x49;
  pub const BLOBBASEFEE: u8 = 0x4a;
  pub const POP: u8 = 0x50;
  pub const MLOAD: u8 = 0x51;
  pub const MSTORE: u8 = 0x52;
  pub const MSTORE8: u8 = 0x53;
  pub const SLOAD: u8 = 0x54;
  pub const SSTORE: u8 = 0x55;
  pub const JUMP: u8 = 0x56;
  pub const JUMPI: u8 = 0x57;
  pub const PC: u8 = 0x58;
  pub const MSIZE: u8 = 0x59;
  pub const GAS: u8 = 0x5a;
  pub const JUMPDEST: u8 = 0x5b;
  pub const TLOAD: u8 = 0x5c;
  pub const TSTORE: u8 = 0x5d;
  pub const MCOPY: u8 = 0x5e;
  pub const PUSH0: u8 = 0x5f;
  pub const PUSH1: u8 = 0x60;
  pub const PUSH32: u8 = 0x7f;
  pub const DUP1: u8 = 0x80;
  pub const DUP16: u8 = 0x8f;
  pub const SWAP1: u8 = 0x90;
  pub const SWAP16: u8 = 0x9f;
  pub const LOG0: u8 = 0xa0;
  pub const LOG4: u8 = 0xa4;
  pub const CREATE: u8 = 0xf0;
  pub const CALL: u8 = 0xf1;
  pub const CALLCODE: u8 = 0xf2;
  pub const RETURN: u8 = 0xf3;
  pub const DELEGATECALL: u8 = 0xf4;
  pub const CREATE2: u8 = 0xf5;
  pub const STATICCALL: u8 = 0xfa;
  pub const REVERT: u8 = 0xfd;
  pub const INVALID: u8 = 0xfe;
  pub const SELFDESTRUCT: u8 = 0xff;
}

// ============================================================
// Decoded instructions
// ============================================================

/// Environment values pushed by zero-operand context opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextValue {
  Address,
  Origin,
  Caller,
  CallValue,
  CallDataSize,
  CodeSize,
  GasPrice,
  ReturnDataSize,
  SelfBalance,
  BlobBaseFee,
  Pc,
  MSize,
  Gas,
}

/// Environment values derived from one stack operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountQuery {
  Balance,
  ExtCodeSize,
  ExtCodeHash,
  BlobHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
  Call,
  CallCode,
  DelegateCall,
  StaticCall,
}

impl CallKind {
  /// Whether the callee frame writes into the caller's storage.
  pub fn keeps_storage_context(self) -> bool {
    matches!(self, CallKind::CallCode | CallKind::DelegateCall)
  }

  fn stack_inputs(self) -> usize {
    match self {
      CallKind::Call | CallKind::CallCode => 7,
      CallKind::DelegateCall | CallKind::StaticCall => 6,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
  Stop,
  /// Pure ALU instruction mapped one-to-one onto a gadget.
  Alu(Operation),
  Exp,
  Keccak256,
  Context(ContextValue),
  Account(AccountQuery),
  CallDataLoad,
  CallDataCopy,
  CodeCopy,
  ExtCodeCopy,
  ReturnDataCopy,
  BlockHash,
  Block(BlockField),
  Pop,
  MLoad,
  MStore,
  MStore8,
  SLoad,
  SStore,
  Jump,
  JumpI,
  JumpDest,
  TLoad,
  TStore,
  MCopy,
  /// PUSH0..=PUSH32 with its immediate length.
  Push(u8),
  Dup(u8),
  Swap(u8),
  Log(u8),
  Call(CallKind),
  Return,
  Revert,
  Create,
  Create2,
  Invalid,
  SelfDestruct,
}

const fn build_table() -> [Option<Opcode>; 256] {
  use Opcode::*;
  use byte::*;
  let mut table: [Option<Opcode>; 256] = [None; 256];
  table[STOP as usize] = Some(Stop);
  table[ADD as usize] = Some(Alu(Operation::Add));
  table[MUL as usize] = Some(Alu(Operation::Mul));
  table[SUB as usize] = Some(Alu(Operation::Sub));
  table[DIV as usize] = Some(Alu(Operation::Div));
  table[SDIV as usize] = Some(Alu(Operation::SDiv));
  table[MOD as usize] = Some(Alu(Operation::Mod));
  table[SMOD as usize] = Some(Alu(Operation::SMod));
  table[ADDMOD as usize] = Some(Alu(Operation::AddMod));
  table[MULMOD as usize] = Some(Alu(Operation::MulMod));
  table[EXP as usize] = Some(Exp);
  table[SIGNEXTEND as usize] = Some(Alu(Operation::SignExtend));
  table[LT as usize] = Some(Alu(Operation::Lt));
  table[GT as usize] = Some(Alu(Operation::Gt));
  table[SLT as usize] = Some(Alu(Operation::SLt));
  table[SGT as usize] = Some(Alu(Operation::SGt));
  table[EQ as usize] = Some(Alu(Operation::Eq));
  table[ISZERO as usize] = Some(Alu(Operation::IsZero));
  table[AND as usize] = Some(Alu(Operation::And));
  table[OR as usize] = Some(Alu(Operation::Or));
  table[XOR as usize] = Some(Alu(Operation::Xor));
  table[NOT as usize] = Some(Alu(Operation::Not));
  table[BYTE as usize] = Some(Alu(Operation::Byte));
  table[SHL as usize] = Some(Alu(Operation::Shl));
  table[SHR as usize] = Some(Alu(Operation::Shr));
  table[SAR as usize] = Some(Alu(Operation::Sar));
  table[KECCAK256 as usize] = Some(Keccak256);
  table[ADDRESS as usize] = Some(Context(ContextValue::Address));
  table[BALANCE as usize] = Some(Account(AccountQuery::Balance));
  table[ORIGIN as usize] = Some(Context(ContextValue::Origin));
  table[CALLER as usize] = Some(Context(ContextValue::Caller));
  table[CALLVALUE as usize] = Some(Context(ContextValue::CallValue));
  table[CALLDATALOAD as usize] = Some(CallDataLoad);
  table[CALLDATASIZE as usize] = Some(Context(ContextValue::CallDataSize));
  table[CALLDATACOPY as usize] = Some(CallDataCopy);
  table[CODESIZE as usize] = Some(Context(ContextValue::CodeSize));
  table[CODECOPY as usize] = Some(CodeCopy);
  table[GASPRICE as usize] = Some(Context(ContextValue::GasPrice));
  table[EXTCODESIZE as usize] = Some(Account(AccountQuery::ExtCodeSize));
  table[EXTCODECOPY as usize] = Some(ExtCodeCopy);
  table[RETURNDATASIZE as usize] = Some(Context(ContextValue::ReturnDataSize));
  table[RETURNDATACOPY as usize] = Some(ReturnDataCopy);
  table[EXTCODEHASH as usize] = Some(Account(AccountQuery::ExtCodeHash));
  table[BLOCKHASH as usize] = Some(BlockHash);
  table[COINBASE as usize] = Some(Block(BlockField::Coinbase));
  table[TIMESTAMP as usize] = Some(Block(BlockField::Timestamp));
  table[NUMBER as usize] = Some(Block(BlockField::Number));
  table[PREVRANDAO as usize] = Some(Block(BlockField::PrevRandao));
  table[GASLIMIT as usize] = Some(Block(BlockField::GasLimit));
  table[CHAINID as usize] = Some(Block(BlockField::ChainId));
  table[SELFBALANCE as usize] = Some(Context(ContextValue::SelfBalance));
  table[BASEFEE as usize] = Some(Block(BlockField::BaseFee));
  table[BLOBHASH as usize] = Some(Account(AccountQuery::BlobHash));
  table[BLOBBASEFEE as usize] = Some(Context(ContextValue::BlobBaseFee));
  table[POP as usize] = Some(Pop);
  table[MLOAD as usize] = Some(MLoad);
  table[MSTORE as usize] = Some(MStore);
  table[MSTORE8 as usize] = Some(MStore8);
  table[SLOAD as usize] = Some(SLoad);
  table[SSTORE as usize] = Some(SStore);
  table[JUMP as usize] = Some(Jump);
  table[JUMPI as usize] = Some(JumpI);
  table[PC as usize] = Some(Context(ContextValue::Pc));
  table[MSIZE as usize] = Some(Context(ContextValue::MSize));
  table[GAS as usize] = Some(Context(ContextValue::Gas));
  table[JUMPDEST as usize] = Some(JumpDest);
  table[TLOAD as usize] = Some(TLoad);
  table[TSTORE as usize] = Some(TStore);
  table[MCOPY as usize] = Some(MCopy);
  let mut n = 0u8;
  while n <= 32 {
    table[(PUSH0 + n) as usize] = Some(Push(n));
    n += 1;
  }
  n = 0;
  while n < 16 {
    table[(DUP1 + n) as usize] = Some(Dup(n + 1));
    table[(SWAP1 + n) as usize] = Some(Swap(n + 1));
    n += 1;
  }
  n = 0;
  while n <= 4 {
    table[(LOG0 + n) as usize] = Some(Log(n));
    n += 1;
  }
  table[CREATE as usize] = Some(Create);
  table[CALL as usize] = Some(Call(CallKind::Call));
  table[CALLCODE as usize] = Some(Call(CallKind::CallCode));
  table[RETURN as usize] = Some(Return);
  table[DELEGATECALL as usize] = Some(Call(CallKind::DelegateCall));
  table[CREATE2 as usize] = Some(Create2);
  table[STATICCALL as usize] = Some(Call(CallKind::StaticCall));
  table[REVERT as usize] = Some(Revert);
  table[INVALID as usize] = Some(Invalid);
  table[SELFDESTRUCT as usize] = Some(SelfDestruct);
  table
}

static DECODE: [Option<Opcode>; 256] = build_table();

impl Opcode {
  pub fn decode(byte: u8) -> Option<Opcode> {
    DECODE[byte as usize]
  }

  pub fn is_call(self) -> bool {
    matches!(self, Opcode::Call(_))
  }

  /// `(popped, pushed)` stack item counts.
  pub fn stack_io(self) -> (usize, usize) {
    use Opcode::*;
    match self {
      Stop | JumpDest | Invalid => (0, 0),
      Alu(op) => match op {
        Operation::IsZero | Operation::Not => (1, 1),
        Operation::AddMod | Operation::MulMod => (3, 1),
        _ => (2, 1),
      },
      Exp | Keccak256 => (2, 1),
      Context(_) | Block(_) => (0, 1),
      Account(_) | CallDataLoad | BlockHash | MLoad | SLoad | TLoad => (1, 1),
      CallDataCopy | CodeCopy | ReturnDataCopy | MCopy => (3, 0),
      ExtCodeCopy => (4, 0),
      Pop | Jump | SelfDestruct => (1, 0),
      MStore | MStore8 | SStore | TStore | JumpI | Return | Revert => (2, 0),
      Push(_) => (0, 1),
      Dup(n) => (usize::from(n), usize::from(n) + 1),
      Swap(n) => (usize::from(n) + 1, usize::from(n) + 1),
      Log(n) => (2 + usize::from(n), 0),
      Call(kind) => (kind.stack_inputs(), 1),
      Create => (3, 1),
      Create2 => (4, 1),
    }
  }
}
