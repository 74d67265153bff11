//! Signed L2 transactions and the in-circuit sender proof.
//!
//! The sender is never trusted: the circuit re-derives the EdDSA challenge,
//! checks `s·G = R + e·A` with fixed-length ladders and derives the origin
//! address as the masked hash of the public key. Every later use of
//! ORIGIN/CALLER that matches the sender consumes that derived wire.

use revm::primitives::{Address, U256};
use tracing::instrument;

use crate::arith::Operation;
use crate::buffer::ReservedVariable;
use crate::error::{Result, SynthError};
use crate::gadget::{CircuitBuilder, PointWires};
use crate::jubjub::{JubjubPoint, Signature, SigningKey};
use crate::memory::{MemoryRecord, MemoryWindow, WORD_BYTES};
use crate::poseidon::poseidon4;
use crate::wire::Wire;

/// Signed input words per transaction.
pub const TRANSACTION_INPUTS: usize = 9;
/// Calldata bytes taken by the function selector.
pub const SELECTOR_BYTES: usize = 4;
/// Length of the calldata a transaction presents to the contract.
pub const CALLDATA_LEN: usize = SELECTOR_BYTES + TRANSACTION_INPUTS * WORD_BYTES;

/// `2^160 - 1`.
pub fn address_mask() -> U256 {
  (U256::from(1u64) << 160) - U256::from(1u64)
}

pub fn address_to_word(address: Address) -> U256 {
  U256::from_be_slice(address.as_slice())
}

pub fn word_to_address(word: U256) -> Address {
  Address::from_slice(&word.to_be_bytes::<32>()[12..])
}

/// Address owned by `public_key`.
pub fn address_of(public_key: &JubjubPoint) -> Address {
  let digest = poseidon4([public_key.x, public_key.y, U256::ZERO, U256::ZERO]);
  word_to_address(digest & address_mask())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Transaction {
  pub nonce: u64,
  /// Contract being called.
  pub to: Address,
  pub selector: u32,
  pub inputs: [U256; TRANSACTION_INPUTS],
  pub public_key: JubjubPoint,
  pub signature: Signature,
  /// Declared sender; must match the address derived from `public_key`.
  pub sender: Address,
}

impl L2Transaction {
  /// Build and sign a transaction with `key`.
  pub fn signed(
    key: &SigningKey,
    nonce: u64,
    to: Address,
    selector: u32,
    inputs: [U256; TRANSACTION_INPUTS],
  ) -> Self {
    let public_key = key.public_key();
    let mut tx = Self {
      nonce,
      to,
      selector,
      inputs,
      public_key,
      signature: Signature { randomizer: JubjubPoint::identity(), scalar: U256::ZERO },
      sender: address_of(&public_key),
    };
    tx.signature = key.sign(&tx.message());
    tx
  }

  /// Signed words: nonce, contract, selector, then the inputs.
  pub fn message(&self) -> Vec<U256> {
    let mut words = Vec::with_capacity(3 + TRANSACTION_INPUTS);
    words.push(U256::from(self.nonce));
    words.push(address_to_word(self.to));
    words.push(U256::from(self.selector));
    words.extend_from_slice(&self.inputs);
    words
  }

  /// ABI-style calldata: selector then the input words.
  pub fn calldata(&self) -> Vec<u8> {
    let mut data = Vec::with_capacity(CALLDATA_LEN);
    data.extend_from_slice(&self.selector.to_be_bytes());
    for input in &self.inputs {
      data.extend_from_slice(&input.to_be_bytes::<32>());
    }
    data
  }
}

/// Wires the rest of the transaction builds on.
#[derive(Debug, Clone)]
pub struct AuthenticatedSender {
  pub origin: Wire,
  pub calldata: MemoryWindow,
}

fn into_authentication(err: SynthError) -> SynthError {
  match err {
    SynthError::Gadget { fault, .. } => SynthError::Authentication(fault.to_string()),
    other => other,
  }
}

/// Place the sender proof. `recorded_nonce` is the sender's nonce in the
/// prior state, when the sender is a known participant.
#[instrument(skip_all, fields(sender = %tx.sender, nonce = tx.nonce))]
pub fn place_sender_auth(
  builder: &mut CircuitBuilder,
  tx: &L2Transaction,
  recorded_nonce: Option<u64>,
) -> Result<AuthenticatedSender> {
  if let Some(recorded) = recorded_nonce.filter(|recorded| *recorded != tx.nonce) {
    return Err(SynthError::Authentication(format!(
      "nonce {} does not match recorded nonce {recorded} of {}",
      tx.nonce, tx.sender
    )));
  }

  let buffers = builder.buffers_mut();
  let public_key = PointWires {
    x: buffers.reserved(ReservedVariable::PublicKeyX, tx.public_key.x),
    y: buffers.reserved(ReservedVariable::PublicKeyY, tx.public_key.y),
  };
  let randomizer = PointWires {
    x: buffers.reserved(ReservedVariable::RandomizerX, tx.signature.randomizer.x),
    y: buffers.reserved(ReservedVariable::RandomizerY, tx.signature.randomizer.y),
  };
  let scalar = buffers.reserved(ReservedVariable::SignatureScalar, tx.signature.scalar);
  let nonce = buffers.reserved(ReservedVariable::TransactionNonce, U256::from(tx.nonce));
  let contract = buffers.reserved(ReservedVariable::ContractAddress, address_to_word(tx.to));
  let selector = buffers.reserved(ReservedVariable::FunctionSelector, U256::from(tx.selector));
  let inputs: Vec<Wire> = tx
    .inputs
    .iter()
    .enumerate()
    .map(|(i, value)| buffers.reserved(ReservedVariable::TransactionInput(i as u8), *value))
    .collect();
  let generator = JubjubPoint::generator();
  let base = PointWires {
    x: buffers.reserved(ReservedVariable::JubjubBaseX, generator.x),
    y: buffers.reserved(ReservedVariable::JubjubBaseY, generator.y),
  };

  let mut transcript = vec![
    randomizer.x.clone(),
    randomizer.y.clone(),
    public_key.x.clone(),
    public_key.y.clone(),
    nonce,
    contract,
    selector.clone(),
  ];
  transcript.extend(inputs.iter().cloned());
  let challenge = builder.place_poseidon(&transcript)?;

  let scalar_bits = builder.place(Operation::DecToBit, &[scalar])?;
  let challenge_bits = builder.place(Operation::DecToBit, &[challenge])?;
  let signed = builder.place_jubjub_mul(&base, &scalar_bits).map_err(into_authentication)?;
  let challenged = builder.place_jubjub_mul(&public_key, &challenge_bits).map_err(into_authentication)?;
  builder
    .place(
      Operation::EdDsaVerify,
      &[signed.x, signed.y, randomizer.x, randomizer.y, challenged.x, challenged.y],
    )
    .map_err(into_authentication)?;

  let key_hash = builder.place_poseidon(&[public_key.x, public_key.y])?;
  let mask = builder.buffers_mut().reserved(ReservedVariable::AddressMask, address_mask());
  let origin = builder.place_one(Operation::And, &[mask, key_hash])?;
  if origin.value() != address_to_word(tx.sender) {
    return Err(SynthError::Authentication(format!(
      "derived origin {} differs from declared sender {}",
      word_to_address(origin.value()),
      tx.sender
    )));
  }

  let mut records = vec![MemoryRecord { offset: 0, size: SELECTOR_BYTES, wire: selector }];
  records.extend(inputs.into_iter().enumerate().map(|(i, wire)| MemoryRecord {
    offset: SELECTOR_BYTES + i * WORD_BYTES,
    size: WORD_BYTES,
    wire,
  }));
  let calldata = MemoryWindow::from_records(records, CALLDATA_LEN)?;
  Ok(AuthenticatedSender { origin, calldata })
}
