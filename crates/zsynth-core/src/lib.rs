//! Shadow-execution circuit synthesis for EVM transactions.
//!
//! A concrete interpreter runs the transaction; [`synthesizer::Synthesizer`]
//! mirrors every executed instruction symbolically and records the
//! arithmetic placements that prove it. [`refactor::freeze`] turns the
//! result into the artifact consumed by circuit flattening.

pub mod arith;
pub mod auth;
pub mod buffer;
pub mod catalog;
pub mod config;
pub mod error;
pub mod execute;
pub mod gadget;
mod handlers;
pub mod hex;
pub mod jubjub;
pub mod memory;
pub mod opcode;
pub mod placement;
pub mod poseidon;
pub mod refactor;
pub mod snapshot;
pub mod stack;
pub mod step;
pub mod storage;
pub mod synthesizer;
pub mod wire;

pub use auth::L2Transaction;
pub use config::SynthesizerOptions;
pub use error::{Result, SynthError};
pub use execute::synthesize_transaction;
pub use refactor::{FrozenCircuit, freeze};
pub use snapshot::StateSnapshot;
pub use synthesizer::{SynthesizedCircuit, Synthesizer};
