use std::sync::Arc;

use serde::Deserialize;

use crate::catalog::SubcircuitCatalog;
use crate::error::{Result, SynthError};

/// Tunables of one synthesis run.
///
/// The batch sizes decide how many bits a single ladder placement consumes;
/// both must divide 256 so every ladder has a fixed number of rows.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SynthesizerOptions {
  /// Depth of the 4-ary storage Merkle tree.
  pub merkle_depth: usize,
  /// Exponent bits per `SubExpBatch` placement.
  pub exp_batch_bits: usize,
  /// Scalar bits per `JubjubExpBatch` placement.
  pub jubjub_batch_bits: usize,
  /// Maximum inputs of one `Accumulator` placement.
  pub accumulator_inputs: usize,
  #[serde(skip)]
  pub catalog: Arc<SubcircuitCatalog>,
}

impl Default for SynthesizerOptions {
  fn default() -> Self {
    Self {
      merkle_depth: 2,
      exp_batch_bits: 8,
      jubjub_batch_bits: 32,
      accumulator_inputs: 32,
      catalog: Arc::new(SubcircuitCatalog::standard()),
    }
  }
}

impl SynthesizerOptions {
  pub fn from_json(json: &str) -> Result<Self> {
    let options: Self = serde_json::from_str(json)?;
    options.validate()?;
    Ok(options)
  }

  pub fn with_catalog(mut self, catalog: SubcircuitCatalog) -> Self {
    self.catalog = Arc::new(catalog);
    self
  }

  pub fn validate(&self) -> Result<()> {
    for (name, bits) in
      [("exp_batch_bits", self.exp_batch_bits), ("jubjub_batch_bits", self.jubjub_batch_bits)]
    {
      if bits == 0 || 256 % bits != 0 {
        return Err(SynthError::Config(format!("{name} = {bits} does not divide 256")));
      }
    }
    if !(1..=8).contains(&self.merkle_depth) {
      return Err(SynthError::Config(format!(
        "merkle_depth = {} is outside 1..=8",
        self.merkle_depth
      )));
    }
    if self.accumulator_inputs < 2 {
      return Err(SynthError::Config("accumulator_inputs must be at least 2".to_string()));
    }
    Ok(())
  }

  /// Leaves of the storage tree.
  pub fn merkle_leaves(&self) -> usize {
    4usize.pow(self.merkle_depth as u32)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn json_overrides_defaults() {
    let options = SynthesizerOptions::from_json(r#"{"exp_batch_bits": 16}"#).expect("options");
    assert_eq!(options.exp_batch_bits, 16);
    assert_eq!(options.merkle_depth, 2);
    assert_eq!(options.merkle_leaves(), 16);
  }

  #[test]
  fn batch_must_divide_word() {
    let err = SynthesizerOptions::from_json(r#"{"jubjub_batch_bits": 30}"#).unwrap_err();
    assert!(matches!(err, SynthError::Config(_)));
  }
}
