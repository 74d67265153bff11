//! The subcircuit template catalog and the capacities it declares.
//!
//! Templates are authored elsewhere; the synthesizer only needs each
//! template's id, the per-buffer wire capacity and the placement limit.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SynthError};
use crate::wire::BufferKind;

/// Names of every template the synthesizer can instantiate, in standard id order.
pub const TEMPLATE_NAMES: [&str; 19] = [
  "bufferPubOut",
  "bufferPubIn",
  "bufferPrvOut",
  "bufferPrvIn",
  "ALU1",
  "ALU2",
  "ALU3",
  "ALU4",
  "ALU5",
  "AND",
  "OR",
  "XOR",
  "DecToBit",
  "SubExpBatch",
  "Accumulator",
  "Poseidon",
  "JubjubExpBatch",
  "EdDsaVerify",
  "VerifyMerkleRoot",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateInfo {
  pub id: usize,
  pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferCapacities {
  pub public_out: usize,
  pub public_in: usize,
  pub private_out: usize,
  pub private_in: usize,
}

impl BufferCapacities {
  pub fn of(&self, kind: BufferKind) -> usize {
    match kind {
      BufferKind::PublicOut => self.public_out,
      BufferKind::PublicIn => self.public_in,
      BufferKind::PrivateOut => self.private_out,
      BufferKind::PrivateIn => self.private_in,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CatalogFile {
  version: String,
  max_placements: usize,
  capacities: BufferCapacities,
  templates: Vec<TemplateInfo>,
}

#[derive(Debug, Clone)]
pub struct SubcircuitCatalog {
  version: String,
  max_placements: usize,
  capacities: BufferCapacities,
  ids: HashMap<&'static str, usize>,
}

impl SubcircuitCatalog {
  /// Built-in library matching the standard template set.
  pub fn standard() -> Self {
    let ids = TEMPLATE_NAMES
      .iter()
      .enumerate()
      .map(|(id, name)| (*name, id))
      .collect();
    Self {
      version: "standard-1".to_string(),
      max_placements: 4096,
      capacities: BufferCapacities {
        public_out: 512,
        public_in: 1024,
        private_out: 256,
        private_in: 512,
      },
      ids,
    }
  }

  pub fn from_json(json: &str) -> Result<Self> {
    let file: CatalogFile = serde_json::from_str(json)?;
    let mut ids = HashMap::with_capacity(file.templates.len());
    let mut seen = HashMap::with_capacity(file.templates.len());
    for template in &file.templates {
      let Some(name) = known_template(&template.name) else {
        return Err(SynthError::Catalog(format!("unknown template {:?}", template.name)));
      };
      if let Some(previous) = seen.insert(template.id, name) {
        return Err(SynthError::Catalog(format!(
          "template id {} assigned to both {previous} and {name}",
          template.id
        )));
      }
      ids.insert(name, template.id);
    }
    if file.max_placements == 0 {
      return Err(SynthError::Catalog("max_placements must be positive".to_string()));
    }
    Ok(Self {
      version: file.version,
      max_placements: file.max_placements,
      capacities: file.capacities,
      ids,
    })
  }

  pub fn to_json(&self) -> Result<String> {
    let mut templates: Vec<TemplateInfo> =
      self.ids.iter().map(|(name, id)| TemplateInfo { id: *id, name: name.to_string() }).collect();
    templates.sort_by_key(|template| template.id);
    let file = CatalogFile {
      version: self.version.clone(),
      max_placements: self.max_placements,
      capacities: self.capacities.clone(),
      templates,
    };
    Ok(serde_json::to_string_pretty(&file)?)
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn max_placements(&self) -> usize {
    self.max_placements
  }

  pub fn capacity(&self, kind: BufferKind) -> usize {
    self.capacities.of(kind)
  }

  pub fn template_id(&self, name: &str) -> Result<usize> {
    self
      .ids
      .get(name)
      .copied()
      .ok_or_else(|| SynthError::Catalog(format!("template {name} is missing from the catalog")))
  }

  /// Override the declared limits, keeping the template ids.
  pub fn with_limits(mut self, capacities: BufferCapacities, max_placements: usize) -> Self {
    self.capacities = capacities;
    self.max_placements = max_placements;
    self
  }
}

impl Default for SubcircuitCatalog {
  fn default() -> Self {
    Self::standard()
  }
}

fn known_template(name: &str) -> Option<&'static str> {
  TEMPLATE_NAMES.iter().find(|known| **known == name).copied()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn standard_catalog_survives_json() {
    let catalog = SubcircuitCatalog::standard();
    let json = catalog.to_json().expect("serialize catalog");
    let parsed = SubcircuitCatalog::from_json(&json).expect("parse catalog");
    assert_eq!(parsed.template_id("ALU1").expect("ALU1"), 4);
    assert_eq!(parsed.template_id("VerifyMerkleRoot").expect("root check"), 18);
    assert_eq!(parsed.capacity(BufferKind::PrivateIn), 512);
  }

  #[test]
  fn unknown_template_is_rejected() {
    let json = r#"{
      "version": "x", "max_placements": 10,
      "capacities": {"public_out": 1, "public_in": 1, "private_out": 1, "private_in": 1},
      "templates": [{"id": 0, "name": "Keccak"}]
    }"#;
    assert!(matches!(SubcircuitCatalog::from_json(json), Err(SynthError::Catalog(_))));
  }
}
