//! Hex encodings for words and addresses in JSON artifacts.

use std::str::FromStr;

use revm::primitives::{Address, U256};
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};

pub fn parse_word(text: &str) -> Result<U256, String> {
  let digits = text.strip_prefix("0x").unwrap_or(text);
  U256::from_str_radix(digits, 16).map_err(|err| format!("invalid hex word {text:?}: {err}"))
}

pub mod word {
  use super::*;

  pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:#x}"))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    let text = String::deserialize(deserializer)?;
    parse_word(&text).map_err(<D::Error as DeError>::custom)
  }
}

pub mod words {
  use super::*;

  pub fn serialize<S: Serializer>(values: &[U256], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|value| format!("{value:#x}")))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<U256>, D::Error> {
    Vec::<String>::deserialize(deserializer)?
      .iter()
      .map(|text| parse_word(text).map_err(<D::Error as DeError>::custom))
      .collect()
  }
}

pub mod address {
  use super::*;

  pub fn serialize<S: Serializer>(address: &Address, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&address.to_string())
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
    let text = String::deserialize(deserializer)?;
    Address::from_str(&text).map_err(<D::Error as DeError>::custom)
  }
}

pub mod addresses {
  use super::*;

  pub fn serialize<S: Serializer>(addresses: &[Address], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(addresses.iter().map(Address::to_string))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Address>, D::Error> {
    Vec::<String>::deserialize(deserializer)?
      .iter()
      .map(|text| Address::from_str(text).map_err(<D::Error as DeError>::custom))
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn words_accept_prefixed_and_bare_hex() {
    assert_eq!(parse_word("0xff").expect("prefixed"), U256::from(255u64));
    assert_eq!(parse_word("ff").expect("bare"), U256::from(255u64));
    assert!(parse_word("0xzz").is_err());
  }
}
