//! Parsing of caller-supplied row ids.
//!
//! Ids arrive from clients either as JSON numbers or as strings (path
//! segments, form values). Both must denote a positive integer.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An id as sent by a client, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
  Number(i64),
  Text(String),
}

impl RawId {
  pub fn parse(&self) -> Result<i64> {
    match self {
      Self::Number(n) if *n > 0 => Ok(*n),
      Self::Number(n) => Err(Error::InvalidId(n.to_string())),
      Self::Text(s) => parse_id(s),
    }
  }
}

impl From<i64> for RawId {
  fn from(n: i64) -> Self { Self::Number(n) }
}

/// Parse a textual id; surrounding whitespace is ignored.
pub fn parse_id(s: &str) -> Result<i64> {
  s.trim()
    .parse::<i64>()
    .ok()
    .filter(|n| *n > 0)
    .ok_or_else(|| Error::InvalidId(s.to_owned()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn accepts_positive_numbers_and_numeric_strings() {
    assert_eq!(RawId::Number(12).parse().unwrap(), 12);
    assert_eq!(RawId::Text(" 42 ".into()).parse().unwrap(), 42);
  }

  #[test]
  fn rejects_garbage_zero_and_negatives() {
    for raw in [
      RawId::Number(0),
      RawId::Number(-3),
      RawId::Text("abc".into()),
      RawId::Text("".into()),
      RawId::Text("1.5".into()),
    ] {
      assert!(matches!(raw.parse(), Err(Error::InvalidId(_))), "{raw:?}");
    }
  }

  #[test]
  fn deserializes_from_number_or_string() {
    let n: RawId = serde_json::from_str("7").unwrap();
    let s: RawId = serde_json::from_str("\"7\"").unwrap();
    assert_eq!(n.parse().unwrap(), s.parse().unwrap());
  }
}
