//! The caller identity every store operation is scoped to.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Who owns a note, flow, or middle: a signed-in user or an anonymous
/// device. Exactly one of the two is ever set on a stored row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Owner {
  User(Uuid),
  Device(String),
}

impl Owner {
  /// Build an owner from the two nullable columns used by storage backends.
  pub fn from_parts(
    user_id: Option<Uuid>,
    device_id: Option<String>,
  ) -> Result<Self> {
    match (user_id, device_id) {
      (Some(user), None) => Ok(Self::User(user)),
      (None, Some(device)) if !device.is_empty() => Ok(Self::Device(device)),
      (Some(_), Some(_)) => Err(Error::AmbiguousOwner),
      _ => Err(Error::MissingOwner),
    }
  }

  pub fn user_id(&self) -> Option<Uuid> {
    match self {
      Self::User(id) => Some(*id),
      Self::Device(_) => None,
    }
  }

  pub fn device_id(&self) -> Option<&str> {
    match self {
      Self::User(_) => None,
      Self::Device(id) => Some(id),
    }
  }
}

impl fmt::Display for Owner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::User(id) => write!(f, "user:{id}"),
      Self::Device(id) => write!(f, "device:{id}"),
    }
  }
}
