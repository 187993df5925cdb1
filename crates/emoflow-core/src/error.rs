//! Error types for `emoflow-core`.

use thiserror::Error;

/// Type-erased error used wherever a backend error crosses a generic boundary.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid id: {0:?}")]
  InvalidId(String),

  #[error("owner identity is missing")]
  MissingOwner,

  #[error("owner identity is ambiguous: both user and device id are set")]
  AmbiguousOwner,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
