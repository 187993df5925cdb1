//! Error type for `emoflow-layout`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LayoutError {
  /// Newer input arrived while this layout was in flight; the result was
  /// discarded.
  #[error("layout superseded by newer input")]
  Cancelled,

  #[error("structural solver failed: {0}")]
  Solver(String),

  #[error("invalid color: {0:?}")]
  InvalidColor(String),
}

pub type Result<T, E = LayoutError> = std::result::Result<T, E>;
