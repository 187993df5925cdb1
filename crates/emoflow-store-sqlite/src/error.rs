//! Error type for `emoflow-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] emoflow_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A write referenced a note or flow the caller does not own (or that does
  /// not exist; the two are indistinguishable to the caller).
  #[error("{resource} {id} is not owned by the caller")]
  NotOwned { resource: &'static str, id: i64 },

  /// A middle endpoint is not a member of the middle's flow.
  #[error("note {note_id} is not a member of flow {flow_id}")]
  NotMember { note_id: i64, flow_id: i64 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
