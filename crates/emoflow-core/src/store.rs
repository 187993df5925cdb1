//! The `NoteStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `emoflow-store-sqlite`).
//! The session coordinator, the flow query service and the HTTP layer depend
//! on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  flow::{Flow, Middle, NewFlow, NewMiddle},
  note::{
    Alternative, Behavior, CognitiveError, NewBehavior, NewCognitiveError,
    NewNote, NewThought, Note, NoteDetails, NoteListing, Thought,
  },
  owner::Owner,
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`NoteStore::search_notes`].
#[derive(Debug, Clone, Default)]
pub struct NoteQuery {
  /// Free-text filter over title and trigger text.
  pub text:            Option<String>,
  pub created_after:   Option<DateTime<Utc>>,
  pub created_before:  Option<DateTime<Utc>>,
  /// Leave out notes that are already members of this flow.
  pub exclude_flow_id: Option<i64>,
  pub limit:           Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an emoflow storage backend.
///
/// Every operation that touches notes, flows or middles is scoped to an
/// [`Owner`]: rows belonging to anyone else are invisible, and writes that
/// would reference them are refused or filtered out. Each method is atomic on
/// its own; there is no cross-method transaction.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait NoteStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Notes ─────────────────────────────────────────────────────────────

  /// Insert a note, optionally making it a member of `flow_id` in the same
  /// operation. The id and `created_at` are assigned by the store.
  fn insert_note(
    &self,
    owner: Owner,
    input: NewNote,
    flow_id: Option<i64>,
  ) -> impl Future<Output = Result<Note, Self::Error>> + Send + '_;

  /// Fetch the notes among `ids` that belong to `owner`, ordered by id.
  fn get_notes(
    &self,
    owner: Owner,
    ids: Vec<i64>,
  ) -> impl Future<Output = Result<Vec<Note>, Self::Error>> + Send + '_;

  /// Like [`NoteStore::get_notes`], with every detail child loaded.
  fn get_note_details(
    &self,
    owner: Owner,
    ids: Vec<i64>,
  ) -> impl Future<Output = Result<Vec<NoteDetails>, Self::Error>> + Send + '_;

  /// Search the owner's notes, annotating each hit with its flow ids.
  fn search_notes(
    &self,
    owner: Owner,
    query: NoteQuery,
  ) -> impl Future<Output = Result<Vec<NoteListing>, Self::Error>> + Send + '_;

  // ── Detail rows ───────────────────────────────────────────────────────

  fn insert_thought(
    &self,
    note_id: i64,
    input: NewThought,
  ) -> impl Future<Output = Result<Thought, Self::Error>> + Send + '_;

  fn insert_alternative(
    &self,
    note_id: i64,
    alternative: String,
  ) -> impl Future<Output = Result<Alternative, Self::Error>> + Send + '_;

  fn insert_cognitive_error(
    &self,
    note_id: i64,
    input: NewCognitiveError,
  ) -> impl Future<Output = Result<CognitiveError, Self::Error>> + Send + '_;

  fn insert_behavior(
    &self,
    note_id: i64,
    input: NewBehavior,
  ) -> impl Future<Output = Result<Behavior, Self::Error>> + Send + '_;

  // ── Flows ─────────────────────────────────────────────────────────────

  fn create_flow(
    &self,
    owner: Owner,
    input: NewFlow,
  ) -> impl Future<Output = Result<Flow, Self::Error>> + Send + '_;

  /// Retrieve a flow by id. Returns `None` if it is absent or not owned by
  /// `owner`.
  fn get_flow(
    &self,
    owner: Owner,
    flow_id: i64,
  ) -> impl Future<Output = Result<Option<Flow>, Self::Error>> + Send + '_;

  /// Make `note_ids` members of `flow_id`.
  ///
  /// Notes or flows not owned by `owner` are skipped. Re-attaching an
  /// existing member is a no-op. Returns the requested ids that are members
  /// once the call completes, so callers can detect a partial attach.
  fn attach_notes(
    &self,
    owner: Owner,
    flow_id: i64,
    note_ids: Vec<i64>,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  /// Ids of every member note of the flow, ordered by id.
  fn flow_note_ids(
    &self,
    owner: Owner,
    flow_id: i64,
  ) -> impl Future<Output = Result<Vec<i64>, Self::Error>> + Send + '_;

  // ── Middles (append-only) ────────────────────────────────────────────

  /// Record a directed edge. Both endpoints must be owned by `owner`.
  fn insert_middle(
    &self,
    owner: Owner,
    input: NewMiddle,
  ) -> impl Future<Output = Result<Middle, Self::Error>> + Send + '_;

  /// All middles of a flow, ordered by `created_at` then id.
  fn list_middles(
    &self,
    owner: Owner,
    flow_id: i64,
  ) -> impl Future<Output = Result<Vec<Middle>, Self::Error>> + Send + '_;
}
