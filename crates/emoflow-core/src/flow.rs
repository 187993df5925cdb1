//! Flows and middles.
//!
//! A flow is a named container of notes; membership is recorded as explicit
//! `(flow_id, note_id)` pairs. A middle is a directed, append-only edge
//! between two member notes of the same flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::owner::Owner;

/// A named collection of notes connected by middles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
  pub id:          i64,
  pub owner:       Owner,
  pub title:       Option<String>,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::NoteStore::create_flow`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewFlow {
  pub title:       Option<String>,
  pub description: Option<String>,
}

/// "This earlier note fed into this later note."
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Middle {
  pub id:           i64,
  pub owner:        Owner,
  pub from_note_id: i64,
  pub to_note_id:   i64,
  pub flow_id:      i64,
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::NoteStore::insert_middle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewMiddle {
  pub from_note_id: i64,
  pub to_note_id:   i64,
  pub flow_id:      i64,
}
