//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 UTC strings with a fixed number of
//! fractional digits, so that lexical order is chronological order. Owners
//! are split across the nullable `user_id` (hyphenated lowercase UUID) and
//! `device_id` columns.

use chrono::{DateTime, SecondsFormat, Utc};
use emoflow_core::{
  Owner,
  flow::{Flow, Middle},
  note::{Alternative, Behavior, CognitiveError, Note, Thought},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Owner ───────────────────────────────────────────────────────────────────

/// `(user_id, device_id)` column values; exactly one is `Some`.
pub fn encode_owner(owner: &Owner) -> (Option<String>, Option<String>) {
  (
    owner.user_id().map(|id| id.hyphenated().to_string()),
    owner.device_id().map(str::to_owned),
  )
}

pub fn decode_owner(user_id: Option<String>, device_id: Option<String>) -> Result<Owner> {
  let user_id = user_id.as_deref().map(Uuid::parse_str).transpose()?;
  Ok(Owner::from_parts(user_id, device_id)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `notes` row.
pub struct RawNote {
  pub id:           i64,
  pub user_id:      Option<String>,
  pub device_id:    Option<String>,
  pub title:        String,
  pub trigger_text: String,
  pub created_at:   String,
}

impl RawNote {
  pub const COLUMNS: &'static str = "n.id, n.user_id, n.device_id, n.title, n.trigger_text, n.created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      user_id:      row.get(1)?,
      device_id:    row.get(2)?,
      title:        row.get(3)?,
      trigger_text: row.get(4)?,
      created_at:   row.get(5)?,
    })
  }

  pub fn into_note(self) -> Result<Note> {
    Ok(Note {
      id:           self.id,
      owner:        decode_owner(self.user_id, self.device_id)?,
      title:        self.title,
      trigger_text: self.trigger_text,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `flows` row.
pub struct RawFlow {
  pub id:          i64,
  pub user_id:     Option<String>,
  pub device_id:   Option<String>,
  pub title:       Option<String>,
  pub description: Option<String>,
  pub created_at:  String,
}

impl RawFlow {
  pub fn into_flow(self) -> Result<Flow> {
    Ok(Flow {
      id:          self.id,
      owner:       decode_owner(self.user_id, self.device_id)?,
      title:       self.title,
      description: self.description,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `middles` row.
pub struct RawMiddle {
  pub id:           i64,
  pub user_id:      Option<String>,
  pub device_id:    Option<String>,
  pub from_note_id: i64,
  pub to_note_id:   i64,
  pub flow_id:      i64,
  pub created_at:   String,
}

impl RawMiddle {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      user_id:      row.get(1)?,
      device_id:    row.get(2)?,
      from_note_id: row.get(3)?,
      to_note_id:   row.get(4)?,
      flow_id:      row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_middle(self) -> Result<Middle> {
    Ok(Middle {
      id:           self.id,
      owner:        decode_owner(self.user_id, self.device_id)?,
      from_note_id: self.from_note_id,
      to_note_id:   self.to_note_id,
      flow_id:      self.flow_id,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// The detail child rows of a set of notes, timestamps still encoded.
#[derive(Default)]
pub struct RawDetails {
  pub thoughts:     Vec<(i64, i64, String, String, String)>,
  pub errors:       Vec<(i64, i64, String, Option<String>, String)>,
  pub alternatives: Vec<(i64, i64, String, String)>,
  pub behaviors:    Vec<(i64, i64, String, Option<String>, String)>,
}

pub fn decode_thought(
  (id, note_id, emotion, automatic_thought, at): (i64, i64, String, String, String),
) -> Result<Thought> {
  Ok(Thought { id, note_id, emotion, automatic_thought, created_at: decode_dt(&at)? })
}

pub fn decode_cognitive_error(
  (id, note_id, label, description, at): (i64, i64, String, Option<String>, String),
) -> Result<CognitiveError> {
  Ok(CognitiveError { id, note_id, label, description, created_at: decode_dt(&at)? })
}

pub fn decode_alternative(
  (id, note_id, alternative, at): (i64, i64, String, String),
) -> Result<Alternative> {
  Ok(Alternative { id, note_id, alternative, created_at: decode_dt(&at)? })
}

pub fn decode_behavior(
  (id, note_id, label, description, at): (i64, i64, String, Option<String>, String),
) -> Result<Behavior> {
  Ok(Behavior { id, note_id, label, description, created_at: decode_dt(&at)? })
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let early = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
    let late = Utc.timestamp_opt(1_700_000_000, 120_000_000).unwrap();
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
  }

  #[test]
  fn owner_columns() {
    let id = Uuid::new_v4();
    let (user, device) = encode_owner(&Owner::User(id));
    assert_eq!(user.as_deref(), Some(id.hyphenated().to_string().as_str()));
    assert!(device.is_none());
    assert_eq!(decode_owner(user, device).unwrap(), Owner::User(id));

    assert!(decode_owner(None, None).is_err());
    assert!(decode_owner(Some("not-a-uuid".into()), None).is_err());
  }
}
