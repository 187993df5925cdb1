//! Notes: the emotion records that make up a flow.
//!
//! A note's core fields (title, trigger text, owner, creation time) never
//! change after insertion. The reflection itself lives in detail child rows:
//! thoughts, cognitive errors, alternative thoughts and behaviors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::owner::Owner;

// ─── Note ────────────────────────────────────────────────────────────────────

/// A single emotion-reflection record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
  pub id:           i64,
  pub owner:        Owner,
  pub title:        String,
  /// The situation that triggered the emotion.
  pub trigger_text: String,
  /// Server-assigned; never changes after creation.
  pub created_at:   DateTime<Utc>,
}

/// Input to [`crate::store::NoteStore::insert_note`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
  pub title:        String,
  pub trigger_text: String,
}

// ─── Detail rows ─────────────────────────────────────────────────────────────

/// An emotion together with the automatic thought that accompanied it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thought {
  pub id:                i64,
  pub note_id:           i64,
  pub emotion:           String,
  pub automatic_thought: String,
  pub created_at:        DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThought {
  pub emotion:           String,
  pub automatic_thought: String,
}

/// A cognitive-distortion label attached to a note (e.g. "흑백논리").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitiveError {
  pub id:          i64,
  pub note_id:     i64,
  pub label:       String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCognitiveError {
  pub label:       String,
  pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
  pub id:          i64,
  pub note_id:     i64,
  pub alternative: String,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Behavior {
  pub id:          i64,
  pub note_id:     i64,
  pub label:       String,
  pub description: Option<String>,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBehavior {
  pub label:       String,
  pub description: Option<String>,
}

// ─── Read models ─────────────────────────────────────────────────────────────

/// A note bundled with all of its detail children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDetails {
  #[serde(flatten)]
  pub note:         Note,
  pub thoughts:     Vec<Thought>,
  pub errors:       Vec<CognitiveError>,
  pub alternatives: Vec<Alternative>,
  pub behaviors:    Vec<Behavior>,
}

impl NoteDetails {
  pub fn bare(note: Note) -> Self {
    Self {
      note,
      thoughts: Vec::new(),
      errors: Vec::new(),
      alternatives: Vec::new(),
      behaviors: Vec::new(),
    }
  }
}

/// Distinct labels derived from a note's details, for list views.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSets {
  pub emotions:  Vec<String>,
  pub errors:    Vec<String>,
  pub behaviors: Vec<String>,
}

impl LabelSets {
  /// Collect each label kind once, in first-seen order. Blank labels are
  /// skipped.
  pub fn from_details(details: &NoteDetails) -> Self {
    Self {
      emotions:  distinct(details.thoughts.iter().map(|t| t.emotion.as_str())),
      errors:    distinct(details.errors.iter().map(|e| e.label.as_str())),
      behaviors: distinct(details.behaviors.iter().map(|b| b.label.as_str())),
    }
  }
}

fn distinct<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
  let mut out: Vec<String> = Vec::new();
  for label in labels.map(str::trim).filter(|l| !l.is_empty()) {
    if !out.iter().any(|seen| seen == label) {
      out.push(label.to_owned());
    }
  }
  out
}

/// A note with details and label sets, as returned by the flow query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedNote {
  #[serde(flatten)]
  pub details: NoteDetails,
  pub labels:  LabelSets,
}

impl From<NoteDetails> for AnnotatedNote {
  fn from(details: NoteDetails) -> Self {
    let labels = LabelSets::from_details(&details);
    Self { details, labels }
  }
}

/// A search hit for flow selection: the note plus every flow it already
/// belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteListing {
  #[serde(flatten)]
  pub note:     Note,
  pub flow_ids: Vec<i64>,
}
