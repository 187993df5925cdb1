//! A recording in-memory [`NoteStore`] for coordinator and query tests.
//!
//! Every trait call is appended to a log so tests can assert which writes
//! happened (or that none did). Failures are injected with [`FailPoint`].

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Mutex,
};

use chrono::{DateTime, Duration, TimeZone as _, Utc};
use thiserror::Error;

use crate::{
  flow::{Flow, Middle, NewFlow, NewMiddle},
  note::{
    Alternative, Behavior, CognitiveError, NewBehavior, NewCognitiveError,
    NewNote, NewThought, Note, NoteDetails, NoteListing, Thought,
  },
  owner::Owner,
  store::{NoteQuery, NoteStore},
};

#[derive(Debug, Error)]
#[error("memory store: {0}")]
pub struct MemoryError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  GetNotes(Vec<i64>),
  GetNoteDetails(Vec<i64>),
  SearchNotes,
  GetFlow(i64),
  FlowNoteIds(i64),
  ListMiddles(i64),
  InsertNote,
  InsertThought(i64),
  InsertAlternative(i64),
  InsertCognitiveError(i64),
  InsertBehavior(i64),
  CreateFlow,
  AttachNotes(Vec<i64>),
  InsertMiddle(i64, i64),
}

impl Call {
  pub fn is_read(&self) -> bool {
    matches!(
      self,
      Self::GetNotes(_)
        | Self::GetNoteDetails(_)
        | Self::SearchNotes
        | Self::GetFlow(_)
        | Self::FlowNoteIds(_)
        | Self::ListMiddles(_)
    )
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FailPoint {
  InsertNote,
  /// Fail the middle whose source is this note.
  InsertMiddleFrom(i64),
  /// Silently leave this note out of an attach.
  SkipAttach(i64),
}

#[derive(Default)]
struct State {
  notes:      BTreeMap<i64, Note>,
  details:    BTreeMap<i64, NoteDetails>,
  flows:      BTreeMap<i64, Flow>,
  members:    BTreeSet<(i64, i64)>,
  middles:    Vec<Middle>,
  next_id:    i64,
  calls:      Vec<Call>,
  fail:       BTreeSet<FailPoint>,
}

impl State {
  fn next(&mut self) -> i64 {
    self.next_id += 1;
    self.next_id
  }

  /// Deterministic, strictly increasing timestamps.
  fn tick(&mut self) -> DateTime<Utc> {
    let n = self.next();
    Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(n)
  }
}

#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
    let mut state = self.state.lock().unwrap();
    f(&mut state)
  }

  // ── Seeding (not logged) ─────────────────────────────────────────────────

  pub fn seed_note(&self, id: i64, owner: &Owner, title: &str) -> Note {
    self.with(|s| {
      s.next_id = s.next_id.max(id);
      let note = Note {
        id,
        owner: owner.clone(),
        title: title.into(),
        trigger_text: format!("{title} 상황"),
        created_at: s.tick(),
      };
      s.notes.insert(id, note.clone());
      s.details.insert(id, NoteDetails::bare(note.clone()));
      note
    })
  }

  pub fn seed_flow(&self, owner: &Owner, members: &[i64]) -> i64 {
    self.with(|s| {
      let id = s.next();
      let created_at = s.tick();
      s.flows.insert(id, Flow {
        id,
        owner: owner.clone(),
        title: None,
        description: None,
        created_at,
      });
      for note_id in members {
        s.members.insert((id, *note_id));
      }
      id
    })
  }

  pub fn seed_middle(&self, owner: &Owner, from: i64, to: i64, flow_id: i64) {
    self.with(|s| {
      let id = s.next();
      let created_at = s.tick();
      s.middles.push(Middle {
        id,
        owner: owner.clone(),
        from_note_id: from,
        to_note_id: to,
        flow_id,
        created_at,
      });
    });
  }

  pub fn details_mut(&self, note_id: i64, f: impl FnOnce(&mut NoteDetails)) {
    self.with(|s| {
      if let Some(d) = s.details.get_mut(&note_id) {
        f(d);
      }
    });
  }

  pub fn fail_at(&self, point: FailPoint) {
    self.with(|s| {
      s.fail.insert(point);
    });
  }

  // ── Inspection ───────────────────────────────────────────────────────────

  pub fn calls(&self) -> Vec<Call> { self.with(|s| s.calls.clone()) }

  pub fn flows(&self) -> Vec<Flow> {
    self.with(|s| s.flows.values().cloned().collect())
  }

  pub fn note(&self, id: i64) -> Option<Note> {
    self.with(|s| s.notes.get(&id).cloned())
  }

  pub fn members(&self, flow_id: i64) -> Vec<i64> {
    self.with(|s| {
      s.members
        .iter()
        .filter(|(f, _)| *f == flow_id)
        .map(|(_, n)| *n)
        .collect()
    })
  }

  pub fn middles(&self) -> Vec<Middle> { self.with(|s| s.middles.clone()) }
}

fn owns_note(s: &State, owner: &Owner, id: i64) -> bool {
  s.notes.get(&id).is_some_and(|n| &n.owner == owner)
}

fn owns_flow(s: &State, owner: &Owner, id: i64) -> bool {
  s.flows.get(&id).is_some_and(|f| &f.owner == owner)
}

impl NoteStore for MemoryStore {
  type Error = MemoryError;

  async fn insert_note(
    &self,
    owner: Owner,
    input: NewNote,
    flow_id: Option<i64>,
  ) -> Result<Note, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertNote);
      if s.fail.contains(&FailPoint::InsertNote) {
        return Err(MemoryError("insert_note refused".into()));
      }
      let id = s.next();
      let note = Note {
        id,
        owner,
        title: input.title,
        trigger_text: input.trigger_text,
        created_at: s.tick(),
      };
      s.notes.insert(id, note.clone());
      s.details.insert(id, NoteDetails::bare(note.clone()));
      if let Some(flow_id) = flow_id {
        s.members.insert((flow_id, id));
      }
      Ok(note)
    })
  }

  async fn get_notes(&self, owner: Owner, ids: Vec<i64>) -> Result<Vec<Note>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::GetNotes(ids.clone()));
      Ok(
        s.notes
          .values()
          .filter(|n| ids.contains(&n.id) && n.owner == owner)
          .cloned()
          .collect(),
      )
    })
  }

  async fn get_note_details(
    &self,
    owner: Owner,
    ids: Vec<i64>,
  ) -> Result<Vec<NoteDetails>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::GetNoteDetails(ids.clone()));
      Ok(
        s.details
          .values()
          .filter(|d| ids.contains(&d.note.id) && d.note.owner == owner)
          .cloned()
          .collect(),
      )
    })
  }

  async fn search_notes(
    &self,
    owner: Owner,
    query: NoteQuery,
  ) -> Result<Vec<NoteListing>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::SearchNotes);
      let listings = s
        .notes
        .values()
        .filter(|n| n.owner == owner)
        .filter(|n| {
          query
            .text
            .as_deref()
            .is_none_or(|t| n.title.contains(t) || n.trigger_text.contains(t))
        })
        .map(|n| NoteListing {
          note:     n.clone(),
          flow_ids: s
            .members
            .iter()
            .filter(|(_, note_id)| *note_id == n.id)
            .map(|(flow_id, _)| *flow_id)
            .collect(),
        })
        .filter(|l| {
          query
            .exclude_flow_id
            .is_none_or(|f| !l.flow_ids.contains(&f))
        })
        .collect();
      Ok(listings)
    })
  }

  async fn insert_thought(&self, note_id: i64, input: NewThought) -> Result<Thought, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertThought(note_id));
      let thought = Thought {
        id: s.next(),
        note_id,
        emotion: input.emotion,
        automatic_thought: input.automatic_thought,
        created_at: s.tick(),
      };
      if let Some(d) = s.details.get_mut(&note_id) {
        d.thoughts.push(thought.clone());
      }
      Ok(thought)
    })
  }

  async fn insert_alternative(
    &self,
    note_id: i64,
    alternative: String,
  ) -> Result<Alternative, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertAlternative(note_id));
      let row = Alternative {
        id: s.next(),
        note_id,
        alternative,
        created_at: s.tick(),
      };
      if let Some(d) = s.details.get_mut(&note_id) {
        d.alternatives.push(row.clone());
      }
      Ok(row)
    })
  }

  async fn insert_cognitive_error(
    &self,
    note_id: i64,
    input: NewCognitiveError,
  ) -> Result<CognitiveError, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertCognitiveError(note_id));
      let row = CognitiveError {
        id: s.next(),
        note_id,
        label: input.label,
        description: input.description,
        created_at: s.tick(),
      };
      if let Some(d) = s.details.get_mut(&note_id) {
        d.errors.push(row.clone());
      }
      Ok(row)
    })
  }

  async fn insert_behavior(
    &self,
    note_id: i64,
    input: NewBehavior,
  ) -> Result<Behavior, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertBehavior(note_id));
      let row = Behavior {
        id: s.next(),
        note_id,
        label: input.label,
        description: input.description,
        created_at: s.tick(),
      };
      if let Some(d) = s.details.get_mut(&note_id) {
        d.behaviors.push(row.clone());
      }
      Ok(row)
    })
  }

  async fn create_flow(&self, owner: Owner, input: NewFlow) -> Result<Flow, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::CreateFlow);
      let flow = Flow {
        id: s.next(),
        owner,
        title: input.title,
        description: input.description,
        created_at: s.tick(),
      };
      s.flows.insert(flow.id, flow.clone());
      Ok(flow)
    })
  }

  async fn get_flow(&self, owner: Owner, flow_id: i64) -> Result<Option<Flow>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::GetFlow(flow_id));
      Ok(s.flows.get(&flow_id).filter(|f| f.owner == owner).cloned())
    })
  }

  async fn attach_notes(
    &self,
    owner: Owner,
    flow_id: i64,
    note_ids: Vec<i64>,
  ) -> Result<Vec<i64>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::AttachNotes(note_ids.clone()));
      if !owns_flow(s, &owner, flow_id) {
        return Ok(Vec::new());
      }
      let mut attached = Vec::new();
      for id in note_ids {
        if s.fail.contains(&FailPoint::SkipAttach(id)) || !owns_note(s, &owner, id) {
          continue;
        }
        s.members.insert((flow_id, id));
        attached.push(id);
      }
      Ok(attached)
    })
  }

  async fn flow_note_ids(&self, owner: Owner, flow_id: i64) -> Result<Vec<i64>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::FlowNoteIds(flow_id));
      if !owns_flow(s, &owner, flow_id) {
        return Ok(Vec::new());
      }
      Ok(
        s.members
          .iter()
          .filter(|(f, _)| *f == flow_id)
          .map(|(_, n)| *n)
          .collect(),
      )
    })
  }

  async fn insert_middle(&self, owner: Owner, input: NewMiddle) -> Result<Middle, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::InsertMiddle(input.from_note_id, input.to_note_id));
      if s.fail.contains(&FailPoint::InsertMiddleFrom(input.from_note_id)) {
        return Err(MemoryError("insert_middle refused".into()));
      }
      if !owns_note(s, &owner, input.from_note_id) || !owns_note(s, &owner, input.to_note_id) {
        return Err(MemoryError("middle endpoints not owned".into()));
      }
      let members = [input.from_note_id, input.to_note_id];
      if !members.iter().all(|n| s.members.contains(&(input.flow_id, *n))) {
        return Err(MemoryError("middle endpoints not in flow".into()));
      }
      let middle = Middle {
        id: s.next(),
        owner,
        from_note_id: input.from_note_id,
        to_note_id: input.to_note_id,
        flow_id: input.flow_id,
        created_at: s.tick(),
      };
      s.middles.push(middle.clone());
      Ok(middle)
    })
  }

  async fn list_middles(&self, owner: Owner, flow_id: i64) -> Result<Vec<Middle>, MemoryError> {
    self.with(|s| {
      s.calls.push(Call::ListMiddles(flow_id));
      let mut middles: Vec<Middle> = s
        .middles
        .iter()
        .filter(|m| m.flow_id == flow_id && m.owner == owner)
        .cloned()
        .collect();
      middles.sort_by_key(|m| (m.created_at, m.id));
      Ok(middles)
    })
  }
}
