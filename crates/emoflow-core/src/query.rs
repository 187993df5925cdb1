//! The flow read model.
//!
//! Absence and foreign ownership are indistinguishable here on purpose: both
//! produce an empty snapshot so that read paths never reveal whether a flow
//! exists.

use serde::{Deserialize, Serialize};

use crate::{
  flow::Middle,
  note::AnnotatedNote,
  owner::Owner,
  store::NoteStore,
};

/// A flow's notes (with details and label sets) and, optionally, its middles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowSnapshot {
  pub notes:   Vec<AnnotatedNote>,
  pub middles: Vec<Middle>,
}

impl FlowSnapshot {
  pub fn is_empty(&self) -> bool { self.notes.is_empty() && self.middles.is_empty() }
}

/// Load everything needed to display a flow.
///
/// Notes are ordered by creation time, then id; middles likewise.
pub async fn get_flow<S>(
  store: &S,
  owner: &Owner,
  flow_id: i64,
  include_middles: bool,
) -> Result<FlowSnapshot, S::Error>
where
  S: NoteStore,
{
  if store.get_flow(owner.clone(), flow_id).await?.is_none() {
    return Ok(FlowSnapshot::default());
  }

  let note_ids = store.flow_note_ids(owner.clone(), flow_id).await?;
  let mut details = if note_ids.is_empty() {
    Vec::new()
  } else {
    store.get_note_details(owner.clone(), note_ids).await?
  };
  details.sort_by_key(|d| (d.note.created_at, d.note.id));

  let mut middles = if include_middles {
    store.list_middles(owner.clone(), flow_id).await?
  } else {
    Vec::new()
  };
  middles.sort_by_key(|m| (m.created_at, m.id));

  Ok(FlowSnapshot {
    notes: details.into_iter().map(AnnotatedNote::from).collect(),
    middles,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    note::{Behavior, CognitiveError, Thought},
    testing::{Call, MemoryStore},
  };

  fn owner() -> Owner { Owner::Device("device-q".into()) }

  #[tokio::test]
  async fn flow_without_members_is_empty() {
    let store = MemoryStore::default();
    let owner = owner();
    let flow_id = store.seed_flow(&owner, &[]);

    let snapshot = get_flow(&store, &owner, flow_id, true).await.unwrap();
    assert_eq!(snapshot, FlowSnapshot::default());
    assert!(!store.calls().iter().any(|c| matches!(c, Call::GetNoteDetails(_))));
  }

  #[tokio::test]
  async fn absent_and_foreign_flows_are_empty() {
    let store = MemoryStore::default();
    let owner = owner();
    store.seed_note(1, &owner, "a");
    let foreign = store.seed_flow(&Owner::Device("other".into()), &[1]);

    assert!(get_flow(&store, &owner, 999, true).await.unwrap().is_empty());
    assert!(get_flow(&store, &owner, foreign, true).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn notes_and_middles_come_back_in_creation_order() {
    let store = MemoryStore::default();
    let owner = owner();
    store.seed_note(1, &owner, "a");
    store.seed_note(2, &owner, "b");
    store.seed_note(3, &owner, "c");
    let flow_id = store.seed_flow(&owner, &[3, 1, 2]);
    store.seed_middle(&owner, 2, 3, flow_id);
    store.seed_middle(&owner, 1, 3, flow_id);

    let snapshot = get_flow(&store, &owner, flow_id, true).await.unwrap();
    let ids: Vec<i64> = snapshot.notes.iter().map(|n| n.details.note.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    let edges: Vec<(i64, i64)> = snapshot
      .middles
      .iter()
      .map(|m| (m.from_note_id, m.to_note_id))
      .collect();
    assert_eq!(edges, vec![(2, 3), (1, 3)]);
  }

  #[tokio::test]
  async fn middles_are_skipped_unless_requested() {
    let store = MemoryStore::default();
    let owner = owner();
    store.seed_note(1, &owner, "a");
    store.seed_note(2, &owner, "b");
    let flow_id = store.seed_flow(&owner, &[1, 2]);
    store.seed_middle(&owner, 1, 2, flow_id);

    let snapshot = get_flow(&store, &owner, flow_id, false).await.unwrap();
    assert_eq!(snapshot.notes.len(), 2);
    assert!(snapshot.middles.is_empty());
    assert!(!store.calls().contains(&Call::ListMiddles(flow_id)));
  }

  #[tokio::test]
  async fn notes_carry_distinct_labels() {
    let store = MemoryStore::default();
    let owner = owner();
    let note = store.seed_note(1, &owner, "a");
    let flow_id = store.seed_flow(&owner, &[1]);
    let at = note.created_at;
    store.details_mut(1, |d| {
      for (i, emotion) in ["분노", "분노", "수치심"].into_iter().enumerate() {
        d.thoughts.push(Thought {
          id: i as i64,
          note_id: 1,
          emotion: emotion.into(),
          automatic_thought: "...".into(),
          created_at: at,
        });
      }
      d.errors.push(CognitiveError {
        id: 10,
        note_id: 1,
        label: "독심술".into(),
        description: None,
        created_at: at,
      });
      d.behaviors.push(Behavior {
        id: 11,
        note_id: 1,
        label: "자리를 피함".into(),
        description: None,
        created_at: at,
      });
    });

    let snapshot = get_flow(&store, &owner, flow_id, false).await.unwrap();
    let labels = &snapshot.notes[0].labels;
    assert_eq!(labels.emotions, vec!["분노", "수치심"]);
    assert_eq!(labels.errors, vec!["독심술"]);
    assert_eq!(labels.behaviors, vec!["자리를 피함"]);
  }
}
