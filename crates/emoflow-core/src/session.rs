//! The deep-session saga and flow attachment.
//!
//! A deep session derives a new note from one to three existing notes and
//! links them into a flow. The store offers no cross-table transaction, so the
//! write path is a sequence of independently committed steps:
//!
//! 1. resolve the flow (create one and attach the sources, or reuse the
//!    caller's flow after checking membership),
//! 2. insert the new note into that flow,
//! 3. insert the thought, alternative and optional cognitive-error details,
//! 4. insert one middle per source note.
//!
//! Steps 3 and 4 touch disjoint rows and run concurrently. A failure after
//! the first write is reported as a [`SagaFailure`] naming every failed step
//! and the ids created so far; nothing is rolled back.

use std::fmt;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  BoxError,
  flow::{NewFlow, NewMiddle},
  id::RawId,
  note::{NewCognitiveError, NewNote, NewThought, Note},
  owner::Owner,
  store::NoteStore,
};

/// Upper bound on source notes for one deep session.
pub const MAX_SOURCES: usize = 3;

// ─── Request / outcome ───────────────────────────────────────────────────────

/// Everything a client submits when completing a deep session.
///
/// String fields default to empty so that missing fields surface as
/// [`SessionError::MissingFields`] rather than a deserialisation failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeepSessionRequest {
  #[serde(default)]
  pub title:                        String,
  #[serde(default)]
  pub trigger_text:                 String,
  #[serde(default)]
  pub emotion:                      String,
  #[serde(default)]
  pub automatic_thought:            String,
  #[serde(default)]
  pub selected_cognitive_error:     Option<String>,
  #[serde(default)]
  pub selected_alternative_thought: String,
  /// The note the session was started from.
  #[serde(default)]
  pub main_id:                      Option<i64>,
  /// Additional notes pulled into the session.
  #[serde(default)]
  pub sub_ids:                      Vec<i64>,
  /// Existing flow to extend; a new flow is created when absent.
  #[serde(default)]
  pub flow_id:                      Option<RawId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOutcome {
  pub note_id: i64,
  pub flow_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachOutcome {
  pub flow_id: i64,
  /// `true` when a new flow was created for the note.
  pub created: bool,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// The kind of row an ownership rejection refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
  Note,
  Flow,
}

impl fmt::Display for Resource {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Note => "note",
      Self::Flow => "flow",
    })
  }
}

/// One write of the saga.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum SagaStep {
  CreateFlow,
  AttachNotes,
  InsertNote,
  InsertThought,
  InsertAlternative,
  InsertCognitiveError,
  InsertMiddle { from_note_id: i64 },
}

impl SagaStep {
  /// Message shown to the user when this step fails.
  pub fn user_message(&self) -> &'static str {
    match self {
      Self::CreateFlow => "흐름을 만들지 못했습니다",
      Self::AttachNotes => "선택한 기록을 흐름에 연결하지 못했습니다",
      Self::InsertNote => "감정 기록을 저장하지 못했습니다",
      Self::InsertThought => "자동적 사고를 저장하지 못했습니다",
      Self::InsertAlternative => "대안적 사고를 저장하지 못했습니다",
      Self::InsertCognitiveError => "인지 오류 정보를 저장하지 못했습니다",
      Self::InsertMiddle { .. } => "연결 정보를 저장하지 못했습니다",
    }
  }
}

impl fmt::Display for SagaStep {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::CreateFlow => f.write_str("create_flow"),
      Self::AttachNotes => f.write_str("attach_notes"),
      Self::InsertNote => f.write_str("insert_note"),
      Self::InsertThought => f.write_str("insert_thought"),
      Self::InsertAlternative => f.write_str("insert_alternative"),
      Self::InsertCognitiveError => f.write_str("insert_cognitive_error"),
      Self::InsertMiddle { from_note_id } => {
        write!(f, "insert_middle({from_note_id})")
      }
    }
  }
}

/// A failed saga step and the reason the store gave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
  #[serde(flatten)]
  pub step:   SagaStep,
  pub reason: String,
}

/// What was written before the saga stopped, and which steps failed.
///
/// `flow_id` and `note_id` are set when those rows were committed; callers
/// must assume the note may exist in a partially linked state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SagaFailure {
  pub flow_id:  Option<i64>,
  pub note_id:  Option<i64>,
  pub failures: Vec<StepFailure>,
}

impl fmt::Display for SagaFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let steps: Vec<String> =
      self.failures.iter().map(|s| s.step.to_string()).collect();
    write!(f, "failed steps: {}", steps.join(", "))
  }
}

#[derive(Debug, Error)]
pub enum SessionError {
  #[error("select between 1 and 3 notes (got {count})")]
  InvalidSelection { count: usize },

  #[error("missing required fields: {}", .0.join(", "))]
  MissingFields(Vec<&'static str>),

  #[error("invalid flow id: {0:?}")]
  InvalidFlowId(String),

  #[error("notes {note_ids:?} are not members of flow {flow_id}")]
  FlowMismatch { flow_id: i64, note_ids: Vec<i64> },

  #[error("{resource} {ids:?} not owned by caller")]
  NotOwned { resource: Resource, ids: Vec<i64> },

  #[error("partial write: {0}")]
  Saga(SagaFailure),

  /// A read during validation failed; nothing was written.
  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl SessionError {
  /// `true` for rejections raised before any write was attempted.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::InvalidSelection { .. }
        | Self::MissingFields(_)
        | Self::InvalidFlowId(_)
        | Self::FlowMismatch { .. }
    )
  }
}

// ─── Validation ──────────────────────────────────────────────────────────────

/// A request that passed every check that needs no store access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
  /// Distinct source ids, main note first.
  pub sources:         Vec<i64>,
  pub flow_id:         Option<i64>,
  pub note:            NewNote,
  pub thought:         NewThought,
  pub alternative:     String,
  pub cognitive_error: Option<String>,
}

impl SessionPlan {
  /// Check selection size, required fields and the flow id, in that order.
  pub fn validate(request: DeepSessionRequest) -> Result<Self, SessionError> {
    let mut sources: Vec<i64> = Vec::with_capacity(1 + request.sub_ids.len());
    for id in request.main_id.into_iter().chain(request.sub_ids) {
      if !sources.contains(&id) {
        sources.push(id);
      }
    }
    if sources.is_empty() || sources.len() > MAX_SOURCES {
      return Err(SessionError::InvalidSelection { count: sources.len() });
    }

    let required = [
      ("title", &request.title),
      ("trigger_text", &request.trigger_text),
      ("emotion", &request.emotion),
      ("automatic_thought", &request.automatic_thought),
      ("selected_alternative_thought", &request.selected_alternative_thought),
    ];
    let missing: Vec<&'static str> = required
      .iter()
      .filter(|(_, value)| value.trim().is_empty())
      .map(|(name, _)| *name)
      .collect();
    if !missing.is_empty() {
      return Err(SessionError::MissingFields(missing));
    }

    let flow_id = request
      .flow_id
      .as_ref()
      .map(|raw| {
        raw.parse().map_err(|_| SessionError::InvalidFlowId(raw_text(raw)))
      })
      .transpose()?;

    let cognitive_error = request
      .selected_cognitive_error
      .map(|label| label.trim().to_owned())
      .filter(|label| !label.is_empty());

    Ok(Self {
      sources,
      flow_id,
      note: NewNote {
        title:        request.title.trim().to_owned(),
        trigger_text: request.trigger_text.trim().to_owned(),
      },
      thought: NewThought {
        emotion:           request.emotion.trim().to_owned(),
        automatic_thought: request.automatic_thought.trim().to_owned(),
      },
      alternative: request.selected_alternative_thought.trim().to_owned(),
      cognitive_error,
    })
  }
}

fn raw_text(raw: &RawId) -> String {
  match raw {
    RawId::Number(n) => n.to_string(),
    RawId::Text(s) => s.clone(),
  }
}

fn store_error<E>(e: E) -> SessionError
where
  E: std::error::Error + Send + Sync + 'static,
{
  SessionError::Store(Box::new(e))
}

// ─── Deep session ────────────────────────────────────────────────────────────

/// Create a note from a deep session and link it into a flow.
pub async fn create_deep_session<S>(
  store: &S,
  owner: &Owner,
  request: DeepSessionRequest,
) -> Result<SessionOutcome, SessionError>
where
  S: NoteStore,
{
  let plan = SessionPlan::validate(request)?;
  let sources = check_sources(store, owner, &plan).await?;

  let flow_id = match plan.flow_id {
    Some(flow_id) => flow_id,
    None => {
      // The flow inherits the main note's title and situation.
      let main = &sources[0];
      let new_flow = NewFlow {
        title:       Some(main.title.clone()),
        description: Some(main.trigger_text.clone()),
      };
      open_flow(store, owner, new_flow, plan.sources.clone()).await?
    }
  };

  let note = store
    .insert_note(owner.clone(), plan.note.clone(), Some(flow_id))
    .await
    .map_err(|e| {
      error!(%owner, flow_id, error = %e, "deep session: note insert failed");
      SessionError::Saga(SagaFailure {
        flow_id:  Some(flow_id),
        note_id:  None,
        failures: vec![StepFailure {
          step:   SagaStep::InsertNote,
          reason: e.to_string(),
        }],
      })
    })?;

  let failures = write_links(store, owner, &plan, flow_id, note.id).await;
  if !failures.is_empty() {
    error!(
      %owner,
      flow_id,
      note_id = note.id,
      failed = failures.len(),
      "deep session left a partially linked note"
    );
    return Err(SessionError::Saga(SagaFailure {
      flow_id: Some(flow_id),
      note_id: Some(note.id),
      failures,
    }));
  }

  info!(%owner, flow_id, note_id = note.id, sources = ?plan.sources, "deep session created");
  Ok(SessionOutcome { note_id: note.id, flow_id })
}

/// Read-only checks: ownership of every source and, for an existing flow,
/// ownership of the flow and membership of every source. Returns the source
/// notes in selection order.
async fn check_sources<S>(
  store: &S,
  owner: &Owner,
  plan: &SessionPlan,
) -> Result<Vec<Note>, SessionError>
where
  S: NoteStore,
{
  let found = store
    .get_notes(owner.clone(), plan.sources.clone())
    .await
    .map_err(|e| {
      error!(%owner, sources = ?plan.sources, error = %e, "failed to load source notes");
      store_error(e)
    })?;

  let mut ordered = Vec::with_capacity(plan.sources.len());
  let mut missing = Vec::new();
  for id in &plan.sources {
    match found.iter().find(|n| n.id == *id) {
      Some(note) => ordered.push(note.clone()),
      None => missing.push(*id),
    }
  }
  if !missing.is_empty() {
    warn!(%owner, ?missing, "deep session references foreign or absent notes");
    return Err(SessionError::NotOwned { resource: Resource::Note, ids: missing });
  }

  if let Some(flow_id) = plan.flow_id {
    let flow = store
      .get_flow(owner.clone(), flow_id)
      .await
      .map_err(store_error)?;
    if flow.is_none() {
      return Err(SessionError::NotOwned {
        resource: Resource::Flow,
        ids:      vec![flow_id],
      });
    }

    let members = store
      .flow_note_ids(owner.clone(), flow_id)
      .await
      .map_err(store_error)?;
    let outside: Vec<i64> = plan
      .sources
      .iter()
      .copied()
      .filter(|id| !members.contains(id))
      .collect();
    if !outside.is_empty() {
      debug!(%owner, flow_id, ?outside, "selection does not match flow");
      return Err(SessionError::FlowMismatch { flow_id, note_ids: outside });
    }
  }

  Ok(ordered)
}

/// Create a flow and attach `note_ids` to it.
async fn open_flow<S>(
  store: &S,
  owner: &Owner,
  new_flow: NewFlow,
  note_ids: Vec<i64>,
) -> Result<i64, SessionError>
where
  S: NoteStore,
{
  let flow = store
    .create_flow(owner.clone(), new_flow)
    .await
    .map_err(|e| {
      error!(%owner, error = %e, "flow creation failed");
      SessionError::Saga(SagaFailure {
        flow_id:  None,
        note_id:  None,
        failures: vec![StepFailure {
          step:   SagaStep::CreateFlow,
          reason: e.to_string(),
        }],
      })
    })?;

  attach(store, owner, flow.id, note_ids).await?;
  debug!(%owner, flow_id = flow.id, "flow opened");
  Ok(flow.id)
}

/// Attach notes and treat any id left unattached as a failure of the
/// attach step.
async fn attach<S>(
  store: &S,
  owner: &Owner,
  flow_id: i64,
  note_ids: Vec<i64>,
) -> Result<(), SessionError>
where
  S: NoteStore,
{
  let failed = |reason: String| {
    SessionError::Saga(SagaFailure {
      flow_id:  Some(flow_id),
      note_id:  None,
      failures: vec![StepFailure { step: SagaStep::AttachNotes, reason }],
    })
  };

  let attached = store
    .attach_notes(owner.clone(), flow_id, note_ids.clone())
    .await
    .map_err(|e| {
      error!(%owner, flow_id, ?note_ids, error = %e, "attach failed");
      failed(e.to_string())
    })?;

  let unattached: Vec<i64> = note_ids
    .into_iter()
    .filter(|id| !attached.contains(id))
    .collect();
  if !unattached.is_empty() {
    error!(%owner, flow_id, ?unattached, "attach was partial");
    return Err(failed(format!("notes {unattached:?} were not attached")));
  }
  Ok(())
}

/// Steps 3 and 4: detail rows and middles, issued together.
async fn write_links<S>(
  store: &S,
  owner: &Owner,
  plan: &SessionPlan,
  flow_id: i64,
  note_id: i64,
) -> Vec<StepFailure>
where
  S: NoteStore,
{
  let cognitive_error = async {
    match &plan.cognitive_error {
      Some(label) => Some(
        store
          .insert_cognitive_error(note_id, NewCognitiveError {
            label:       label.clone(),
            description: None,
          })
          .await,
      ),
      None => None,
    }
  };

  let middles = join_all(plan.sources.iter().map(|&from_note_id| {
    let insert = store.insert_middle(owner.clone(), NewMiddle {
      from_note_id,
      to_note_id: note_id,
      flow_id,
    });
    async move { (from_note_id, insert.await) }
  }));

  let (thought, alternative, cognitive_error, middles) = futures::join!(
    store.insert_thought(note_id, plan.thought.clone()),
    store.insert_alternative(note_id, plan.alternative.clone()),
    cognitive_error,
    middles,
  );

  let mut failures = Vec::new();
  record(&mut failures, note_id, SagaStep::InsertThought, thought);
  record(&mut failures, note_id, SagaStep::InsertAlternative, alternative);
  if let Some(result) = cognitive_error {
    record(&mut failures, note_id, SagaStep::InsertCognitiveError, result);
  }
  for (from_note_id, result) in middles {
    record(&mut failures, note_id, SagaStep::InsertMiddle { from_note_id }, result);
  }
  failures
}

fn record<T, E: fmt::Display>(
  failures: &mut Vec<StepFailure>,
  note_id: i64,
  step: SagaStep,
  result: Result<T, E>,
) {
  if let Err(e) = result {
    warn!(note_id, %step, error = %e, "saga step failed");
    failures.push(StepFailure { step, reason: e.to_string() });
  }
}

// ─── Attach to flow ──────────────────────────────────────────────────────────

/// Put a single note into a flow.
///
/// Without `flow_id`, a new flow named after the note is created. With one,
/// both the note and the flow must belong to `owner`; re-attaching a member
/// succeeds without changes.
pub async fn attach_to_flow<S>(
  store: &S,
  owner: &Owner,
  note_id: i64,
  flow_id: Option<RawId>,
) -> Result<AttachOutcome, SessionError>
where
  S: NoteStore,
{
  let flow_id = flow_id
    .as_ref()
    .map(|raw| {
      raw.parse().map_err(|_| SessionError::InvalidFlowId(raw_text(raw)))
    })
    .transpose()?;

  let note = store
    .get_notes(owner.clone(), vec![note_id])
    .await
    .map_err(store_error)?
    .into_iter()
    .next()
    .ok_or(SessionError::NotOwned {
      resource: Resource::Note,
      ids:      vec![note_id],
    })?;

  match flow_id {
    Some(flow_id) => {
      store
        .get_flow(owner.clone(), flow_id)
        .await
        .map_err(store_error)?
        .ok_or(SessionError::NotOwned {
          resource: Resource::Flow,
          ids:      vec![flow_id],
        })?;
      attach(store, owner, flow_id, vec![note.id]).await?;
      info!(%owner, flow_id, note_id, "note attached to flow");
      Ok(AttachOutcome { flow_id, created: false })
    }
    None => {
      let new_flow = NewFlow {
        title:       Some(note.title.clone()),
        description: Some(note.trigger_text.clone()),
      };
      let flow_id = open_flow(store, owner, new_flow, vec![note.id]).await?;
      info!(%owner, flow_id, note_id, "flow created from note");
      Ok(AttachOutcome { flow_id, created: true })
    }
  }
}
