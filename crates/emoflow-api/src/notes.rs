//! Handlers for `/notes` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/notes` | `?query=&from=&to=&exclude_flow_id=&limit=`; returns `{"notes":[...]}`, each hit carrying `flow_ids` |
//! | `POST` | `/notes` | Body: [`CreateNoteBody`]; returns 201 + the note with details |
//!
//! `from` and `to` accept RFC 3339 timestamps or `YYYY-MM-DD` dates. A date
//! given as `to` includes that whole day.

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Days, NaiveDate, Utc};
use emoflow_core::{
  id::parse_id,
  note::{NewBehavior, NewCognitiveError, NewNote, NewThought, NoteDetails, NoteListing},
  store::{NoteQuery, NoteStore},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{ApiState, error::ApiError, identity::Caller};

// ─── Search ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
  pub query:           Option<String>,
  pub from:            Option<String>,
  pub to:              Option<String>,
  pub exclude_flow_id: Option<String>,
  pub limit:           Option<usize>,
}

/// Which end of a range a date bound is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bound {
  Start,
  End,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
  value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_bound(raw: &str, bound: Bound) -> Result<DateTime<Utc>, ApiError> {
  if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
    return Ok(dt.with_timezone(&Utc));
  }
  let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map_err(|_| ApiError::bad_request("invalid_date", format!("invalid date: {raw:?}")))?;
  let day = match bound {
    Bound::Start => Some(date),
    Bound::End => date.checked_add_days(Days::new(1)),
  };
  day
    .and_then(|d| d.and_hms_opt(0, 0, 0))
    .map(|d| d.and_utc())
    .ok_or_else(|| ApiError::bad_request("invalid_date", format!("date out of range: {raw:?}")))
}

impl SearchParams {
  fn into_query(self) -> Result<NoteQuery, ApiError> {
    let exclude_flow_id = non_empty(self.exclude_flow_id.as_deref())
      .map(|raw| {
        parse_id(raw).map_err(|_| {
          ApiError::bad_request("invalid_flow_id", format!("invalid flow id: {raw:?}"))
        })
      })
      .transpose()?;

    Ok(NoteQuery {
      text: non_empty(self.query.as_deref()).map(str::to_owned),
      created_after: non_empty(self.from.as_deref())
        .map(|raw| parse_bound(raw, Bound::Start))
        .transpose()?,
      created_before: non_empty(self.to.as_deref())
        .map(|raw| parse_bound(raw, Bound::End))
        .transpose()?,
      exclude_flow_id,
      limit: self.limit,
    })
  }
}

#[derive(Debug, Default, Serialize)]
pub struct SearchResponse {
  pub notes: Vec<NoteListing>,
}

/// `GET /notes[?query=...][&from=...][&to=...][&exclude_flow_id=...]`
pub async fn search<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let query = params.into_query()?;
  let Some(owner) = caller.0 else {
    return Ok(Json(SearchResponse::default()));
  };

  let listings = state
    .store
    .search_notes(owner.clone(), query)
    .await
    .map_err(|e| {
      tracing::error!(%owner, error = %e, "note search failed");
      ApiError::store(e)
    })?;
  Ok(Json(SearchResponse { notes: listings }))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /notes`. Only `title` and `trigger_text` are
/// required; each optional reflection field adds one detail row.
#[derive(Debug, Default, Deserialize)]
pub struct CreateNoteBody {
  #[serde(default)]
  pub title:             String,
  #[serde(default)]
  pub trigger_text:      String,
  pub emotion:           Option<String>,
  pub automatic_thought: Option<String>,
  pub cognitive_error:   Option<String>,
  pub alternative:       Option<String>,
  pub behavior:          Option<String>,
}

fn filled(value: Option<String>) -> Option<String> {
  value.map(|v| v.trim().to_owned()).filter(|v| !v.is_empty())
}

/// `POST /notes`. Returns 201 + the stored [`NoteDetails`].
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Json(body): Json<CreateNoteBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let owner = caller.require()?;

  let missing: Vec<&str> = [("title", &body.title), ("trigger_text", &body.trigger_text)]
    .into_iter()
    .filter(|(_, v)| v.trim().is_empty())
    .map(|(name, _)| name)
    .collect();
  if !missing.is_empty() {
    return Err(ApiError::Unprocessable {
      code:    "missing_fields",
      message: format!("missing required fields: {}", missing.join(", ")),
      detail:  json!({ "fields": missing }),
    });
  }

  let store = state.store.as_ref();
  let fail = |e: S::Error| {
    tracing::error!(%owner, error = %e, "note creation failed");
    ApiError::store(e)
  };

  let note = store
    .insert_note(
      owner.clone(),
      NewNote {
        title:        body.title.trim().to_owned(),
        trigger_text: body.trigger_text.trim().to_owned(),
      },
      None,
    )
    .await
    .map_err(fail)?;

  if let Some(emotion) = filled(body.emotion) {
    let thought = NewThought {
      emotion,
      automatic_thought: filled(body.automatic_thought).unwrap_or_default(),
    };
    store.insert_thought(note.id, thought).await.map_err(fail)?;
  }
  if let Some(label) = filled(body.cognitive_error) {
    store
      .insert_cognitive_error(note.id, NewCognitiveError { label, description: None })
      .await
      .map_err(fail)?;
  }
  if let Some(alternative) = filled(body.alternative) {
    store.insert_alternative(note.id, alternative).await.map_err(fail)?;
  }
  if let Some(label) = filled(body.behavior) {
    store
      .insert_behavior(note.id, NewBehavior { label, description: None })
      .await
      .map_err(fail)?;
  }

  let details = store
    .get_note_details(owner.clone(), vec![note.id])
    .await
    .map_err(fail)?
    .into_iter()
    .next()
    .unwrap_or_else(|| NoteDetails::bare(note));
  Ok((StatusCode::CREATED, Json(details)))
}
