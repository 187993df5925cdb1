//! Handlers for `/flows` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/flows/{flow_id}` | `?include_middles=true` to load edges; anonymous, absent or foreign → empty |
//! | `GET`  | `/flows/{flow_id}/layout` | The flow laid out for rendering |
//! | `POST` | `/flows` | Body: `{"note_id":1,"flow_id":null}`; 201 when a flow was created |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use emoflow_core::{
  Owner,
  id::{RawId, parse_id},
  query::{self, FlowSnapshot},
  session,
  store::NoteStore,
};
use emoflow_layout::{Layout, LayoutConfig};
use serde::{Deserialize, Serialize};

use crate::{ApiState, error::ApiError, identity::Caller};

fn flow_id_from_path(raw: &str) -> Result<i64, ApiError> {
  parse_id(raw).map_err(|_| ApiError::bad_request("invalid_flow_id", format!("invalid flow id: {raw:?}")))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct GetParams {
  #[serde(default)]
  pub include_middles: bool,
}

/// `GET /flows/{flow_id}[?include_middles=true]`
pub async fn get_one<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Path(raw_id): Path<String>,
  Query(params): Query<GetParams>,
) -> Result<Json<FlowSnapshot>, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let flow_id = flow_id_from_path(&raw_id)?;
  let Some(owner) = caller.0 else {
    return Ok(Json(FlowSnapshot::default()));
  };

  let snapshot = query::get_flow(state.store.as_ref(), &owner, flow_id, params.include_middles)
    .await
    .map_err(|e| {
      tracing::error!(%owner, flow_id, error = %e, "failed to load flow");
      ApiError::store(e)
    })?;
  Ok(Json(snapshot))
}

// ─── Layout ───────────────────────────────────────────────────────────────────

/// Load a flow with its middles and lay it out.
pub async fn flow_layout<S>(
  store: &S,
  owner: &Owner,
  flow_id: i64,
  config: &LayoutConfig,
) -> Result<Layout, S::Error>
where
  S: NoteStore,
{
  let snapshot = query::get_flow(store, owner, flow_id, true).await?;
  let notes: Vec<_> = snapshot.notes.into_iter().map(|n| n.details.note).collect();
  Ok(emoflow_layout::layout(&notes, &snapshot.middles, config))
}

/// `GET /flows/{flow_id}/layout`
pub async fn layout<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Path(raw_id): Path<String>,
) -> Result<Json<Layout>, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let flow_id = flow_id_from_path(&raw_id)?;
  let Some(owner) = caller.0 else {
    return Ok(Json(Layout::default()));
  };

  let layout = flow_layout(state.store.as_ref(), &owner, flow_id, &state.layout)
    .await
    .map_err(|e| {
      tracing::error!(%owner, flow_id, error = %e, "failed to lay out flow");
      ApiError::store(e)
    })?;
  Ok(Json(layout))
}

// ─── Create / attach ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AttachBody {
  pub note_id: RawId,
  #[serde(default)]
  pub flow_id: Option<RawId>,
}

#[derive(Debug, Serialize)]
pub struct AttachResponse {
  pub flow_id: i64,
}

/// `POST /flows`: put a note into a flow, creating one when `flow_id` is
/// absent.
pub async fn attach<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Json(body): Json<AttachBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let owner = caller.require()?;
  let note_id = body
    .note_id
    .parse()
    .map_err(|e| ApiError::bad_request("invalid_note_id", e.to_string()))?;

  let outcome = session::attach_to_flow(state.store.as_ref(), &owner, note_id, body.flow_id).await?;
  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  Ok((status, Json(AttachResponse { flow_id: outcome.flow_id })))
}
