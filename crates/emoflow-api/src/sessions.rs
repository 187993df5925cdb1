//! Handler for `POST /sessions/deep`.
//!
//! Body: [`DeepSessionRequest`]. Returns 201 `{"note_id":…,"flow_id":…}`.
//! Validation failures are 4xx with nothing persisted; a failure after the
//! first write is a 500 `partial_write` naming the failed steps.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use emoflow_core::{
  session::{self, DeepSessionRequest},
  store::NoteStore,
};

use crate::{ApiState, error::ApiError, identity::Caller};

/// `POST /sessions/deep`
pub async fn deep<S>(
  State(state): State<ApiState<S>>,
  caller: Caller,
  Json(body): Json<DeepSessionRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let owner = caller.require()?;
  let outcome = session::create_deep_session(state.store.as_ref(), &owner, body).await?;
  Ok((StatusCode::CREATED, Json(outcome)))
}
