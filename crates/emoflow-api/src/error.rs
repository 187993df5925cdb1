//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every error body is a JSON object with at least `error` (a human-readable
//! message) and `code` (a stable machine-readable tag).

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use emoflow_core::{
  BoxError,
  session::{SagaFailure, SessionError},
};
use serde_json::{Map, Value, json};
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// A write was attempted without `x-user-id` or `x-device-id`.
  #[error("caller identity is required")]
  Unauthorized,

  #[error("bad request: {message}")]
  BadRequest { code: &'static str, message: String },

  /// The request names notes or flows that do not belong to the caller.
  #[error("forbidden: {message}")]
  Forbidden { message: String, detail: Value },

  #[error("unprocessable: {message}")]
  Unprocessable { code: &'static str, message: String, detail: Value },

  /// Some saga steps committed and others failed.
  #[error("partial write: {0}")]
  PartialWrite(SagaFailure),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl ApiError {
  pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
    Self::BadRequest { code, message: message.into() }
  }

  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Store(Box::new(e))
  }

  fn parts(&self) -> (StatusCode, &'static str, Value) {
    match self {
      Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", Value::Null),
      Self::BadRequest { code, .. } => (StatusCode::BAD_REQUEST, *code, Value::Null),
      Self::Forbidden { detail, .. } => (StatusCode::FORBIDDEN, "not_owned", detail.clone()),
      Self::Unprocessable { code, detail, .. } => {
        (StatusCode::UNPROCESSABLE_ENTITY, *code, detail.clone())
      }
      Self::PartialWrite(failure) => {
        let failed_steps: Vec<Value> = failure
          .failures
          .iter()
          .map(|f| {
            let mut step = serde_json::to_value(f.step).unwrap_or(Value::Null);
            if let Value::Object(fields) = &mut step {
              fields.insert("message".into(), f.step.user_message().into());
            }
            step
          })
          .collect();
        let detail = json!({
          "note_id":      failure.note_id,
          "flow_id":      failure.flow_id,
          "failed_steps": failed_steps,
        });
        (StatusCode::INTERNAL_SERVER_ERROR, "partial_write", detail)
      }
      Self::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", Value::Null),
    }
  }

  fn message(&self) -> String {
    match self {
      Self::BadRequest { message, .. }
      | Self::Forbidden { message, .. }
      | Self::Unprocessable { message, .. } => message.clone(),
      Self::PartialWrite(_) => "일부 정보를 저장하지 못했습니다".into(),
      // Backend details stay in the logs.
      Self::Store(_) => "internal server error".into(),
      Self::Unauthorized => self.to_string(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, code, detail) = self.parts();
    let mut body = Map::new();
    body.insert("error".into(), self.message().into());
    body.insert("code".into(), code.into());
    if let Value::Object(extra) = detail {
      body.extend(extra);
    }
    (status, Json(Value::Object(body))).into_response()
  }
}

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    let message = e.to_string();
    match e {
      SessionError::InvalidSelection { count } => Self::Unprocessable {
        code: "invalid_selection",
        message,
        detail: json!({ "count": count }),
      },
      SessionError::MissingFields(fields) => Self::Unprocessable {
        code: "missing_fields",
        message,
        detail: json!({ "fields": fields }),
      },
      SessionError::InvalidFlowId(_) => Self::BadRequest { code: "invalid_flow_id", message },
      SessionError::FlowMismatch { flow_id, note_ids } => Self::Unprocessable {
        code: "flow_mismatch",
        message,
        detail: json!({ "flow_id": flow_id, "note_ids": note_ids }),
      },
      SessionError::NotOwned { resource, ids } => Self::Forbidden {
        message,
        detail: json!({ "resource": resource, "ids": ids }),
      },
      SessionError::Saga(failure) => Self::PartialWrite(failure),
      SessionError::Store(e) => Self::Store(e),
    }
  }
}
