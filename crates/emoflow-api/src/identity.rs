//! Caller identity forwarded by the upstream session layer.
//!
//! Authentication happens before requests reach this router. The resolved
//! identity arrives as one of two headers:
//!
//! | Header | Value |
//! |--------|-------|
//! | `x-user-id` | UUID of a signed-in user |
//! | `x-device-id` | Opaque id of an anonymous device |
//!
//! When both are present the user id wins.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, request::Parts},
};
use emoflow_core::Owner;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// The caller, if any. Read paths accept anonymous callers and answer with
/// empty results; write paths call [`Caller::require`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Option<Owner>);

impl Caller {
  pub fn require(self) -> Result<Owner, ApiError> { self.0.ok_or(ApiError::Unauthorized) }
}

/// Resolve the caller from request headers. A present but malformed user id
/// is rejected rather than silently ignored.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<Caller, ApiError> {
  let header = |name: &str| {
    headers
      .get(name)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
  };

  if let Some(raw) = header(USER_ID_HEADER) {
    let id = Uuid::parse_str(raw).map_err(|_| {
      ApiError::bad_request("invalid_identity", format!("{USER_ID_HEADER} is not a UUID"))
    })?;
    return Ok(Caller(Some(Owner::User(id))));
  }

  Ok(Caller(header(DEVICE_ID_HEADER).map(|d| Owner::Device(d.to_owned()))))
}

impl<St> FromRequestParts<St> for Caller
where
  St: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    caller_from_headers(&parts.headers)
  }
}
