//! JSON REST API for the emoflow note graph.
//!
//! Exposes an axum [`Router`] backed by any [`emoflow_core::store::NoteStore`].
//! Authentication, TLS, and transport concerns are the caller's
//! responsibility; the resolved identity arrives in headers (see
//! [`identity`]).
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", emoflow_api::api_router(store.clone(), config.layout.clone()))
//! ```

pub mod error;
pub mod flows;
pub mod identity;
pub mod notes;
pub mod sessions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use emoflow_core::store::NoteStore;
use emoflow_layout::LayoutConfig;

pub use error::ApiError;
pub use identity::Caller;

/// Shared state threaded through all handlers.
#[derive(Clone)]
pub struct ApiState<S> {
  pub store:  Arc<S>,
  pub layout: Arc<LayoutConfig>,
}

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>, layout: LayoutConfig) -> Router<()>
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  let state = ApiState { store, layout: Arc::new(layout) };
  Router::new()
    // Flows
    .route("/flows", post(flows::attach::<S>))
    .route("/flows/{flow_id}", get(flows::get_one::<S>))
    .route("/flows/{flow_id}/layout", get(flows::layout::<S>))
    // Deep sessions
    .route("/sessions/deep", post(sessions::deep::<S>))
    // Notes
    .route("/notes", get(notes::search::<S>).post(notes::create::<S>))
    .with_state(state)
}
