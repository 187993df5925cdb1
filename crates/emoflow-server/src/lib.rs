//! The emoflow HTTP server: configuration and application assembly.

use std::{path::PathBuf, sync::Arc};

use axum::Router;
use emoflow_core::store::NoteStore;
use emoflow_layout::LayoutConfig;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` layered with
/// `EMOFLOW_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  pub layout:     LayoutConfig,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".to_string(),
      port:       8080,
      store_path: PathBuf::from("emoflow.db"),
      layout:     LayoutConfig::default(),
    }
  }
}

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Application ──────────────────────────────────────────────────────────────

/// The API mounted under `/api`, with request tracing.
pub fn app<S>(store: Arc<S>, config: &ServerConfig) -> Router
where
  S: NoteStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .nest("/api", emoflow_api::api_router(store, config.layout.clone()))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use emoflow_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;

  use super::*;

  #[test]
  fn partial_config_keeps_defaults() {
    let settings = config::Config::builder()
      .add_source(config::File::from_str(
        "port = 9000\n[layout]\npadding = 8.0\naccent_color = \"#ff0000\"\n",
        config::FileFormat::Toml,
      ))
      .build()
      .unwrap();
    let cfg: ServerConfig = settings.try_deserialize().unwrap();
    assert_eq!(cfg.port, 9000);
    assert_eq!(cfg.host, "127.0.0.1");
    assert_eq!(cfg.layout.padding, 8.0);
    assert_eq!(cfg.layout.accent_color.to_string(), "#ff0000");
    assert_eq!(cfg.layout.rank_gap, LayoutConfig::default().rank_gap);
  }

  #[tokio::test]
  async fn api_is_nested() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let app = app(Arc::new(store), &ServerConfig::default());

    let response = app
      .clone()
      .oneshot(Request::builder().uri("/api/flows/1").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body, serde_json::json!({ "notes": [], "middles": [] }));

    let missing = app
      .oneshot(Request::builder().uri("/flows/1").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
  }
}
