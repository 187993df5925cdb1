//! Output types handed to the rendering collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Rgb;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
  pub x: f64,
  pub y: f64,
}

/// A note placed on the canvas. `x`/`y` is the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedNode {
  pub id:         i64,
  pub title:      String,
  pub created_at: DateTime<Utc>,
  pub x:          f64,
  pub y:          f64,
  pub width:      f64,
  pub height:     f64,
  pub out_degree: usize,
  /// Share of the accent color mixed into the node, in `[0, max_intensity]`.
  pub intensity:  f64,
  pub color:      Rgb,
}

/// A middle ready to draw. `offset` displaces the edge perpendicular to its
/// direction so that siblings from one source fan out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyledEdge {
  pub id:     i64,
  pub source: i64,
  pub target: i64,
  pub offset: f64,
  pub color:  Rgb,
  pub width:  f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
  pub nodes:         Vec<PositionedNode>,
  pub edges:         Vec<StyledEdge>,
  /// Middles left out because an endpoint was not among the notes.
  pub dropped_edges: usize,
}
