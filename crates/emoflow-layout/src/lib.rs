//! Flow diagram layout.
//!
//! Turns a flow's notes and middles into positioned, sized, colored nodes and
//! bundled edges for the canvas. The computation is pure and deterministic:
//! every intermediate ordering is keyed on ids or timestamps, never on hash
//! order.
//!
//! [`layout`] runs synchronously with the built-in [`LayeredSolver`].
//! [`layout_with`] accepts any [`StructuralSolver`] and a
//! [`CancellationToken`]; if the token fires while the solver runs, the result
//! is discarded and [`LayoutError::Cancelled`] is returned.

pub mod cancel;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod structural;

pub use cancel::Relayout;
pub use config::{LayoutConfig, Rgb};
pub use error::{LayoutError, Result};
pub use model::{Layout, Point, PositionedNode, StyledEdge};
pub use structural::{LayeredSolver, Positions, StructuralGraph, StructuralSolver};

use emoflow_core::{flow::Middle, note::Note};
use tokio_util::sync::CancellationToken;

/// Lay out `notes` and `middles` with the built-in solver.
pub fn layout(notes: &[Note], middles: &[Middle], config: &LayoutConfig) -> Layout {
  if notes.is_empty() {
    return Layout::default();
  }
  let prepared = pipeline::prepare(notes, middles, config);
  let positions = LayeredSolver::from_config(config).solve_now(&prepared.graph);
  pipeline::finish(prepared, &positions, config)
}

/// Lay out with `solver`, giving up as soon as `cancel` fires.
///
/// The token is checked before starting, raced against the solver, and
/// checked once more after it; a cancelled invocation never produces a
/// layout.
pub async fn layout_with<S>(
  notes: &[Note],
  middles: &[Middle],
  config: &LayoutConfig,
  solver: &S,
  cancel: &CancellationToken,
) -> Result<Layout>
where
  S: StructuralSolver,
{
  if notes.is_empty() {
    return Ok(Layout::default());
  }
  if cancel.is_cancelled() {
    return Err(LayoutError::Cancelled);
  }

  let prepared = pipeline::prepare(notes, middles, config);
  let positions = tokio::select! {
    biased;
    _ = cancel.cancelled() => return Err(LayoutError::Cancelled),
    solved = solver.solve(&prepared.graph) => solved?,
  };
  if cancel.is_cancelled() {
    return Err(LayoutError::Cancelled);
  }

  Ok(pipeline::finish(prepared, &positions, config))
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use chrono::{DateTime, TimeZone as _, Utc};
  use emoflow_core::Owner;

  use super::*;

  fn at(t: i64) -> DateTime<Utc> { Utc.timestamp_opt(1_700_000_000 + t, 0).unwrap() }

  fn note(id: i64, t: i64) -> Note {
    Note {
      id,
      owner: Owner::Device("d".into()),
      title: format!("note {id}"),
      trigger_text: String::new(),
      created_at: at(t),
    }
  }

  fn middle(id: i64, from: i64, to: i64) -> Middle {
    Middle {
      id,
      owner: Owner::Device("d".into()),
      from_note_id: from,
      to_note_id: to,
      flow_id: 1,
      created_at: at(100 + id),
    }
  }

  /// A solver that counts invocations and delegates to the layered one.
  struct Counting {
    calls: AtomicUsize,
    inner: LayeredSolver,
  }

  impl StructuralSolver for Counting {
    async fn solve<'a>(&'a self, graph: &'a StructuralGraph) -> Result<Positions> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(self.inner.solve_now(graph))
    }
  }

  /// A solver that cancels its own invocation mid-flight, standing in for
  /// newer input arriving while an external solver is busy.
  struct Superseded {
    token: CancellationToken,
  }

  impl StructuralSolver for Superseded {
    async fn solve<'a>(&'a self, _graph: &'a StructuralGraph) -> Result<Positions> {
      self.token.cancel();
      tokio::task::yield_now().await;
      Ok(Positions::new())
    }
  }

  fn abc() -> (Vec<Note>, Vec<Middle>) {
    (vec![note(1, 1), note(2, 2), note(3, 3)], vec![middle(10, 1, 3), middle(11, 2, 3)])
  }

  #[test]
  fn empty_input_is_empty_output() {
    let out = layout(&[], &[middle(1, 1, 2)], &LayoutConfig::default());
    assert_eq!(out, Layout::default());
  }

  #[tokio::test]
  async fn empty_input_skips_the_solver() {
    let solver = Counting { calls: AtomicUsize::new(0), inner: LayeredSolver::from_config(&LayoutConfig::default()) };
    let out = layout_with(&[], &[], &LayoutConfig::default(), &solver, &CancellationToken::new())
      .await
      .unwrap();
    assert!(out.nodes.is_empty());
    assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn repeated_layouts_are_byte_identical() {
    let (notes, middles) = abc();
    let cfg = LayoutConfig::default();
    let first = serde_json::to_string(&layout(&notes, &middles, &cfg)).unwrap();
    let second = serde_json::to_string(&layout(&notes, &middles, &cfg)).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn converging_flow_shape() {
    let (notes, middles) = abc();
    let cfg = LayoutConfig::default();
    let out = layout(&notes, &middles, &cfg);
    let by_id = |id: i64| out.nodes.iter().find(|n| n.id == id).unwrap();

    // A and B feed C, so C sits to their right.
    assert!(by_id(3).x > by_id(1).x);
    assert_eq!(by_id(1).x, by_id(2).x);
    assert_eq!(by_id(1).out_degree, 1);
    assert_eq!(by_id(3).out_degree, 0);
    assert_eq!(by_id(3).color, cfg.base_color);
    assert_eq!(by_id(1).intensity, cfg.max_intensity);

    // Two edges from different sources are not bundled.
    assert!(out.edges.iter().all(|e| e.offset == 0.0));
  }

  #[test]
  fn minimum_coordinates_equal_padding() {
    let (notes, middles) = abc();
    let cfg = LayoutConfig::default();
    let out = layout(&notes, &middles, &cfg);
    let min_x = out.nodes.iter().map(|n| n.x).fold(f64::INFINITY, f64::min);
    let min_y = out.nodes.iter().map(|n| n.y).fold(f64::INFINITY, f64::min);
    assert!((min_x - cfg.padding).abs() < 1e-9);
    assert!((min_y - cfg.padding).abs() < 1e-9);
  }

  #[test]
  fn unknown_endpoints_are_dropped_and_counted() {
    let (notes, mut middles) = abc();
    middles.push(middle(12, 1, 99));
    middles.push(middle(13, 42, 3));
    let total = middles.len();

    let out = layout(&notes, &middles, &LayoutConfig::default());
    assert_eq!(out.edges.len() + out.dropped_edges, total);
    assert_eq!(out.dropped_edges, 2);
    assert!(out.edges.iter().all(|e| e.target != 99 && e.source != 42));
    // Dropped edges do not count towards out-degree.
    let a = out.nodes.iter().find(|n| n.id == 1).unwrap();
    assert_eq!(a.out_degree, 1);
  }

  #[test]
  fn colors_rise_with_out_degree() {
    // 1 → {2, 3, 4}, 2 → {3}, 3 → {4}.
    let notes: Vec<Note> = (1..=4).map(|i| note(i, i)).collect();
    let middles = vec![
      middle(10, 1, 2),
      middle(11, 1, 3),
      middle(12, 1, 4),
      middle(13, 2, 3),
      middle(14, 3, 4),
    ];
    let cfg = LayoutConfig::default();
    let out = layout(&notes, &middles, &cfg);

    let mut by_degree: Vec<(usize, f64)> =
      out.nodes.iter().map(|n| (n.out_degree, n.intensity)).collect();
    by_degree.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
    assert!(by_degree.windows(2).all(|w| w[0].1 <= w[1].1));
    assert!(by_degree.iter().all(|(_, i)| *i <= cfg.max_intensity));

    let hub = out.nodes.iter().find(|n| n.id == 1).unwrap();
    assert_eq!(hub.color, cfg.base_color.lerp(cfg.accent_color, cfg.max_intensity));

    // The hub's three edges fan out around zero.
    let mut offsets: Vec<f64> =
      out.edges.iter().filter(|e| e.source == 1).map(|e| e.offset).collect();
    offsets.sort_by(f64::total_cmp);
    assert_eq!(offsets, vec![-cfg.bundle_spacing, 0.0, cfg.bundle_spacing]);
  }

  #[test]
  fn later_notes_drift_down() {
    // Unconnected notes share rank 0; slope and tiering decide y.
    let notes: Vec<Note> = (1..=3).map(|i| note(i, i)).collect();
    let mut cfg = LayoutConfig::default();
    cfg.tier_spread = 0.0;
    cfg.node_gap = 0.0;
    let out = layout(&notes, &[], &cfg);
    let ys: Vec<f64> = out.nodes.iter().map(|n| n.y).collect();
    // Stacking plus slope keeps creation order top to bottom.
    assert!(ys[0] < ys[1] && ys[1] < ys[2]);
    let step = out.nodes[0].height + cfg.time_slope;
    assert_eq!(ys[1] - ys[0], step);
  }

  #[test]
  fn duplicate_notes_are_laid_out_once() {
    let notes = vec![note(1, 1), note(1, 1), note(2, 2)];
    let out = layout(&notes, &[middle(5, 1, 2)], &LayoutConfig::default());
    assert_eq!(out.nodes.len(), 2);
  }

  #[tokio::test]
  async fn async_layout_matches_sync_layout() {
    let (notes, middles) = abc();
    let cfg = LayoutConfig::default();
    let solver = LayeredSolver::from_config(&cfg);
    let out = layout_with(&notes, &middles, &cfg, &solver, &CancellationToken::new())
      .await
      .unwrap();
    assert_eq!(out, layout(&notes, &middles, &cfg));
  }

  #[tokio::test]
  async fn cancelled_before_start() {
    let (notes, middles) = abc();
    let cfg = LayoutConfig::default();
    let token = CancellationToken::new();
    token.cancel();
    let solver = Counting { calls: AtomicUsize::new(0), inner: LayeredSolver::from_config(&cfg) };
    let err = layout_with(&notes, &middles, &cfg, &solver, &token).await.unwrap_err();
    assert!(matches!(err, LayoutError::Cancelled));
    assert_eq!(solver.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn superseded_mid_solve_is_discarded() {
    let (notes, middles) = abc();
    let mut relayout = Relayout::new();
    let token = relayout.begin();
    let solver = Superseded { token: token.clone() };
    let err = layout_with(&notes, &middles, &LayoutConfig::default(), &solver, &token)
      .await
      .unwrap_err();
    assert!(matches!(err, LayoutError::Cancelled));

    // The next invocation has its own live token.
    let next = relayout.begin();
    assert!(!next.is_cancelled());
  }
}
