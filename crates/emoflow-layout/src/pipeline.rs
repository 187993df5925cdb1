//! The steps around the structural pass: sizing and coloring before it,
//! spread, slope, normalization and edge bundling after it.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use emoflow_core::{flow::Middle, note::Note};

use crate::{
  config::{LayoutConfig, Rgb},
  model::{Layout, Point, PositionedNode, StyledEdge},
  structural::{Positions, StructuralGraph, StructuralNode},
};

// ─── Edge filtering ──────────────────────────────────────────────────────────

/// Split `middles` into those whose endpoints are both in `notes` and the
/// count of those that are not. Input order is preserved.
pub fn filter_edges<'a>(notes: &[Note], middles: &'a [Middle]) -> (Vec<&'a Middle>, usize) {
  let ids: BTreeSet<i64> = notes.iter().map(|n| n.id).collect();
  let kept: Vec<&Middle> = middles
    .iter()
    .filter(|m| ids.contains(&m.from_note_id) && ids.contains(&m.to_note_id))
    .collect();
  let dropped = middles.len() - kept.len();
  (kept, dropped)
}

// ─── Styling ─────────────────────────────────────────────────────────────────

/// Base size plus a logarithmic bonus that stops at `max_size_bonus`.
pub fn node_width(out_degree: usize, config: &LayoutConfig) -> f64 {
  let bonus = config.size_step * (1.0 + out_degree as f64).ln();
  config.base_size + bonus.min(config.max_size_bonus)
}

/// Accent share for a node, relative to the most connected node.
pub fn intensity(out_degree: usize, max_out_degree: usize, config: &LayoutConfig) -> f64 {
  if max_out_degree == 0 {
    return 0.0;
  }
  config.max_intensity * out_degree as f64 / max_out_degree as f64
}

pub fn node_color(intensity: f64, config: &LayoutConfig) -> Rgb {
  config.base_color.lerp(config.accent_color, intensity)
}

// ─── Prepare ─────────────────────────────────────────────────────────────────

pub(crate) struct Seed {
  id:         i64,
  title:      String,
  created_at: DateTime<Utc>,
  width:      f64,
  height:     f64,
  out_degree: usize,
  intensity:  f64,
  color:      Rgb,
}

pub(crate) struct EdgeSeed {
  id:     i64,
  source: i64,
  target: i64,
}

/// Everything computed before the structural pass.
pub(crate) struct Prepared {
  seeds:       Vec<Seed>,
  edges:       Vec<EdgeSeed>,
  dropped:     usize,
  pub(crate) graph: StructuralGraph,
}

pub(crate) fn prepare(notes: &[Note], middles: &[Middle], config: &LayoutConfig) -> Prepared {
  // A note listed twice is laid out once.
  let mut seen = BTreeSet::new();
  let notes: Vec<Note> = notes.iter().filter(|n| seen.insert(n.id)).cloned().collect();

  let (kept, dropped) = filter_edges(&notes, middles);
  if dropped > 0 {
    tracing::debug!(dropped, "layout: ignoring middles with unknown endpoints");
  }

  let mut out_degree: BTreeMap<i64, usize> = BTreeMap::new();
  for m in &kept {
    *out_degree.entry(m.from_note_id).or_default() += 1;
  }
  let max_out_degree = out_degree.values().copied().max().unwrap_or(0);

  let seeds: Vec<Seed> = notes
    .iter()
    .map(|n| {
      let degree = out_degree.get(&n.id).copied().unwrap_or(0);
      let width = node_width(degree, config);
      let intensity = intensity(degree, max_out_degree, config);
      Seed {
        id: n.id,
        title: n.title.clone(),
        created_at: n.created_at,
        width,
        height: width * config.aspect,
        out_degree: degree,
        intensity,
        color: node_color(intensity, config),
      }
    })
    .collect();

  let graph = StructuralGraph {
    nodes: seeds
      .iter()
      .map(|s| StructuralNode {
        id:         s.id,
        width:      s.width,
        height:     s.height,
        created_at: s.created_at,
      })
      .collect(),
    edges: kept.iter().map(|m| (m.from_note_id, m.to_note_id)).collect(),
  };

  Prepared {
    seeds,
    edges: kept
      .iter()
      .map(|m| EdgeSeed { id: m.id, source: m.from_note_id, target: m.to_note_id })
      .collect(),
    dropped,
    graph,
  }
}

// ─── Finish ──────────────────────────────────────────────────────────────────

pub(crate) fn finish(prepared: Prepared, positions: &Positions, config: &LayoutConfig) -> Layout {
  let Prepared { seeds, edges, dropped, .. } = prepared;

  // Top-left corners from the solver's centers.
  let mut corners: Vec<Point> = seeds
    .iter()
    .map(|s| {
      let center = positions.get(&s.id).copied().unwrap_or_default();
      Point { x: center.x - s.width / 2.0, y: center.y - s.height / 2.0 }
    })
    .collect();

  spread_tiers(&seeds, &mut corners, config);
  slope_by_time(&seeds, &mut corners, config);
  normalize(&mut corners, config.padding);

  let colors: BTreeMap<i64, Rgb> = seeds.iter().map(|s| (s.id, s.color)).collect();
  let offsets = bundle_offsets(&edges, config.bundle_spacing);

  let nodes = seeds
    .into_iter()
    .zip(corners)
    .map(|(s, p)| PositionedNode {
      id:         s.id,
      title:      s.title,
      created_at: s.created_at,
      x:          p.x,
      y:          p.y,
      width:      s.width,
      height:     s.height,
      out_degree: s.out_degree,
      intensity:  s.intensity,
      color:      s.color,
    })
    .collect();

  let edges = edges
    .iter()
    .zip(offsets)
    .map(|(e, offset)| StyledEdge {
      id: e.id,
      source: e.source,
      target: e.target,
      offset,
      color: colors[&e.source],
      width: config.edge_width,
    })
    .collect();

  Layout { nodes, edges, dropped_edges: dropped }
}

/// Walk the nodes in structural x order and push every node after the first
/// alternately down and up, one more `tier_spread` every two nodes.
fn spread_tiers(seeds: &[Seed], corners: &mut [Point], config: &LayoutConfig) {
  let mut order: Vec<usize> = (0..seeds.len()).collect();
  order.sort_by(|&a, &b| {
    corners[a]
      .x
      .total_cmp(&corners[b].x)
      .then(corners[a].y.total_cmp(&corners[b].y))
      .then(seeds[a].id.cmp(&seeds[b].id))
  });
  for (rank, &i) in order.iter().enumerate().skip(1) {
    let direction = if rank % 2 == 1 { 1.0 } else { -1.0 };
    let tier = rank.div_ceil(2) as f64;
    corners[i].y += direction * tier * config.tier_spread;
  }
}

/// Later notes drift further down, independently of structure.
fn slope_by_time(seeds: &[Seed], corners: &mut [Point], config: &LayoutConfig) {
  let mut order: Vec<usize> = (0..seeds.len()).collect();
  order.sort_by_key(|&i| (seeds[i].created_at, seeds[i].id));
  for (rank, &i) in order.iter().enumerate() {
    corners[i].y += rank as f64 * config.time_slope;
  }
}

fn normalize(corners: &mut [Point], padding: f64) {
  if corners.is_empty() {
    return;
  }
  let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
  let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
  for p in corners.iter_mut() {
    p.x += padding - min_x;
    p.y += padding - min_y;
  }
}

/// Symmetric perpendicular offsets per source, aligned with `edges`.
fn bundle_offsets(edges: &[EdgeSeed], spacing: f64) -> Vec<f64> {
  let mut groups: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
  for (i, e) in edges.iter().enumerate() {
    groups.entry(e.source).or_default().push(i);
  }

  let mut offsets = vec![0.0; edges.len()];
  for members in groups.values() {
    let n = members.len();
    if n < 2 {
      continue;
    }
    let mid = (n - 1) as f64 / 2.0;
    for (k, &i) in members.iter().enumerate() {
      offsets[i] = (k as f64 - mid) * spacing;
    }
  }
  offsets
}
