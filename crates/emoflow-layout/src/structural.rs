//! The structural pass: assigns each sized box a center position.
//!
//! [`StructuralSolver`] is the seam for swapping in an external (possibly
//! asynchronous) solver. [`LayeredSolver`] is the built-in one: a
//! left-to-right layered layout in the style of Sugiyama.
//!
//! 1. Rank by longest path over the strongly-connected-component
//!    condensation, so cycles (which flows should not contain) still get a
//!    stable rank.
//! 2. Order each rank by alternating barycenter sweeps to reduce crossings.
//! 3. Place ranks left to right and stack each rank around `y = 0`.

use std::{collections::BTreeMap, future::Future};

use chrono::{DateTime, Utc};
use petgraph::{
  Direction,
  algo::tarjan_scc,
  graph::{DiGraph, NodeIndex},
};

use crate::{config::LayoutConfig, error::Result, model::Point};

/// Center positions keyed by note id.
pub type Positions = BTreeMap<i64, Point>;

#[derive(Debug, Clone, PartialEq)]
pub struct StructuralNode {
  pub id:         i64,
  pub width:      f64,
  pub height:     f64,
  /// Used to seed the in-rank order.
  pub created_at: DateTime<Utc>,
}

/// Input to a structural solver. Every edge endpoint is one of `nodes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuralGraph {
  pub nodes: Vec<StructuralNode>,
  pub edges: Vec<(i64, i64)>,
}

pub trait StructuralSolver: Send + Sync {
  /// Positions for the nodes of `graph`. Nodes missing from the result are
  /// placed at the origin.
  fn solve<'a>(
    &'a self,
    graph: &'a StructuralGraph,
  ) -> impl Future<Output = Result<Positions>> + Send + 'a;
}

// ─── LayeredSolver ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct LayeredSolver {
  pub rank_gap: f64,
  pub node_gap: f64,
  pub sweeps:   usize,
}

impl LayeredSolver {
  pub fn from_config(config: &LayoutConfig) -> Self {
    Self {
      rank_gap: config.rank_gap,
      node_gap: config.node_gap,
      sweeps:   config.sweeps,
    }
  }

  /// Run the whole pass synchronously.
  pub fn solve_now(&self, graph: &StructuralGraph) -> Positions {
    if graph.nodes.is_empty() {
      return Positions::new();
    }

    let mut seeded: Vec<&StructuralNode> = graph.nodes.iter().collect();
    seeded.sort_by_key(|n| (n.created_at, n.id));

    let ranks = rank(&seeded, &graph.edges);
    let layers = self.order(&seeded, &graph.edges, &ranks);
    self.place(graph, &layers)
  }

  fn order(
    &self,
    seeded: &[&StructuralNode],
    edges: &[(i64, i64)],
    ranks: &BTreeMap<i64, usize>,
  ) -> Vec<Vec<i64>> {
    let depth = ranks.values().copied().max().unwrap_or(0) + 1;
    let mut layers: Vec<Vec<i64>> = vec![Vec::new(); depth];
    for node in seeded {
      layers[ranks[&node.id]].push(node.id);
    }

    for sweep in 0..self.sweeps {
      let downward = sweep % 2 == 0;
      let pos = positions_in_layers(&layers);
      let order: Vec<usize> = if downward {
        (1..depth).collect()
      } else {
        (0..depth.saturating_sub(1)).rev().collect()
      };
      for r in order {
        let layer = &mut layers[r];
        let mut keyed: Vec<(f64, usize, i64)> = layer
          .iter()
          .enumerate()
          .map(|(i, id)| {
            let neighbours = edges.iter().filter_map(|(from, to)| {
              if downward && to == id {
                Some(pos[from])
              } else if !downward && from == id {
                Some(pos[to])
              } else {
                None
              }
            });
            (barycenter(neighbours).unwrap_or(i as f64), i, *id)
          })
          .collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        *layer = keyed.into_iter().map(|(_, _, id)| id).collect();
      }
    }
    layers
  }

  fn place(&self, graph: &StructuralGraph, layers: &[Vec<i64>]) -> Positions {
    let size: BTreeMap<i64, (f64, f64)> = graph
      .nodes
      .iter()
      .map(|n| (n.id, (n.width, n.height)))
      .collect();

    let mut positions = Positions::new();
    let mut left = 0.0;
    for layer in layers {
      let rank_width = layer.iter().map(|id| size[id].0).fold(0.0, f64::max);
      let total_height: f64 = layer.iter().map(|id| size[id].1).sum::<f64>()
        + self.node_gap * layer.len().saturating_sub(1) as f64;

      let mut top = -total_height / 2.0;
      for id in layer {
        let (_, height) = size[id];
        positions.insert(*id, Point {
          x: left + rank_width / 2.0,
          y: top + height / 2.0,
        });
        top += height + self.node_gap;
      }
      left += rank_width + self.rank_gap;
    }
    positions
  }
}

impl StructuralSolver for LayeredSolver {
  async fn solve<'a>(&'a self, graph: &'a StructuralGraph) -> Result<Positions> {
    Ok(self.solve_now(graph))
  }
}

/// Longest-path rank of every node; members of one cycle share a rank.
fn rank(seeded: &[&StructuralNode], edges: &[(i64, i64)]) -> BTreeMap<i64, usize> {
  let mut graph: DiGraph<i64, ()> = DiGraph::new();
  let index: BTreeMap<i64, NodeIndex> = seeded
    .iter()
    .map(|n| (n.id, graph.add_node(n.id)))
    .collect();
  for (from, to) in edges {
    if from != to {
      graph.add_edge(index[from], index[to], ());
    }
  }

  // Tarjan yields components sinks-first.
  let components = tarjan_scc(&graph);
  let mut component_of = vec![0usize; graph.node_count()];
  for (c, members) in components.iter().enumerate() {
    for n in members {
      component_of[n.index()] = c;
    }
  }

  let mut component_rank = vec![0usize; components.len()];
  for c in (0..components.len()).rev() {
    for n in &components[c] {
      for succ in graph.neighbors_directed(*n, Direction::Outgoing) {
        let sc = component_of[succ.index()];
        if sc != c {
          component_rank[sc] = component_rank[sc].max(component_rank[c] + 1);
        }
      }
    }
  }

  index
    .iter()
    .map(|(id, n)| (*id, component_rank[component_of[n.index()]]))
    .collect()
}

fn positions_in_layers(layers: &[Vec<i64>]) -> BTreeMap<i64, f64> {
  layers
    .iter()
    .flat_map(|layer| layer.iter().enumerate().map(|(i, id)| (*id, i as f64)))
    .collect()
}

fn barycenter(values: impl Iterator<Item = f64>) -> Option<f64> {
  let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
  (count > 0).then(|| sum / count as f64)
}
