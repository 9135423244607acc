//! Layered flow layout along connections.
//!
//! Three phases:
//!   1. Layering: breadth-first graph distance from source-like nodes
//!      (no incoming edges).  Components with no source are seeded from
//!      their smallest id, so cycles still get layers.
//!   2. Ordering within layers: start from the nodes' current cross-axis
//!      order, then barycenter sweeps down and up.
//!   3. Coordinates: layers are stacked along the main axis separated by
//!      `layer_gap`, nodes within a layer are centered on a shared line and
//!      separated by `node_gap`.  The result keeps the top-left corner of
//!      the original bounding box.

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Size};
use crate::LayoutError;

const BARYCENTER_SWEEPS: usize = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowDirection {
    #[default]
    #[serde(rename = "TB", alias = "top-to-bottom")]
    TopToBottom,
    #[serde(rename = "BT", alias = "bottom-to-top")]
    BottomToTop,
    #[serde(rename = "LR", alias = "left-to-right")]
    LeftToRight,
    #[serde(rename = "RL", alias = "right-to-left")]
    RightToLeft,
}

impl FlowDirection {
    fn is_vertical(self) -> bool {
        matches!(self, Self::TopToBottom | Self::BottomToTop)
    }

    fn is_reversed(self) -> bool {
        matches!(self, Self::BottomToTop | Self::RightToLeft)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowOptions {
    #[serde(default)]
    pub direction: FlowDirection,
    /// Port whose outgoing connections define "downstream".
    #[serde(default)]
    pub source_port: Option<String>,
    /// Port whose incoming connections define "downstream".
    #[serde(default)]
    pub sink_port: Option<String>,
    #[serde(default = "default_layer_gap")]
    pub layer_gap: f64,
    #[serde(default = "default_node_gap")]
    pub node_gap: f64,
}

fn default_layer_gap() -> f64 {
    150.0
}

fn default_node_gap() -> f64 {
    50.0
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self {
            direction: FlowDirection::default(),
            source_port: None,
            sink_port: None,
            layer_gap: default_layer_gap(),
            node_gap: default_node_gap(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowNode {
    pub id: String,
    pub position: Point,
    pub size: Size,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FlowEdge {
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowResult {
    /// New top-left position per node, in input order.
    pub positions: Vec<(String, Point)>,
    pub layer_count: usize,
}

/// Directed adjacency over node indices.
struct FlowGraph {
    succ: Vec<Vec<usize>>,
    pred: Vec<Vec<usize>>,
}

impl FlowGraph {
    fn build(
        nodes: &[FlowNode],
        edges: &[FlowEdge],
        opts: &FlowOptions,
    ) -> Self {
        let index: FxHashMap<&str, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();
        let mut succ = vec![Vec::new(); nodes.len()];
        let mut pred = vec![Vec::new(); nodes.len()];

        for edge in edges {
            let Some((from, to)) = orient(edge, opts) else {
                continue;
            };
            let (Some(&u), Some(&v)) = (index.get(from), index.get(to)) else {
                continue;
            };
            if u == v || succ[u].contains(&v) {
                continue;
            }
            succ[u].push(v);
            pred[v].push(u);
        }
        Self { succ, pred }
    }
}

/// Direction of an edge under the requested port roles, or `None` when the
/// edge plays no role.
fn orient<'a>(edge: &'a FlowEdge, opts: &FlowOptions) -> Option<(&'a str, &'a str)> {
    let forward = (edge.source.as_str(), edge.target.as_str());
    let backward = (edge.target.as_str(), edge.source.as_str());
    match (opts.source_port.as_deref(), opts.sink_port.as_deref()) {
        (None, None) => Some(forward),
        (source_port, sink_port) => {
            if source_port == Some(edge.source_port.as_str())
                || sink_port == Some(edge.target_port.as_str())
            {
                Some(forward)
            } else if source_port == Some(edge.target_port.as_str())
                || sink_port == Some(edge.source_port.as_str())
            {
                Some(backward)
            } else {
                None
            }
        }
    }
}

/// Phase 1: BFS distance from source-like nodes.
fn assign_layers(nodes: &[FlowNode], graph: &FlowGraph) -> Vec<usize> {
    let n = nodes.len();
    let mut layer: Vec<Option<usize>> = vec![None; n];
    let mut queue = VecDeque::new();

    let mut by_id: Vec<usize> = (0..n).collect();
    by_id.sort_by(|&a, &b| nodes[a].id.cmp(&nodes[b].id));

    for &v in &by_id {
        if graph.pred[v].is_empty() {
            layer[v] = Some(0);
            queue.push_back(v);
        }
    }

    loop {
        while let Some(u) = queue.pop_front() {
            let next = layer[u].unwrap_or(0) + 1;
            for &v in &graph.succ[u] {
                if layer[v].is_none() {
                    layer[v] = Some(next);
                    queue.push_back(v);
                }
            }
        }
        // Whatever is left sits on a cycle unreachable from any source.
        match by_id.iter().find(|&&v| layer[v].is_none()) {
            Some(&seed) => {
                let base = graph.pred[seed]
                    .iter()
                    .filter_map(|&p| layer[p])
                    .max()
                    .map_or(0, |l| l + 1);
                layer[seed] = Some(base);
                queue.push_back(seed);
            }
            None => break,
        }
    }

    layer.into_iter().map(|l| l.unwrap_or(0)).collect()
}

fn barycenter(neighbors: &[usize], position_in_layer: &[f64]) -> Option<f64> {
    if neighbors.is_empty() {
        return None;
    }
    let sum: f64 = neighbors.iter().map(|&v| position_in_layer[v]).sum();
    Some(sum / neighbors.len() as f64)
}

/// Phase 2: order nodes within each layer.
fn order_layers(
    nodes: &[FlowNode],
    graph: &FlowGraph,
    layers: &[usize],
    vertical: bool,
) -> Vec<Vec<usize>> {
    let layer_count = layers.iter().copied().max().map_or(0, |m| m + 1);
    let mut buckets: Vec<Vec<usize>> = vec![Vec::new(); layer_count];
    for (v, &l) in layers.iter().enumerate() {
        buckets[l].push(v);
    }

    let cross = |v: usize| {
        if vertical {
            nodes[v].position.x
        } else {
            nodes[v].position.y
        }
    };
    for bucket in &mut buckets {
        bucket.sort_by(|&a, &b| {
            cross(a)
                .total_cmp(&cross(b))
                .then_with(|| nodes[a].id.cmp(&nodes[b].id))
        });
    }

    let mut slot = vec![0.0; nodes.len()];
    let refresh = |buckets: &[Vec<usize>], slot: &mut [f64]| {
        for bucket in buckets {
            for (i, &v) in bucket.iter().enumerate() {
                slot[v] = i as f64;
            }
        }
    };
    refresh(&buckets, &mut slot);

    for sweep in 0..BARYCENTER_SWEEPS {
        let downward = sweep % 2 == 0;
        let order: Vec<usize> = if downward {
            (1..layer_count).collect()
        } else {
            (0..layer_count.saturating_sub(1)).rev().collect()
        };
        for l in order {
            let mut scored: Vec<(usize, f64)> = buckets[l]
                .iter()
                .map(|&v| {
                    let neighbors = if downward { &graph.pred[v] } else { &graph.succ[v] };
                    (v, barycenter(neighbors, &slot).unwrap_or(slot[v]))
                })
                .collect();
            scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| slot[a.0].total_cmp(&slot[b.0])));
            buckets[l] = scored.into_iter().map(|(v, _)| v).collect();
            refresh(&buckets, &mut slot);
        }
    }
    buckets
}

/// Lay out `nodes` in layers following `edges`.
pub fn flow_layout(
    nodes: &[FlowNode],
    edges: &[FlowEdge],
    opts: &FlowOptions,
) -> Result<FlowResult, LayoutError> {
    if !(opts.layer_gap.is_finite() && opts.layer_gap >= 0.0) {
        return Err(LayoutError::InvalidParameter(format!(
            "layerGap must be a non-negative number, got {}",
            opts.layer_gap
        )));
    }
    if !(opts.node_gap.is_finite() && opts.node_gap >= 0.0) {
        return Err(LayoutError::InvalidParameter(format!(
            "nodeGap must be a non-negative number, got {}",
            opts.node_gap
        )));
    }
    if nodes.is_empty() {
        return Ok(FlowResult::default());
    }

    let vertical = opts.direction.is_vertical();
    let graph = FlowGraph::build(nodes, edges, opts);
    let layers = assign_layers(nodes, &graph);
    let buckets = order_layers(nodes, &graph, &layers, vertical);

    // (main, cross) extents per node.
    let extent = |v: usize| {
        let s = nodes[v].size;
        if vertical {
            (s.height, s.width)
        } else {
            (s.width, s.height)
        }
    };

    let layer_thickness: Vec<f64> = buckets
        .iter()
        .map(|b| b.iter().map(|&v| extent(v).0).fold(0.0, f64::max))
        .collect();
    let layer_span: Vec<f64> = buckets
        .iter()
        .map(|b| {
            let total: f64 = b.iter().map(|&v| extent(v).1).sum();
            total + opts.node_gap * b.len().saturating_sub(1) as f64
        })
        .collect();
    let widest = layer_span.iter().copied().fold(0.0, f64::max);
    let total_main: f64 = layer_thickness.iter().sum::<f64>()
        + opts.layer_gap * buckets.len().saturating_sub(1) as f64;

    let mut local = vec![(0.0, 0.0); nodes.len()];
    let mut main = 0.0;
    for (l, bucket) in buckets.iter().enumerate() {
        let mut cross = (widest - layer_span[l]) / 2.0;
        for &v in bucket {
            let (thickness, breadth) = extent(v);
            let along = if opts.direction.is_reversed() {
                total_main - main - thickness
            } else {
                main
            };
            local[v] = (along, cross);
            cross += breadth + opts.node_gap;
        }
        main += layer_thickness[l] + opts.layer_gap;
    }

    let origin = nodes.iter().fold(
        Point::new(f64::INFINITY, f64::INFINITY),
        |acc, n| Point::new(acc.x.min(n.position.x), acc.y.min(n.position.y)),
    );

    let positions = nodes
        .iter()
        .enumerate()
        .map(|(v, n)| {
            let (along, cross) = local[v];
            let p = if vertical {
                Point::new(origin.x + cross, origin.y + along)
            } else {
                Point::new(origin.x + along, origin.y + cross)
            };
            (n.id.clone(), p)
        })
        .collect();

    log::debug!(
        "flow layout: {} nodes in {} layers ({:?})",
        nodes.len(),
        buckets.len(),
        opts.direction
    );
    Ok(FlowResult {
        positions,
        layer_count: buckets.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, x: f64, y: f64) -> FlowNode {
        FlowNode {
            id: id.into(),
            position: Point::new(x, y),
            size: Size::new(100.0, 50.0),
        }
    }

    fn edge(s: &str, t: &str) -> FlowEdge {
        FlowEdge {
            source: s.into(),
            source_port: "flow-out".into(),
            target: t.into(),
            target_port: "flow-in".into(),
        }
    }

    fn pos(r: &FlowResult, id: &str) -> Point {
        r.positions.iter().find(|(i, _)| i == id).map(|(_, p)| *p).unwrap()
    }

    #[test]
    fn test_chain_top_to_bottom() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0), node("c", 0.0, 0.0)];
        let edges = vec![edge("a", "b"), edge("b", "c")];
        let r = flow_layout(&nodes, &edges, &FlowOptions::default()).unwrap();
        assert_eq!(r.layer_count, 3);
        assert_eq!(pos(&r, "a").y, 0.0);
        assert_eq!(pos(&r, "b").y, 50.0 + 150.0);
        assert_eq!(pos(&r, "c").y, 2.0 * (50.0 + 150.0));
        assert_eq!(pos(&r, "a").x, pos(&r, "c").x);
    }

    #[test]
    fn test_bottom_to_top_reverses() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0)];
        let opts = FlowOptions {
            direction: FlowDirection::BottomToTop,
            ..FlowOptions::default()
        };
        let r = flow_layout(&nodes, &[edge("a", "b")], &opts).unwrap();
        assert!(pos(&r, "a").y > pos(&r, "b").y);
    }

    #[test]
    fn test_left_to_right_and_right_to_left() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0)];
        let edges = vec![edge("a", "b")];
        let lr = flow_layout(
            &nodes,
            &edges,
            &FlowOptions {
                direction: FlowDirection::LeftToRight,
                ..FlowOptions::default()
            },
        )
        .unwrap();
        assert_eq!(pos(&lr, "b").x, 100.0 + 150.0);
        assert_eq!(pos(&lr, "a").y, pos(&lr, "b").y);

        let rl = flow_layout(
            &nodes,
            &edges,
            &FlowOptions {
                direction: FlowDirection::RightToLeft,
                ..FlowOptions::default()
            },
        )
        .unwrap();
        assert!(pos(&rl, "a").x > pos(&rl, "b").x);
    }

    #[test]
    fn test_keeps_bounding_box_origin() {
        let nodes = vec![node("a", 400.0, 300.0), node("b", 900.0, 700.0)];
        let r = flow_layout(&nodes, &[edge("a", "b")], &FlowOptions::default()).unwrap();
        assert_eq!(pos(&r, "a"), Point::new(400.0, 300.0));
    }

    #[test]
    fn test_layer_is_shortest_distance() {
        // a → b → c and a → c: c sits one layer below a.
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0), node("c", 0.0, 0.0)];
        let edges = vec![edge("a", "b"), edge("b", "c"), edge("a", "c")];
        let r = flow_layout(&nodes, &edges, &FlowOptions::default()).unwrap();
        assert_eq!(r.layer_count, 2);
        assert_eq!(pos(&r, "b").y, pos(&r, "c").y);
    }

    #[test]
    fn test_cycle_still_layered() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0)];
        let edges = vec![edge("a", "b"), edge("b", "a")];
        let r = flow_layout(&nodes, &edges, &FlowOptions::default()).unwrap();
        assert_eq!(r.layer_count, 2);
        assert!(pos(&r, "a").y < pos(&r, "b").y);
    }

    #[test]
    fn test_sink_port_role_orients_edges() {
        // Connection drawn from b's flow-in to a's flow-out: with the sink
        // role on flow-in, a is upstream.
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0)];
        let edges = vec![FlowEdge {
            source: "b".into(),
            source_port: "flow-in".into(),
            target: "a".into(),
            target_port: "flow-out".into(),
        }];
        let opts = FlowOptions {
            sink_port: Some("flow-in".into()),
            ..FlowOptions::default()
        };
        let r = flow_layout(&nodes, &edges, &opts).unwrap();
        assert!(pos(&r, "a").y < pos(&r, "b").y);
    }

    #[test]
    fn test_unrelated_ports_ignored_with_roles() {
        let nodes = vec![node("a", 0.0, 0.0), node("b", 0.0, 0.0)];
        let edges = vec![FlowEdge {
            source: "a".into(),
            source_port: "parent".into(),
            target: "b".into(),
            target_port: "child".into(),
        }];
        let opts = FlowOptions {
            source_port: Some("flow-out".into()),
            ..FlowOptions::default()
        };
        let r = flow_layout(&nodes, &edges, &opts).unwrap();
        assert_eq!(r.layer_count, 1);
    }

    #[test]
    fn test_siblings_do_not_overlap() {
        let nodes = vec![
            node("root", 0.0, 0.0),
            node("x", 10.0, 0.0),
            node("y", 0.0, 0.0),
            node("z", 5.0, 0.0),
        ];
        let edges = vec![edge("root", "x"), edge("root", "y"), edge("root", "z")];
        let r = flow_layout(&nodes, &edges, &FlowOptions::default()).unwrap();
        let mut xs: Vec<f64> = ["x", "y", "z"].iter().map(|id| pos(&r, id).x).collect();
        xs.sort_by(f64::total_cmp);
        assert!(xs[1] - xs[0] >= 100.0 + 50.0 - 1e-9);
        assert!(xs[2] - xs[1] >= 100.0 + 50.0 - 1e-9);
    }

    #[test]
    fn test_rejects_negative_gap() {
        let opts = FlowOptions {
            layer_gap: -1.0,
            ..FlowOptions::default()
        };
        assert!(matches!(
            flow_layout(&[node("a", 0.0, 0.0)], &[], &opts),
            Err(LayoutError::InvalidParameter(_))
        ));
    }
}
