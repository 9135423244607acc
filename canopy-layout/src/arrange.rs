//! Constraint arrangement.
//!
//! `preserve` keeps the current placement and projects it onto the
//! constraints, moving each node as little as the constraint allows.
//! `force` first relaxes a spring model: connected nodes pull towards the
//! ideal edge length, unconnected nodes push apart only while closer than
//! one and a half ideal lengths.  Relaxation stops as soon as every
//! node's step falls under a tolerance, and a layout that is already in
//! balance is not touched.  It then projects onto the constraints and
//! removes overlaps.
//!
//! Projection passes repeat until nothing moves, so running the same
//! arrangement on its own output is a no-op.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect, Size};
use crate::LayoutError;

const EPS: f64 = 1e-6;
const MAX_PASSES: usize = 32;
const MAX_ITERATIONS: usize = 10_000;
/// Unconnected nodes stop repelling beyond this many ideal lengths.
const REPULSION_RANGE: f64 = 1.5;
/// Relaxation is balanced once no node would step further than this
/// fraction of the ideal length.
const BALANCE_TOLERANCE: f64 = 1e-4;
/// Fraction of the averaged correction applied per iteration.
const DAMPING: f64 = 0.5;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrangeStrategy {
    #[default]
    Preserve,
    Force,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Constraint {
    /// Equalize the `axis` coordinate of the nodes' start, center or end.
    Align {
        axis: Axis,
        node_ids: Vec<String>,
        #[serde(default)]
        alignment: Alignment,
    },
    /// Space nodes along `axis`: a fixed edge-to-edge gap when `spacing` is
    /// set, otherwise evenly between the first and last node.
    Distribute {
        axis: Axis,
        node_ids: Vec<String>,
        #[serde(default)]
        spacing: Option<f64>,
    },
    /// Keep at least `distance` between node bounds.
    MinSeparation {
        distance: f64,
        #[serde(default)]
        node_ids: Option<Vec<String>>,
    },
    /// Never move this node.
    Pin { node_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrangeOptions {
    #[serde(default)]
    pub strategy: ArrangeStrategy,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default = "default_ideal_length")]
    pub ideal_length: f64,
}

fn default_iterations() -> usize {
    100
}

fn default_ideal_length() -> f64 {
    250.0
}

impl Default for ArrangeOptions {
    fn default() -> Self {
        Self {
            strategy: ArrangeStrategy::default(),
            constraints: Vec::new(),
            iterations: default_iterations(),
            ideal_length: default_ideal_length(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArrangeNode {
    pub id: String,
    pub position: Point,
    pub size: Size,
}

/// Constraint with ids resolved to indices.
enum Resolved {
    Align(Axis, Vec<usize>, Alignment),
    Distribute(Axis, Vec<usize>, Option<f64>),
    Separate(f64, Vec<usize>),
}

struct Arrangement<'a> {
    nodes: &'a [ArrangeNode],
    pos: Vec<Point>,
    pinned: Vec<bool>,
}

fn coord(p: Point, axis: Axis) -> f64 {
    match axis {
        Axis::X => p.x,
        Axis::Y => p.y,
    }
}

fn extent(s: Size, axis: Axis) -> f64 {
    match axis {
        Axis::X => s.width,
        Axis::Y => s.height,
    }
}

impl<'a> Arrangement<'a> {
    fn new(nodes: &'a [ArrangeNode]) -> Self {
        Self {
            nodes,
            pos: nodes.iter().map(|n| n.position).collect(),
            pinned: vec![false; nodes.len()],
        }
    }

    fn rect(&self, i: usize) -> Rect {
        Rect::at(self.pos[i], self.nodes[i].size)
    }

    fn center(&self, i: usize) -> Point {
        self.rect(i).center()
    }

    /// Move node `i` along `axis` to `value`; returns whether it moved.
    fn set(&mut self, i: usize, axis: Axis, value: f64) -> bool {
        if self.pinned[i] {
            return false;
        }
        let current = coord(self.pos[i], axis);
        if (current - value).abs() <= EPS {
            return false;
        }
        match axis {
            Axis::X => self.pos[i].x = value,
            Axis::Y => self.pos[i].y = value,
        }
        true
    }

    fn nudge(&mut self, i: usize, dx: f64, dy: f64) {
        if !self.pinned[i] {
            self.pos[i] = self.pos[i].offset(Point::new(dx, dy));
        }
    }

    fn align(&mut self, axis: Axis, idx: &[usize], alignment: Alignment) -> bool {
        if idx.len() < 2 {
            return false;
        }
        let anchor = |s: &Self, i: usize| {
            let start = coord(s.pos[i], axis);
            let size = extent(s.nodes[i].size, axis);
            match alignment {
                Alignment::Start => start,
                Alignment::Center => start + size / 2.0,
                Alignment::End => start + size,
            }
        };
        let target = match idx.iter().find(|&&i| self.pinned[i]) {
            Some(&p) => anchor(self, p),
            None => {
                let values = idx.iter().map(|&i| anchor(self, i));
                match alignment {
                    Alignment::Start => values.fold(f64::INFINITY, f64::min),
                    Alignment::End => values.fold(f64::NEG_INFINITY, f64::max),
                    Alignment::Center => values.sum::<f64>() / idx.len() as f64,
                }
            }
        };
        let mut moved = false;
        for &i in idx {
            let delta = target - anchor(self, i);
            let value = coord(self.pos[i], axis) + delta;
            moved |= self.set(i, axis, value);
        }
        moved
    }

    fn distribute(&mut self, axis: Axis, idx: &[usize], spacing: Option<f64>) -> bool {
        let mut order = idx.to_vec();
        order.sort_by(|&a, &b| {
            coord(self.pos[a], axis)
                .total_cmp(&coord(self.pos[b], axis))
                .then_with(|| self.nodes[a].id.cmp(&self.nodes[b].id))
        });
        let gap = match spacing {
            Some(gap) => gap,
            None => {
                if order.len() < 3 {
                    return false;
                }
                let (first, last) = (order[0], order[order.len() - 1]);
                let span = coord(self.pos[last], axis) + extent(self.nodes[last].size, axis)
                    - coord(self.pos[first], axis);
                let occupied: f64 = order.iter().map(|&i| extent(self.nodes[i].size, axis)).sum();
                ((span - occupied) / (order.len() - 1) as f64).max(0.0)
            }
        };

        let mut moved = false;
        let mut cursor: Option<f64> = None;
        for &i in &order {
            if let Some(at) = cursor {
                moved |= self.set(i, axis, at);
            }
            cursor = Some(coord(self.pos[i], axis) + extent(self.nodes[i].size, axis) + gap);
        }
        moved
    }

    fn separate(&mut self, distance: f64, idx: &[usize]) -> bool {
        let margin = distance / 2.0;
        let mut moved = false;
        for (n, &i) in idx.iter().enumerate() {
            for &j in &idx[n + 1..] {
                if self.pinned[i] && self.pinned[j] {
                    continue;
                }
                let a = self.rect(i).inflate(margin);
                let b = self.rect(j).inflate(margin);
                let overlap_x = a.right().min(b.right()) - a.x.max(b.x);
                let overlap_y = a.bottom().min(b.bottom()) - a.y.max(b.y);
                if overlap_x <= EPS || overlap_y <= EPS {
                    continue;
                }

                let (share_i, share_j) = match (self.pinned[i], self.pinned[j]) {
                    (true, _) => (0.0, 1.0),
                    (_, true) => (1.0, 0.0),
                    _ => (0.5, 0.5),
                };
                let (ci, cj) = (self.center(i), self.center(j));
                if overlap_x <= overlap_y {
                    let dir = if cj.x >= ci.x { 1.0 } else { -1.0 };
                    self.nudge(i, -dir * overlap_x * share_i, 0.0);
                    self.nudge(j, dir * overlap_x * share_j, 0.0);
                } else {
                    let dir = if cj.y >= ci.y { 1.0 } else { -1.0 };
                    self.nudge(i, 0.0, -dir * overlap_y * share_i);
                    self.nudge(j, 0.0, dir * overlap_y * share_j);
                }
                moved = true;
            }
        }
        moved
    }

    /// Damped step each node would take: the average of its spring
    /// corrections.  Pinned nodes get no step.
    fn steps(&self, adjacent: &[Vec<bool>], ideal: f64) -> Vec<Point> {
        let n = self.nodes.len();
        let range = ideal * REPULSION_RANGE;
        let mut sum = vec![Point::ORIGIN; n];
        let mut count = vec![0usize; n];

        for i in 0..n {
            for j in i + 1..n {
                let rest = if adjacent[i][j] { ideal } else { range };
                let (ci, cj) = (self.center(i), self.center(j));
                let (mut dx, mut dy) = (cj.x - ci.x, cj.y - ci.y);
                let mut d = (dx * dx + dy * dy).sqrt();
                if !adjacent[i][j] && d >= range {
                    continue;
                }
                if d < 0.01 {
                    // Coincident: separate along a fixed per-pair angle.
                    let angle = (i * 7 + j * 13) as f64;
                    dx = angle.cos();
                    dy = angle.sin();
                    d = 1.0;
                }
                // Half the length error each, moving i and j apart or together.
                let half = (d - rest) / 2.0;
                let (ux, uy) = (dx / d * half, dy / d * half);
                sum[i] = sum[i].offset(Point::new(ux, uy));
                sum[j] = sum[j].minus(Point::new(ux, uy));
                count[i] += 1;
                count[j] += 1;
            }
        }

        let cap = ideal * 0.5;
        (0..n)
            .map(|i| {
                if self.pinned[i] || count[i] == 0 {
                    return Point::ORIGIN;
                }
                let scale = DAMPING / count[i] as f64;
                let step = Point::new(sum[i].x * scale, sum[i].y * scale);
                let len = step.distance(Point::ORIGIN);
                if len > cap {
                    Point::new(step.x / len * cap, step.y / len * cap)
                } else {
                    step
                }
            })
            .collect()
    }

    /// Relax until balanced or `iterations` run out; returns the number of
    /// steps taken.
    fn relax(&mut self, edges: &[(usize, usize)], iterations: usize, ideal: f64) -> usize {
        let n = self.nodes.len();
        let mut adjacent = vec![vec![false; n]; n];
        for &(u, v) in edges {
            adjacent[u][v] = true;
            adjacent[v][u] = true;
        }
        let tolerance = ideal * BALANCE_TOLERANCE;

        for it in 0..iterations {
            let steps = self.steps(&adjacent, ideal);
            let largest = steps
                .iter()
                .map(|s| s.distance(Point::ORIGIN))
                .fold(0.0, f64::max);
            if largest <= tolerance {
                return it;
            }
            for (i, step) in steps.into_iter().enumerate() {
                self.nudge(i, step.x, step.y);
            }
        }
        iterations
    }
}

/// Reposition `nodes` per `opts`; `edges` are `(source, target)` id pairs
/// used by the force strategy.  Returns only the nodes that moved, in input
/// order.
pub fn arrange(
    nodes: &[ArrangeNode],
    edges: &[(String, String)],
    opts: &ArrangeOptions,
) -> Result<Vec<(String, Point)>, LayoutError> {
    if opts.iterations > MAX_ITERATIONS {
        return Err(LayoutError::InvalidParameter(format!(
            "iterations must be at most {MAX_ITERATIONS}, got {}",
            opts.iterations
        )));
    }
    if !(opts.ideal_length.is_finite() && opts.ideal_length > 0.0) {
        return Err(LayoutError::InvalidParameter(format!(
            "idealLength must be positive, got {}",
            opts.ideal_length
        )));
    }

    let index: FxHashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let lookup = |ids: &[String]| -> Result<Vec<usize>, LayoutError> {
        ids.iter()
            .map(|id| {
                index
                    .get(id.as_str())
                    .copied()
                    .ok_or_else(|| LayoutError::UnknownNode(id.clone()))
            })
            .collect()
    };

    let mut state = Arrangement::new(nodes);
    let mut resolved = Vec::new();
    for constraint in &opts.constraints {
        match constraint {
            Constraint::Pin { node_id } => {
                let i = lookup(std::slice::from_ref(node_id))?[0];
                state.pinned[i] = true;
            }
            Constraint::Align {
                axis,
                node_ids,
                alignment,
            } => resolved.push(Resolved::Align(*axis, lookup(node_ids)?, *alignment)),
            Constraint::Distribute {
                axis,
                node_ids,
                spacing,
            } => {
                if spacing.is_some_and(|s| !s.is_finite() || s < 0.0) {
                    return Err(LayoutError::InvalidParameter(
                        "spacing must be a non-negative number".into(),
                    ));
                }
                resolved.push(Resolved::Distribute(*axis, lookup(node_ids)?, *spacing));
            }
            Constraint::MinSeparation { distance, node_ids } => {
                if !distance.is_finite() || *distance < 0.0 {
                    return Err(LayoutError::InvalidParameter(
                        "distance must be a non-negative number".into(),
                    ));
                }
                let idx = match node_ids {
                    Some(ids) => lookup(ids)?,
                    None => (0..nodes.len()).collect(),
                };
                resolved.push(Resolved::Separate(*distance, idx));
            }
        }
    }

    if opts.strategy == ArrangeStrategy::Force {
        let edge_idx: Vec<(usize, usize)> = edges
            .iter()
            .filter_map(|(s, t)| Some((*index.get(s.as_str())?, *index.get(t.as_str())?)))
            .filter(|(s, t)| s != t)
            .collect();
        let steps = state.relax(&edge_idx, opts.iterations, opts.ideal_length);
        log::trace!("force relaxation took {steps} steps");
        // Force layouts always end overlap-free.
        resolved.push(Resolved::Separate(0.0, (0..nodes.len()).collect()));
    }

    let mut passes = 0;
    while passes < MAX_PASSES {
        passes += 1;
        let mut moved = false;
        for r in &resolved {
            moved |= match r {
                Resolved::Align(axis, idx, alignment) => state.align(*axis, idx, *alignment),
                Resolved::Distribute(axis, idx, spacing) => {
                    state.distribute(*axis, idx, *spacing)
                }
                Resolved::Separate(distance, idx) => state.separate(*distance, idx),
            };
        }
        if !moved {
            break;
        }
    }
    log::debug!(
        "arrange: {} nodes, {} constraints, {:?}, {passes} passes",
        nodes.len(),
        opts.constraints.len(),
        opts.strategy
    );

    Ok(nodes
        .iter()
        .zip(state.pos)
        .filter(|(n, p)| !n.position.approx_eq(*p))
        .map(|(n, p)| (n.id.clone(), p))
        .collect())
}
