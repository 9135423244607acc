//! Organizer nesting geometry.
//!
//! Nodes live in a flat, id-keyed arena; a parent is an id reference, never
//! a pointer.  Concurrent edits can leave dangling or cyclic parent chains,
//! so every walk here is bounded by depth and tracks what it has visited.
//!
//! Positions of parented nodes are relative to their parent organizer's
//! top-left corner.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::geometry::{Point, Rect, Size, DEFAULT_NODE_SIZE};

/// Upper bound on parent-chain walks.
pub const MAX_NESTING_DEPTH: usize = 20;

/// Padding between an organizer's edge and its members.
pub const ORGANIZER_PADDING: f64 = 20.0;

/// Extra space above the members for the organizer's label.
pub const ORGANIZER_HEADER: f64 = 40.0;

#[derive(Clone, Debug, PartialEq)]
pub enum GeoKind {
    Construct { semantic_id: String },
    Organizer { attached_to: Option<String> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct GeoNode {
    pub id: String,
    pub parent_id: Option<String>,
    /// Relative to the parent when `parent_id` resolves, absolute otherwise.
    pub position: Point,
    /// Measured size, `None` when unknown.
    pub size: Option<Size>,
    pub kind: GeoKind,
}

impl GeoNode {
    pub fn construct(id: impl Into<String>, semantic_id: impl Into<String>, position: Point) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            position,
            size: None,
            kind: GeoKind::Construct {
                semantic_id: semantic_id.into(),
            },
        }
    }

    pub fn organizer(id: impl Into<String>, position: Point, size: Size) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            position,
            size: Some(size),
            kind: GeoKind::Organizer { attached_to: None },
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn attached_to(mut self, semantic_id: impl Into<String>) -> Self {
        if let GeoKind::Organizer { attached_to } = &mut self.kind {
            *attached_to = Some(semantic_id.into());
        }
        self
    }

    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn is_organizer(&self) -> bool {
        matches!(self.kind, GeoKind::Organizer { .. })
    }

    pub fn effective_size(&self) -> Size {
        self.size.unwrap_or(DEFAULT_NODE_SIZE)
    }
}

/// A member's new absolute position after its organizer is dissolved.
#[derive(Clone, Debug, PartialEq)]
pub struct Detached {
    pub id: String,
    pub position: Point,
}

/// Flat id-keyed collection of every node on a page.
#[derive(Clone, Debug, Default)]
pub struct NodeArena {
    nodes: FxHashMap<String, GeoNode>,
    by_semantic_id: FxHashMap<String, String>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_nodes(nodes: impl IntoIterator<Item = GeoNode>) -> Self {
        let mut arena = Self::new();
        for node in nodes {
            arena.insert(node);
        }
        arena
    }

    pub fn insert(&mut self, node: GeoNode) {
        if let GeoKind::Construct { semantic_id } = &node.kind {
            self.by_semantic_id.insert(semantic_id.clone(), node.id.clone());
        }
        self.nodes.insert(node.id.clone(), node);
    }

    pub fn get(&self, id: &str) -> Option<&GeoNode> {
        self.nodes.get(id)
    }

    pub fn by_semantic_id(&self, semantic_id: &str) -> Option<&GeoNode> {
        self.by_semantic_id
            .get(semantic_id)
            .and_then(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parent of `node`, or `None` when unset or dangling.
    fn resolved_parent(&self, node: &GeoNode) -> Option<&GeoNode> {
        node.parent_id.as_deref().and_then(|pid| self.nodes.get(pid))
    }

    /// True canvas position: own offset plus every ancestor's offset.
    ///
    /// A dangling parent ends the walk as if the node were unparented.  The
    /// walk stops after [`MAX_NESTING_DEPTH`] ancestors or on revisiting a
    /// node, whichever comes first.
    pub fn absolute_position(&self, id: &str) -> Option<Point> {
        let node = self.nodes.get(id)?;
        let mut position = node.position;
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        seen.insert(node.id.as_str());

        let mut current = node;
        for _ in 0..MAX_NESTING_DEPTH {
            let Some(parent) = self.resolved_parent(current) else {
                break;
            };
            if !seen.insert(parent.id.as_str()) {
                log::warn!("parent cycle detected at {}", parent.id);
                break;
            }
            position = position.offset(parent.position);
            current = parent;
        }
        Some(position)
    }

    /// Absolute rectangle of a node, using the default size when unknown.
    pub fn absolute_rect(&self, id: &str) -> Option<Rect> {
        let node = self.nodes.get(id)?;
        let origin = self.absolute_position(id)?;
        Some(Rect::at(origin, node.effective_size()))
    }

    /// Whether `child_id` may be placed inside organizer `target_id`.
    ///
    /// Constructs may join any organizer.  An organizer may join another
    /// only when it is attached to a construct that is already a direct
    /// member of the target, which keeps organizer nesting acyclic.
    pub fn can_nest(&self, child_id: &str, target_id: &str) -> bool {
        if child_id == target_id {
            return false;
        }
        let (Some(child), Some(target)) = (self.nodes.get(child_id), self.nodes.get(target_id))
        else {
            return false;
        };
        if !target.is_organizer() {
            return false;
        }
        match &child.kind {
            GeoKind::Construct { .. } => true,
            GeoKind::Organizer { attached_to: None } => false,
            GeoKind::Organizer {
                attached_to: Some(semantic_id),
            } => self
                .by_semantic_id(semantic_id)
                .and_then(|bound| bound.parent_id.as_deref())
                .is_some_and(|pid| pid == target_id),
        }
    }

    /// Smallest rectangle enclosing the absolute rects of `ids`, grown by
    /// `padding` on every side.  Unknown ids are skipped; `None` when
    /// nothing resolves.
    pub fn compute_bounds<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a str>,
        padding: f64,
    ) -> Option<Rect> {
        ids.into_iter()
            .filter_map(|id| self.absolute_rect(id))
            .reduce(|acc, r| acc.union(&r))
            .map(|r| r.inflate(padding))
    }

    /// Bounds for an organizer wrapping `ids`: padded, with room for the
    /// label above the members.
    pub fn organizer_bounds<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Option<Rect> {
        self.compute_bounds(ids, ORGANIZER_PADDING).map(|r| {
            Rect::new(r.x, r.y - ORGANIZER_HEADER, r.width, r.height + ORGANIZER_HEADER)
        })
    }

    /// Direct members of `parent_id`, sorted by id for determinism.
    pub fn children_of(&self, parent_id: &str) -> Vec<&GeoNode> {
        let mut children: Vec<&GeoNode> = self
            .nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(parent_id))
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));
        children
    }

    /// New absolute positions for every direct member of `organizer_id`,
    /// as needed when the organizer is removed or ungrouped.
    pub fn detach_members(&self, organizer_id: &str) -> Vec<Detached> {
        let Some(base) = self.absolute_position(organizer_id) else {
            return Vec::new();
        };
        self.children_of(organizer_id)
            .into_iter()
            .map(|child| Detached {
                id: child.id.clone(),
                position: base.offset(child.position),
            })
            .collect()
    }

    /// `root` plus every node reachable through parent edges, breadth-first,
    /// at most `max_depth` levels below the root.
    pub fn collect_descendants(&self, root: &str, max_depth: usize) -> Vec<String> {
        if !self.nodes.contains_key(root) {
            return Vec::new();
        }
        let mut children: FxHashMap<&str, Vec<&str>> = FxHashMap::default();
        for node in self.nodes.values() {
            if let Some(pid) = node.parent_id.as_deref() {
                children.entry(pid).or_default().push(node.id.as_str());
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        let mut visited: FxHashSet<&str> = FxHashSet::default();
        visited.insert(root);
        let mut result = vec![root.to_string()];
        let mut frontier = vec![root];

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for id in frontier {
                for &child in children.get(id).map(Vec::as_slice).unwrap_or_default() {
                    if visited.insert(child) {
                        result.push(child.to_string());
                        next.push(child);
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, x: f64, y: f64) -> GeoNode {
        GeoNode::organizer(id, Point::new(x, y), Size::new(400.0, 300.0))
    }

    #[test]
    fn test_absolute_position_sums_chain() {
        let arena = NodeArena::from_nodes([
            group("outer", 100.0, 100.0),
            group("inner", 10.0, 20.0).with_parent("outer"),
            GeoNode::construct("n1", "svc", Point::new(5.0, 5.0)).with_parent("inner"),
        ]);
        assert_eq!(
            arena.absolute_position("n1"),
            Some(Point::new(115.0, 125.0))
        );
    }

    #[test]
    fn test_dangling_parent_treated_as_unparented() {
        let arena = NodeArena::from_nodes([
            GeoNode::construct("n1", "svc", Point::new(5.0, 7.0)).with_parent("ghost"),
        ]);
        assert_eq!(arena.absolute_position("n1"), Some(Point::new(5.0, 7.0)));
    }

    #[test]
    fn test_cyclic_parents_terminate() {
        let arena = NodeArena::from_nodes([
            group("a", 1.0, 1.0).with_parent("b"),
            group("b", 2.0, 2.0).with_parent("a"),
        ]);
        // a + b, then the walk hits `a` again and stops.
        assert_eq!(arena.absolute_position("a"), Some(Point::new(3.0, 3.0)));
    }

    #[test]
    fn test_constructs_nest_in_any_organizer() {
        let arena = NodeArena::from_nodes([
            group("g", 0.0, 0.0),
            GeoNode::construct("n1", "svc", Point::ORIGIN),
        ]);
        assert!(arena.can_nest("n1", "g"));
        assert!(!arena.can_nest("g", "n1"));
        assert!(!arena.can_nest("g", "g"));
        assert!(!arena.can_nest("n1", "missing"));
    }

    #[test]
    fn test_unattached_organizer_never_nests() {
        let ids = ["a", "b", "c", "d"];
        let mut nodes: Vec<GeoNode> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| group(id, i as f64 * 10.0, 0.0))
            .collect();
        // Arbitrary parent links, including a cycle.
        nodes[1].parent_id = Some("a".into());
        nodes[2].parent_id = Some("b".into());
        nodes[0].parent_id = Some("c".into());
        nodes.push(GeoNode::construct("n", "svc", Point::ORIGIN).with_parent("a"));
        let arena = NodeArena::from_nodes(nodes);

        for inner in ids {
            for outer in ids {
                assert!(!arena.can_nest(inner, outer), "{inner} -> {outer}");
            }
        }
    }

    #[test]
    fn test_wagon_nests_only_where_its_construct_lives() {
        let arena = NodeArena::from_nodes([
            group("outer", 0.0, 0.0),
            group("other", 500.0, 0.0),
            GeoNode::construct("n1", "svc", Point::ORIGIN).with_parent("outer"),
            group("wagon", 0.0, 120.0).attached_to("svc"),
        ]);
        assert!(arena.can_nest("wagon", "outer"));
        assert!(!arena.can_nest("wagon", "other"));
    }

    #[test]
    fn test_compute_bounds_uses_default_size() {
        let arena = NodeArena::from_nodes([
            GeoNode::construct("a", "a", Point::new(0.0, 0.0)),
            GeoNode::construct("b", "b", Point::new(300.0, 50.0)).with_size(Size::new(50.0, 50.0)),
        ]);
        let bounds = arena.compute_bounds(["a", "b"], 10.0).unwrap();
        assert_eq!(bounds, Rect::new(-10.0, -10.0, 370.0, 120.0));
        assert!(arena.compute_bounds(["zzz"], 10.0).is_none());
    }

    #[test]
    fn test_organizer_bounds_leave_header_room() {
        let arena = NodeArena::from_nodes([GeoNode::construct("a", "a", Point::new(100.0, 100.0))]);
        let r = arena.organizer_bounds(["a"]).unwrap();
        assert_eq!(r.y, 100.0 - ORGANIZER_PADDING - ORGANIZER_HEADER);
        assert_eq!(r.height, DEFAULT_NODE_SIZE.height + 2.0 * ORGANIZER_PADDING + ORGANIZER_HEADER);
    }

    #[test]
    fn test_detach_round_trip() {
        let arena = NodeArena::from_nodes([
            group("g", 100.0, 100.0),
            GeoNode::construct("m", "m", Point::new(50.0, 50.0)).with_parent("g"),
        ]);
        let detached = arena.detach_members("g");
        assert_eq!(
            detached,
            vec![Detached {
                id: "m".into(),
                position: Point::new(150.0, 150.0)
            }]
        );
    }

    #[test]
    fn test_collect_descendants_bounded_on_cycle() {
        let arena = NodeArena::from_nodes([
            group("a", 0.0, 0.0).with_parent("c"),
            group("b", 0.0, 0.0).with_parent("a"),
            group("c", 0.0, 0.0).with_parent("b"),
        ]);
        let all = arena.collect_descendants("a", 10);
        assert_eq!(all, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_collect_descendants_respects_max_depth() {
        let mut nodes = vec![group("n0", 0.0, 0.0)];
        for i in 1..30 {
            nodes.push(group(&format!("n{i}"), 0.0, 0.0).with_parent(format!("n{}", i - 1)));
        }
        let arena = NodeArena::from_nodes(nodes);
        for depth in [0, 1, 5, 20] {
            assert_eq!(arena.collect_descendants("n0", depth).len(), depth + 1);
        }
        assert!(arena.collect_descendants("missing", 5).is_empty());
    }
}
