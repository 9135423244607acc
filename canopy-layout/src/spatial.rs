//! Uniform-grid index of occupied rectangles.
//!
//! Each rectangle is registered in every cell it touches, so an overlap
//! query only inspects the cells under the queried area instead of every node on
//! the page.  Rectangles spanning more than [`MAX_CELL_SPAN`] cells on an
//! axis (a huge organizer, say) are kept in a side list and tested
//! linearly.

use std::hash::Hash;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::geometry::Rect;

pub const MAX_CELL_SPAN: i64 = 64;

const MIN_CELL_SIZE: f64 = 1.0;

type Cell = (i64, i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CellSpan {
    first: Cell,
    last: Cell,
}

impl CellSpan {
    /// Spans of saturated casts count as wide, so the grid never walks them.
    fn is_wide(&self) -> bool {
        self.last.0.saturating_sub(self.first.0) > MAX_CELL_SPAN
            || self.last.1.saturating_sub(self.first.1) > MAX_CELL_SPAN
    }

    fn cells(self) -> impl Iterator<Item = Cell> {
        (self.first.0..=self.last.0)
            .flat_map(move |cx| (self.first.1..=self.last.1).map(move |cy| (cx, cy)))
    }
}

#[derive(Clone, Debug)]
pub struct SpatialHash<K> {
    cell_size: f64,
    cells: FxHashMap<Cell, Vec<K>>,
    wide: Vec<K>,
    rects: FxHashMap<K, Rect>,
}

impl<K: Copy + Eq + Hash> SpatialHash<K> {
    /// `cell_size` should be close to a typical node dimension; values
    /// below one unit are raised to one.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cell_size: cell_size.max(MIN_CELL_SIZE),
            cells: FxHashMap::default(),
            wide: Vec::new(),
            rects: FxHashMap::default(),
        }
    }

    fn span(&self, rect: &Rect) -> CellSpan {
        let cell = |x: f64, y: f64| {
            (
                (x / self.cell_size).floor() as i64,
                (y / self.cell_size).floor() as i64,
            )
        };
        CellSpan {
            first: cell(rect.x, rect.y),
            last: cell(rect.right(), rect.bottom()),
        }
    }

    /// Register `rect` under `key`, replacing any previous rectangle.
    pub fn insert(&mut self, key: K, rect: Rect) {
        self.remove(key);
        let span = self.span(&rect);
        self.rects.insert(key, rect);
        if span.is_wide() {
            self.wide.push(key);
        } else {
            for cell in span.cells() {
                self.cells.entry(cell).or_default().push(key);
            }
        }
    }

    pub fn remove(&mut self, key: K) {
        let Some(rect) = self.rects.remove(&key) else {
            return;
        };
        let span = self.span(&rect);
        if span.is_wide() {
            self.wide.retain(|k| *k != key);
            return;
        }
        for cell in span.cells() {
            if let Some(keys) = self.cells.get_mut(&cell) {
                keys.retain(|k| *k != key);
                if keys.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
    }

    /// Keys whose rectangle overlaps `area` (edges touching do not count).
    pub fn query(&self, area: &Rect) -> Vec<K> {
        let hit = |key: &K| self.rects.get(key).is_some_and(|r| r.overlaps(area));
        let span = self.span(area);
        if span.is_wide() {
            return self.rects.keys().copied().filter(hit).collect();
        }

        let mut seen = FxHashSet::default();
        let mut found: Vec<K> = span
            .cells()
            .filter_map(|cell| self.cells.get(&cell))
            .flatten()
            .copied()
            .filter(|key| seen.insert(*key))
            .filter(hit)
            .collect();
        found.extend(self.wide.iter().copied().filter(hit));
        found
    }

    pub fn is_occupied(&self, area: &Rect) -> bool {
        !self.query(area).is_empty()
    }

    pub fn len(&self) -> usize {
        self.rects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rects.is_empty()
    }

    /// Number of grid cells holding at least one key.
    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialHash<u32> {
        SpatialHash::new(128.0)
    }

    #[test]
    fn test_query_finds_overlapping_only() {
        let mut index = grid();
        index.insert(1, Rect::new(0.0, 0.0, 50.0, 50.0));
        index.insert(2, Rect::new(200.0, 200.0, 50.0, 50.0));
        index.insert(3, Rect::new(400.0, 400.0, 50.0, 50.0));

        let mut found = index.query(&Rect::new(0.0, 0.0, 250.0, 250.0));
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn test_shared_edge_is_free() {
        let mut index = grid();
        index.insert(1, Rect::new(0.0, 0.0, 100.0, 100.0));
        assert!(!index.is_occupied(&Rect::new(100.0, 0.0, 100.0, 100.0)));
        assert!(index.is_occupied(&Rect::new(99.0, 0.0, 100.0, 100.0)));
    }

    #[test]
    fn test_remove_clears_cells() {
        let mut index = grid();
        index.insert(1, Rect::new(10.0, 10.0, 300.0, 50.0));
        assert_eq!(index.len(), 1);
        index.remove(1);
        index.remove(42);
        assert!(index.is_empty());
        assert_eq!(index.occupied_cells(), 0);
    }

    #[test]
    fn test_reinsert_moves_entry() {
        let mut index = grid();
        index.insert(1, Rect::new(0.0, 0.0, 50.0, 50.0));
        index.insert(1, Rect::new(500.0, 500.0, 50.0, 50.0));
        assert_eq!(index.len(), 1);
        assert!(!index.is_occupied(&Rect::new(10.0, 10.0, 5.0, 5.0)));
        assert!(index.is_occupied(&Rect::new(510.0, 510.0, 5.0, 5.0)));
    }

    #[test]
    fn test_negative_coordinates() {
        let mut index = SpatialHash::new(64.0);
        index.insert("a", Rect::new(-50.0, -50.0, 100.0, 100.0));
        assert_eq!(index.query(&Rect::new(-30.0, -30.0, 1.0, 1.0)), vec!["a"]);
        assert!(!index.is_occupied(&Rect::new(-70.0, -70.0, 10.0, 10.0)));
    }

    #[test]
    fn test_wide_rect_kept_out_of_grid() {
        let mut index = SpatialHash::new(10.0);
        index.insert(1u32, Rect::new(0.0, 0.0, 1_000_000.0, 1_000_000.0));
        assert_eq!(index.occupied_cells(), 0);
        assert_eq!(index.query(&Rect::new(500.0, 500.0, 5.0, 5.0)), vec![1]);
        index.remove(1);
        assert!(index.is_empty());
    }

    #[test]
    fn test_extreme_rect_is_wide() {
        let mut index = SpatialHash::new(128.0);
        index.insert(1u32, Rect::new(-1.0e22, 0.0, 2.0e22, 100.0));
        assert_eq!(index.occupied_cells(), 0);
        assert!(index.is_occupied(&Rect::new(0.0, 10.0, 200.0, 50.0)));
        assert!(!index.is_occupied(&Rect::new(0.0, 500.0, 200.0, 50.0)));
        assert!(index.is_occupied(&Rect::new(f64::MIN, 0.0, f64::MAX, 50.0)));
    }

    #[test]
    fn test_tiny_cell_size_is_clamped() {
        let mut index = SpatialHash::new(0.0);
        index.insert(1u32, Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(index.is_occupied(&Rect::new(5.0, 5.0, 1.0, 1.0)));
    }
}
