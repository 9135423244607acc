//! Auto-position for nodes created without explicit coordinates.
//!
//! Candidate slots are scanned row-major on a fixed grid anchored at
//! `origin`; the first slot whose rectangle (inflated by half the gap)
//! intersects no existing node wins.  When every scanned slot is taken the
//! node goes one gap below the lowest existing node, which cannot overlap
//! anything.  The scan depends only on its inputs, so two servers given the
//! same page pick the same slot.

use crate::geometry::{Point, Rect, Size, DEFAULT_NODE_SIZE};
use crate::spatial::SpatialHash;

#[derive(Clone, Copy, Debug)]
pub struct PlacementConfig {
    /// Top-left of the first slot.
    pub origin: Point,
    /// Gap between slots on both axes.
    pub gap: f64,
    /// Slots per row.
    pub columns: usize,
    /// Rows scanned before falling back below all nodes.
    pub max_rows: usize,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            origin: Point::new(100.0, 100.0),
            gap: 40.0,
            columns: 5,
            max_rows: 200,
        }
    }
}

/// Choose a position for a node of `size` that overlaps none of `existing`.
pub fn auto_position(existing: &[Rect], size: Size, config: &PlacementConfig) -> Point {
    if existing.is_empty() {
        return config.origin;
    }

    let mut index = SpatialHash::new(128.0);
    for (i, rect) in existing.iter().enumerate() {
        index.insert(i, *rect);
    }

    let step_x = size.width.max(DEFAULT_NODE_SIZE.width) + config.gap;
    let step_y = size.height.max(DEFAULT_NODE_SIZE.height) + config.gap;
    let columns = config.columns.max(1);
    let margin = config.gap / 2.0;

    for row in 0..config.max_rows {
        for col in 0..columns {
            let candidate = Point::new(
                config.origin.x + col as f64 * step_x,
                config.origin.y + row as f64 * step_y,
            );
            let footprint = Rect::at(candidate, size).inflate(margin);
            if !index.is_occupied(&footprint) {
                log::trace!("auto-position slot ({row}, {col}) -> {candidate:?}");
                return candidate;
            }
        }
    }

    let lowest = existing
        .iter()
        .map(Rect::bottom)
        .fold(f64::NEG_INFINITY, f64::max);
    Point::new(config.origin.x, lowest + config.gap)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps_any(p: Point, size: Size, existing: &[Rect]) -> bool {
        let r = Rect::at(p, size);
        existing.iter().any(|e| e.overlaps(&r))
    }

    #[test]
    fn test_empty_page_uses_origin() {
        let config = PlacementConfig::default();
        assert_eq!(
            auto_position(&[], DEFAULT_NODE_SIZE, &config),
            config.origin
        );
    }

    #[test]
    fn test_skips_occupied_first_slot() {
        let config = PlacementConfig::default();
        let existing = vec![Rect::at(config.origin, DEFAULT_NODE_SIZE)];
        let p = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
        assert!(!overlaps_any(p, DEFAULT_NODE_SIZE, &existing));
        assert_eq!(p.y, config.origin.y);
        assert!(p.x > config.origin.x);
    }

    #[test]
    fn test_deterministic() {
        let config = PlacementConfig::default();
        let existing = vec![
            Rect::new(90.0, 90.0, 300.0, 300.0),
            Rect::new(700.0, 120.0, 200.0, 100.0),
        ];
        let a = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
        let b = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_never_overlaps_across_many_layouts() {
        let config = PlacementConfig::default();
        // Deterministic pseudo-random scatter (LCG).
        let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 33) % 1500) as f64
        };
        for round in 0..50 {
            let mut existing = Vec::new();
            for _ in 0..(round % 25 + 1) {
                let w = 50.0 + next() / 5.0;
                let h = 40.0 + next() / 8.0;
                existing.push(Rect::new(next(), next(), w, h));
            }
            let p = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
            assert!(
                !overlaps_any(p, DEFAULT_NODE_SIZE, &existing),
                "round {round}: {p:?} overlaps"
            );
        }
    }

    #[test]
    fn test_sequential_placement_fills_grid() {
        let config = PlacementConfig::default();
        let mut existing: Vec<Rect> = Vec::new();
        for _ in 0..12 {
            let p = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
            assert!(!overlaps_any(p, DEFAULT_NODE_SIZE, &existing));
            existing.push(Rect::at(p, DEFAULT_NODE_SIZE));
        }
        // 5 columns per row: the 12th node lands on the third row.
        assert!(existing[11].y > existing[5].y);
    }

    #[test]
    fn test_falls_back_below_huge_node() {
        let config = PlacementConfig {
            max_rows: 3,
            ..PlacementConfig::default()
        };
        let existing = vec![Rect::new(-10_000.0, -10_000.0, 50_000.0, 20_000.0)];
        let p = auto_position(&existing, DEFAULT_NODE_SIZE, &config);
        assert!(!overlaps_any(p, DEFAULT_NODE_SIZE, &existing));
        assert_eq!(p.y, 10_000.0 + config.gap);
    }
}
