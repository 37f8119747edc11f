//! Thin typed layer over `QuadTree`: duplicate-id handling, auto-bounds
//! expansion, and filtered/sorted typed queries.

use crate::error::{CoreError, ErrorSink};
use crate::geometry::{distance, Aabb, Point};
use crate::quadtree::QuadTree;
use crate::types::{SnapKindTag, SnapPoint, SnapPointId};

/// Margin a point's axis is expanded beyond when it falls outside current
/// bounds.
const DEFAULT_EXPANSION_MARGIN: f64 = 100.0;

#[derive(Debug, Default, Clone)]
pub struct QueryFilters {
    pub exclude_kinds: Vec<SnapKindTag>,
    pub exclude_ids: Vec<SnapPointId>,
    pub min_priority: Option<i32>,
    pub limit: Option<usize>,
}

impl QueryFilters {
    fn passes(&self, p: &SnapPoint) -> bool {
        if self.exclude_kinds.contains(&p.kind.tag()) {
            return false;
        }
        if self.exclude_ids.contains(&p.id) {
            return false;
        }
        if let Some(min) = self.min_priority {
            if p.priority < min {
                return false;
            }
        }
        true
    }
}

/// Wraps the QuadTree with typed snap-point storage, auto-expanding bounds,
/// and the filtered/sorted query surface collaborators see through
/// `SnapResolver`.
pub struct SpatialIndex {
    tree: QuadTree<SnapPointId>,
    points: std::collections::HashMap<SnapPointId, SnapPoint>,
    expansion_margin: f64,
    capacity: usize,
    max_depth: usize,
    min_node_size: f64,
}

impl SpatialIndex {
    pub fn new(bounds: Aabb, capacity: usize, max_depth: usize, min_node_size: f64) -> Self {
        SpatialIndex {
            tree: QuadTree::new(bounds, capacity, max_depth, min_node_size),
            points: std::collections::HashMap::new(),
            expansion_margin: DEFAULT_EXPANSION_MARGIN,
            capacity,
            max_depth,
            min_node_size,
        }
    }

    pub fn bounds(&self) -> Aabb {
        self.tree.bounds()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, id: &SnapPointId) -> Option<&SnapPoint> {
        self.points.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapPoint> {
        self.points.values()
    }

    /// `add` with an existing id is equivalent to `remove` then `add`.
    pub fn add(&mut self, point: SnapPoint, sink: &dyn ErrorSink) {
        if self.points.contains_key(&point.id) {
            self.remove(&point.id);
        }
        self.ensure_bounds_contain(point.position, sink);
        let inserted = self.tree.insert(point.id.clone(), point.position);
        if !inserted {
            sink.on_error(&CoreError::invariant(
                "SpatialIndex",
                "add",
                "point still outside bounds after expansion",
            ));
            return;
        }
        self.points.insert(point.id.clone(), point);
    }

    pub fn remove(&mut self, id: &SnapPointId) -> Option<SnapPoint> {
        self.tree.remove(id);
        self.points.remove(id)
    }

    pub fn clear(&mut self) {
        let bounds = self.tree.bounds();
        self.tree = QuadTree::new(bounds, self.capacity, self.max_depth, self.min_node_size);
        self.points.clear();
    }

    fn ensure_bounds_contain(&mut self, position: Point, sink: &dyn ErrorSink) {
        let bounds = self.tree.bounds();
        let mut new_bounds = bounds;
        let mut expand = false;
        if position.x < bounds.min_x() {
            new_bounds.x = position.x - self.expansion_margin;
            expand = true;
        }
        if position.x >= bounds.max_x() {
            expand = true;
        }
        if position.y < bounds.min_y() {
            new_bounds.y = position.y - self.expansion_margin;
            expand = true;
        }
        if position.y >= bounds.max_y() {
            expand = true;
        }
        if !expand {
            return;
        }
        // Recompute width/height so the new bounds still contain the point
        // with margin on the offending side, and rebuild once.
        let min_x = new_bounds.x.min(position.x - self.expansion_margin);
        let min_y = new_bounds.y.min(position.y - self.expansion_margin);
        let max_x = (bounds.max_x()).max(position.x + self.expansion_margin);
        let max_y = (bounds.max_y()).max(position.y + self.expansion_margin);
        let expanded = Aabb::new(min_x, min_y, max_x - min_x, max_y - min_y);
        tracing::debug!(?expanded, "spatial index auto-expanding bounds");
        let dropped = self.tree.update_bounds(expanded);
        if dropped > 0 {
            sink.on_error(&CoreError::capacity(
                "SpatialIndex",
                "ensure_bounds_contain",
                format!("bounds expansion dropped {dropped} points (should not happen on growth)"),
            ));
        }
    }

    /// Returns points sorted by `(distance asc, priority asc)` and truncated
    /// to `filters.limit`.
    pub fn query_radius(&self, center: Point, r: f64, filters: &QueryFilters) -> Vec<SnapPoint> {
        if !center.x.is_finite() || !center.y.is_finite() || r < 0.0 {
            return Vec::new();
        }
        let candidates = self.tree.radius_query(&center, r);
        let mut out: Vec<(f64, SnapPoint)> = candidates
            .into_iter()
            .filter_map(|(id, pos)| self.points.get(&id).cloned().map(|p| (distance(&pos, &center), p)))
            .filter(|(_, p)| filters.passes(p))
            .collect();
        out.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.priority.cmp(&b.1.priority))
        });
        if let Some(limit) = filters.limit {
            out.truncate(limit);
        }
        out.into_iter().map(|(_, p)| p).collect()
    }

    /// Returns points sorted by priority desc, for rendering layers.
    pub fn query_aabb(&self, aabb: &Aabb, filters: &QueryFilters) -> Vec<SnapPoint> {
        let candidates = self.tree.range_query(aabb);
        let mut out: Vec<SnapPoint> = candidates
            .into_iter()
            .filter_map(|(id, _)| self.points.get(&id).cloned())
            .filter(|p| filters.passes(p))
            .collect();
        out.sort_by(|a, b| b.priority.cmp(&a.priority));
        if let Some(limit) = filters.limit {
            out.truncate(limit);
        }
        out
    }

    pub fn find_nearest(&self, p: Point, max_dist: f64) -> Option<(SnapPoint, f64)> {
        let (id, _, dist) = self.tree.find_nearest(&p, max_dist)?;
        self.points.get(&id).cloned().map(|sp| (sp, dist))
    }

    /// Linear scan over the owned point map: the canonical reference used
    /// to validate the spatial index's correctness, and the degrade path
    /// when the tree is suspected inconsistent.
    pub fn linear_scan_nearest(&self, p: Point, max_dist: f64, filters: &QueryFilters) -> Option<(SnapPoint, f64)> {
        self.points
            .values()
            .filter(|sp| filters.passes(sp))
            .map(|sp| (sp.clone(), distance(&sp.position, &p)))
            .filter(|(_, d)| *d <= max_dist)
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.0.priority.cmp(&b.0.priority)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SilentSink;
    use crate::types::{OwnerRef, SnapKind};

    fn idx() -> SpatialIndex {
        SpatialIndex::new(Aabb::new(-500.0, -500.0, 1000.0, 1000.0), 10, 8, 1.0)
    }

    fn pt(id: &str, x: f64, y: f64) -> SnapPoint {
        SnapPoint::new(
            id,
            SnapKind::Endpoint { is_start: true, is_end: false },
            Point::new(x, y),
            OwnerRef::new("wall", "w1"),
        )
    }

    #[test]
    fn duplicate_add_replaces() {
        let mut idx = idx();
        let sink = SilentSink;
        idx.add(pt("a", 1.0, 1.0), &sink);
        idx.add(pt("a", 2.0, 2.0), &sink);
        assert_eq!(idx.len(), 1);
        assert_eq!(idx.get(&"a".into()).unwrap().position, Point::new(2.0, 2.0));
    }

    #[test]
    fn auto_expands_bounds_for_outlier() {
        let mut idx = idx();
        let sink = SilentSink;
        idx.add(pt("a", 10_000.0, 10_000.0), &sink);
        assert!(idx.bounds().max_x() > 10_000.0);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn query_radius_sorted_by_distance_then_priority() {
        let mut idx = idx();
        let sink = SilentSink;
        idx.add(pt("far", 10.0, 0.0), &sink);
        idx.add(pt("near", 1.0, 0.0), &sink);
        let res = idx.query_radius(Point::new(0.0, 0.0), 20.0, &QueryFilters::default());
        assert_eq!(res[0].id.0, "near");
        assert_eq!(res[1].id.0, "far");
    }

    #[test]
    fn linear_scan_matches_tree_query() {
        let mut idx = idx();
        let sink = SilentSink;
        for i in 0..20 {
            idx.add(pt(&format!("p{i}"), i as f64, (i * 2) as f64), &sink);
        }
        let tree_hit = idx.find_nearest(Point::new(5.0, 5.0), 1000.0);
        let scan_hit = idx.linear_scan_nearest(Point::new(5.0, 5.0), 1000.0, &QueryFilters::default());
        assert_eq!(tree_hit.map(|(p, _)| p.id), scan_hit.map(|(p, _)| p.id));
    }
}
