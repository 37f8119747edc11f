//! `SnapResolver`: the façade collaborators hold.
//!
//! Owns the spatial index, the advisory cache, configuration, metrics, a
//! bounded selection history, and an injected error sink. Every public
//! method degrades to an empty/neutral result on internal failure rather
//! than panicking or propagating a `Result` the caller must unwrap.

use std::collections::VecDeque;
use std::time::Instant;

use crate::cache::{CacheKey, SnapCache};
use crate::config::{Config, PartialConfig};
use crate::edge_case::EdgeCaseHandler;
use crate::error::{CoreError, ErrorSink, SilentSink};
use crate::geometry::{Aabb, Point};
use crate::metrics::{Metrics, MetricsSnapshot, Outcome};
use crate::spatial_index::{QueryFilters, SpatialIndex};
use crate::types::{Feedback, SnapKindTag, SnapPoint, SnapPointId, SnapResult};

/// Selection history depth, used as the third tie-break rule.
const HISTORY_CAPACITY: usize = 10;

/// Upper bound on candidates pulled from the spatial index before applying
/// exclusion/priority policy.
const MAX_CANDIDATES: usize = 50;

pub struct SnapResolver {
    index: SpatialIndex,
    cache: SnapCache,
    config: Config,
    edge_case: EdgeCaseHandler,
    metrics: Metrics,
    sink: Box<dyn ErrorSink>,
    last_result: SnapResult,
    history: VecDeque<SnapKindTag>,
}

impl SnapResolver {
    pub fn new(bounds: Aabb) -> Self {
        SnapResolver::with_config(bounds, Config::default())
    }

    pub fn with_config(bounds: Aabb, config: Config) -> Self {
        SnapResolver {
            index: SpatialIndex::new(bounds, config.quad_tree.capacity, config.quad_tree.max_depth, config.quad_tree.min_node_size()),
            cache: SnapCache::new(config.cache),
            edge_case: EdgeCaseHandler::new(config.tolerance),
            config,
            metrics: Metrics::new(),
            sink: Box::new(SilentSink),
            last_result: SnapResult::empty(),
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
        }
    }

    pub fn set_error_sink(&mut self, sink: Box<dyn ErrorSink>) {
        self.sink = sink;
    }

    pub fn config(&self) -> Config {
        self.config
    }

    /// Validates the partial update as a whole and, on success, rebuilds
    /// collaborators whose shape depends on config.
    pub fn set_config(&mut self, partial: PartialConfig) -> Result<(), CoreError> {
        let next = self.config.apply(partial)?;
        self.config = next;
        self.cache.set_config(next.cache);
        self.edge_case.set_tolerance(next.tolerance);
        Ok(())
    }

    pub fn statistics(&self) -> (crate::cache::CacheStatistics, MetricsSnapshot) {
        (self.cache.statistics(), self.metrics.snapshot())
    }

    pub fn last_result(&self) -> &SnapResult {
        &self.last_result
    }

    /// Adds or replaces a snap point by id: normalize through
    /// `EdgeCaseHandler`, insert into the spatial index, invalidate the
    /// cache near the touched position.
    pub fn add_snap_point(&mut self, point: SnapPoint, now_ms: u64) {
        let handled = self.edge_case.process_points(vec![point]);
        for warning in &handled.warnings {
            tracing::warn!(%warning, "edge case handling");
        }
        let Some(point) = handled.data.into_iter().next() else {
            self.metrics.record_mutation(now_ms, "add_snap_point", Outcome::Error);
            return;
        };
        let position = point.position;
        self.index.add(point, self.sink.as_ref());
        self.cache.invalidate_near_point((position.x, position.y), self.config.magnetic_threshold);
        self.metrics.record_mutation(now_ms, "add_snap_point", Outcome::Hit);
    }

    pub fn remove_snap_point(&mut self, id: &SnapPointId, now_ms: u64) {
        if let Some(removed) = self.index.remove(id) {
            self.cache
                .invalidate_near_point((removed.position.x, removed.position.y), self.config.magnetic_threshold);
            self.metrics.record_mutation(now_ms, "remove_snap_point", Outcome::Hit);
        } else {
            self.metrics.record_mutation(now_ms, "remove_snap_point", Outcome::Miss);
        }
    }

    pub fn clear(&mut self, now_ms: u64) {
        self.index.clear();
        self.cache.clear();
        self.last_result = SnapResult::empty();
        self.history.clear();
        self.metrics.record_mutation(now_ms, "clear", Outcome::Hit);
    }

    /// Atomic replace-all: clears the index, re-adds every point through
    /// the same normalization path, invalidates the whole cache once
    /// rather than per-point.
    pub fn bulk_replace(&mut self, points: Vec<SnapPoint>, now_ms: u64) {
        let handled = self.edge_case.process_points(points);
        for warning in &handled.warnings {
            tracing::warn!(%warning, "edge case handling");
        }
        self.index.clear();
        for point in handled.data {
            self.index.add(point, self.sink.as_ref());
        }
        self.cache.clear();
        self.metrics.record_mutation(now_ms, "bulk_replace", Outcome::Hit);
    }

    pub fn update_modifier_keys(&mut self, ctrl: bool, alt: bool, shift: bool) {
        self.config.modifiers.ctrl = ctrl;
        self.config.modifiers.alt = alt;
        self.config.modifiers.shift = shift;
    }

    pub fn set_priority_override(&mut self, kind: Option<SnapKindTag>) {
        self.config.priority_override = kind;
    }

    /// Points visible in a viewport rectangle, sorted by priority for
    /// layered rendering.
    pub fn query_viewport(&self, viewport: &Aabb, exclude_kinds: &[SnapKindTag]) -> Vec<SnapPoint> {
        let filters = QueryFilters {
            exclude_kinds: exclude_kinds.to_vec(),
            ..Default::default()
        };
        self.index.query_aabb(viewport, &filters)
    }

    /// Host-driven periodic sweep — this crate runs no embedded timer
    /// thread, so callers tick this on their own schedule.
    pub fn run_cache_sweep(&mut self) -> usize {
        self.cache.cleanup_expired()
    }

    /// Resolves the closest candidate under the current policy and returns
    /// the query outcome, caching it along the way.
    pub fn find_closest(&mut self, cursor: (f64, f64), exclude_kinds: &[SnapKindTag], now_ms: u64) -> SnapResult {
        let start = Instant::now();

        // Step 1: validate cursor.
        let (cx, cy) = match self.edge_case.normalize_query_point(cursor.0, cursor.1) {
            Ok(p) => p,
            Err(err) => {
                self.sink.on_error(&err);
                self.metrics.record_query(start.elapsed(), now_ms, "find_closest", Outcome::Error);
                return SnapResult::empty();
            }
        };
        let cursor_point = Point::new(cx, cy);

        // Step 2: enabled/ctrl gate.
        if !self.config.enabled || self.config.modifiers.ctrl {
            self.last_result = SnapResult::empty();
            self.metrics.record_query(start.elapsed(), now_ms, "find_closest", Outcome::Miss);
            return self.last_result.clone();
        }

        // Step 3: build cache key from quantized cursor + effective exclusion set
        // (union of caller exclusions and, when a priorityOverride is set, every
        // kind other than the override — narrowing candidates to a single kind).
        let mut effective_excludes = exclude_kinds.to_vec();
        if let Some(override_kind) = self.config.priority_override {
            for tag in [SnapKindTag::Endpoint, SnapKindTag::Centerline, SnapKindTag::Midpoint, SnapKindTag::Intersection] {
                if tag != override_kind {
                    effective_excludes.push(tag);
                }
            }
        }
        effective_excludes.sort_by_key(|k| *k as u8);
        effective_excludes.dedup();
        let search_radius = self.config.snap_threshold.max(self.config.magnetic_threshold);
        let key = CacheKey::new(cx, cy, search_radius, effective_excludes.clone(), self.config.priority_override);

        // Step 4: cache lookup.
        if let Some(cached) = self.cache.get(&key) {
            self.last_result = cached.clone();
            if let Some(hit) = &cached.hit {
                if cached.snapped {
                    self.push_history(hit.kind.tag());
                }
            }
            self.metrics.record_query(start.elapsed(), now_ms, "find_closest", Outcome::Hit);
            return cached;
        }

        // Step 5: spatial query within the combined threshold, bounded candidates.
        let filters = QueryFilters {
            exclude_kinds: effective_excludes.clone(),
            exclude_ids: Vec::new(),
            min_priority: None,
            limit: Some(MAX_CANDIDATES),
        };
        let candidates = self.index.query_radius(cursor_point, search_radius, &filters);

        // Step 6: pick min-distance / lowest-priority-number / most-recent-kind-in-history.
        let chosen = self.choose(&candidates, cursor_point);

        let result = match chosen {
            Some((point, dist)) => {
                let snapped = dist <= self.config.snap_threshold;
                let feedback = self.compute_feedback(&point, dist);
                SnapResult {
                    hit: Some(point),
                    distance: dist,
                    snapped,
                    feedback,
                }
            }
            None => SnapResult::empty(),
        };

        // Step 7: feedback already computed above. Step 8: insert into cache, update history.
        self.cache.put(key, (cx, cy), search_radius, result.clone());
        if let Some(hit) = &result.hit {
            if result.snapped {
                self.push_history(hit.kind.tag());
            }
        }

        self.last_result = result.clone();
        let outcome = if result.snapped { Outcome::Hit } else { Outcome::Miss };
        self.metrics.record_query(start.elapsed(), now_ms, "find_closest", outcome);
        result
    }

    fn push_history(&mut self, tag: SnapKindTag) {
        if self.history.len() == HISTORY_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(tag);
    }

    /// Tie-break ladder:
    /// 1. closest distance
    /// 2. lowest priority number, with `priorityOverride` forcing a kind to
    ///    the front regardless of its own number
    /// 3. most recently chosen kind in history
    fn choose(&self, candidates: &[SnapPoint], cursor: Point) -> Option<(SnapPoint, f64)> {
        if candidates.is_empty() {
            return None;
        }
        let override_kind = self.config.priority_override;
        candidates
            .iter()
            .map(|p| (p.clone(), crate::geometry::distance(&p.position, &cursor)))
            .min_by(|(pa, da), (pb, db)| {
                da.partial_cmp(db)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| self.priority_rank(pa, override_kind).cmp(&self.priority_rank(pb, override_kind)))
                    .then_with(|| self.history_rank(pa.kind.tag()).cmp(&self.history_rank(pb.kind.tag())))
            })
    }

    fn priority_rank(&self, p: &SnapPoint, override_kind: Option<SnapKindTag>) -> i32 {
        if override_kind == Some(p.kind.tag()) {
            i32::MIN
        } else {
            p.priority
        }
    }

    /// Index of `tag`'s most recent occurrence in history, or `usize::MAX`
    /// if absent (so "not in history" always loses the tie-break).
    fn history_rank(&self, tag: SnapKindTag) -> usize {
        self.history
            .iter()
            .rev()
            .position(|t| *t == tag)
            .unwrap_or(usize::MAX)
    }

    /// Visible whenever a candidate was found within `magneticThreshold`
    /// (guaranteed by the search radius passed to the spatial query), not
    /// only when `snapped`; opacity floors at 0.3 rather than fading to
    /// zero.
    fn compute_feedback(&self, point: &SnapPoint, dist: f64) -> Feedback {
        if !self.config.show_feedback {
            return Feedback::hidden();
        }
        let opacity: f64 = (1.0 - dist / self.config.magnetic_threshold.max(crate::geometry::EPSILON)).max(0.3);
        Feedback {
            show: true,
            kind: Some(point.kind.tag()),
            opacity,
            size: point.kind.base_feedback_size() * (0.8 + opacity * 0.4),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OwnerRef, SnapKind};

    fn resolver() -> SnapResolver {
        SnapResolver::new(Aabb::new(-500.0, -500.0, 1000.0, 1000.0))
    }

    fn endpoint(id: &str, x: f64, y: f64) -> SnapPoint {
        SnapPoint::new(id, SnapKind::Endpoint { is_start: true, is_end: false }, Point::new(x, y), OwnerRef::new("wall", "w1"))
    }

    #[test]
    fn no_points_means_no_snap() {
        let mut r = resolver();
        let result = r.find_closest((0.0, 0.0), &[], 0);
        assert!(!result.snapped);
        assert!(result.hit.is_none());
    }

    #[test]
    fn snaps_to_nearest_within_threshold() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 5.0, 0.0), 0);
        let result = r.find_closest((0.0, 0.0), &[], 1);
        assert!(result.snapped);
        assert_eq!(result.hit.unwrap().id.0, "a");
    }

    #[test]
    fn disabled_resolver_never_snaps() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        r.set_config(PartialConfig {
            enabled: Some(false),
            ..Default::default()
        })
        .unwrap();
        let result = r.find_closest((0.0, 0.0), &[], 1);
        assert!(!result.snapped);
    }

    #[test]
    fn ctrl_modifier_suppresses_snapping() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        r.update_modifier_keys(true, false, false);
        let result = r.find_closest((0.0, 0.0), &[], 1);
        assert!(!result.snapped);
    }

    #[test]
    fn exclude_kinds_filters_candidates() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        let result = r.find_closest((0.0, 0.0), &[SnapKindTag::Endpoint], 1);
        assert!(!result.snapped);
    }

    #[test]
    fn repeated_query_is_a_cache_hit() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        let first = r.find_closest((0.0, 0.0), &[], 1);
        let second = r.find_closest((0.0, 0.0), &[], 2);
        assert_eq!(first, second);
        assert_eq!(r.statistics().0.hits, 1);
    }

    #[test]
    fn removal_invalidates_cache_entry() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        let first = r.find_closest((0.0, 0.0), &[], 1);
        assert!(first.snapped);
        r.remove_snap_point(&"a".into(), 2);
        let second = r.find_closest((0.0, 0.0), &[], 3);
        assert!(!second.snapped);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        r.clear(1);
        r.clear(2);
        assert!(r.is_empty());
        assert!(!r.find_closest((0.0, 0.0), &[], 3).snapped);
    }

    #[test]
    fn priority_override_wins_tie_break() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 1.0, 0.0), 0);
        r.add_snap_point(SnapPoint::new("b", SnapKind::Midpoint, Point::new(1.0, 0.0), OwnerRef::new("wall", "w1")), 1);
        r.set_priority_override(Some(SnapKindTag::Midpoint));
        let result = r.find_closest((0.9, 0.0), &[], 2);
        assert_eq!(result.hit.unwrap().kind.tag(), SnapKindTag::Midpoint);
    }

    #[test]
    fn history_tie_break_favors_most_recently_used_kind() {
        let mut r = resolver();
        r.add_snap_point(SnapPoint::new("warm", SnapKind::Midpoint, Point::new(100.0, 100.0), OwnerRef::new("wall", "w1")), 0);
        let warm_up = r.find_closest((100.0, 100.0), &[], 1);
        assert!(warm_up.snapped);
        assert_eq!(warm_up.hit.unwrap().kind.tag(), SnapKindTag::Midpoint);

        r.add_snap_point(
            SnapPoint::new("e", SnapKind::Endpoint { is_start: true, is_end: false }, Point::new(-10.0, 0.0), OwnerRef::new("wall", "w1"))
                .with_priority(5),
            2,
        );
        r.add_snap_point(
            SnapPoint::new("m", SnapKind::Midpoint, Point::new(-10.0, 0.0), OwnerRef::new("wall", "w1")).with_priority(5),
            3,
        );
        let result = r.find_closest((-10.0, 0.0), &[], 4);
        assert_eq!(result.hit.unwrap().kind.tag(), SnapKindTag::Midpoint);
    }

    #[test]
    fn cache_hit_does_not_push_history_for_non_snapped_result() {
        let mut r = resolver();
        r.add_snap_point(endpoint("a", 20.0, 0.0), 0);

        let first = r.find_closest((0.0, 0.0), &[], 1);
        assert!(!first.snapped);
        assert!(r.history.is_empty());

        let second = r.find_closest((0.0, 0.0), &[], 2);
        assert!(!second.snapped);
        assert_eq!(r.statistics().0.hits, 1);
        assert!(r.history.is_empty());
    }
}
