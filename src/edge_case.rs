//! Input normalization at ingress and query boundaries.
//!
//! Detections run in a fixed order, each time-sliced against
//! `max_handling_time`; once the budget is spent, remaining categories are
//! skipped and the data is accepted as-is with a warning.

use std::time::{Duration, Instant};

use crate::config::ToleranceConfig;
use crate::error::{CoreError, ErrorCategory, Severity};
use crate::geometry::{distance, round_to, segment_intersect};
use crate::types::{SnapKind, SnapPoint};

/// Result of a handling pass: `{handled, corrected, fallbackUsed, warnings[],
/// errors[]}` plus the post-processed data.
#[derive(Debug, Clone)]
pub struct HandlingResult<T> {
    pub handled: bool,
    pub corrected: bool,
    pub fallback_used: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<CoreError>,
    pub data: T,
}

impl<T> HandlingResult<T> {
    fn new(data: T) -> Self {
        HandlingResult {
            handled: true,
            corrected: false,
            fallback_used: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            data,
        }
    }
}

pub struct EdgeCaseHandler {
    tolerance: ToleranceConfig,
    max_handling_time: Duration,
}

impl EdgeCaseHandler {
    pub fn new(tolerance: ToleranceConfig) -> Self {
        EdgeCaseHandler {
            tolerance,
            max_handling_time: Duration::from_millis(50),
        }
    }

    pub fn set_tolerance(&mut self, tolerance: ToleranceConfig) {
        self.tolerance = tolerance;
    }

    /// Validates and normalizes a single query-boundary point: rejects
    /// non-finite input, clamps extreme coordinates, rounds to the
    /// configured precision.
    pub fn normalize_query_point(&self, x: f64, y: f64) -> Result<(f64, f64), CoreError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(CoreError::new(
                ErrorCategory::Validation,
                Severity::Low,
                "EdgeCaseHandler",
                "normalize_query_point",
                "non-finite coordinate rejected",
            ));
        }
        let limit = self.tolerance.coordinate_limit;
        let cx = x.clamp(-limit, limit);
        let cy = y.clamp(-limit, limit);
        Ok((round_to(cx, self.tolerance.precision_digits), round_to(cy, self.tolerance.precision_digits)))
    }

    /// Ingress pass over a batch of incoming snap points: rejects
    /// non-finite points, clamps extreme coordinates, rounds precision
    /// drift, merges overlapping points, drops zero-length centerline
    /// samples, and flags (without correcting) self-intersecting
    /// polylines.
    pub fn process_points(&self, points: Vec<SnapPoint>) -> HandlingResult<Vec<SnapPoint>> {
        let deadline = Instant::now() + self.max_handling_time;
        let mut result = HandlingResult::new(Vec::with_capacity(points.len()));

        let mut working = Vec::with_capacity(points.len());
        for p in points {
            if !p.position.x.is_finite() || !p.position.y.is_finite() {
                result.errors.push(CoreError::new(
                    ErrorCategory::Validation,
                    Severity::Low,
                    "EdgeCaseHandler",
                    "process_points",
                    format!("rejected non-finite point {}", p.id),
                ));
                continue;
            }
            working.push(p);
        }

        if Instant::now() > deadline {
            result.fallback_used = true;
            result.warnings.push("handling budget exceeded before clamp/round pass; accepted as-is".into());
            result.data = working;
            return result;
        }
        self.clamp_and_round(&mut working, &mut result);

        if Instant::now() > deadline {
            result.fallback_used = true;
            result.warnings.push("handling budget exceeded before overlap merge; accepted as-is".into());
            result.data = working;
            return result;
        }
        self.merge_overlaps(&mut working, &mut result);

        if Instant::now() > deadline {
            result.fallback_used = true;
            result.warnings.push("handling budget exceeded before zero-length pass; accepted as-is".into());
            result.data = working;
            return result;
        }
        self.drop_zero_length_samples(&mut working, &mut result);

        if Instant::now() <= deadline {
            self.flag_self_intersections(&working, &mut result);
        } else {
            result.fallback_used = true;
            result.warnings.push("handling budget exceeded before self-intersection scan".into());
        }

        result.data = working;
        result
    }

    fn clamp_and_round(&self, points: &mut [SnapPoint], result: &mut HandlingResult<Vec<SnapPoint>>) {
        let limit = self.tolerance.coordinate_limit;
        let digits = self.tolerance.precision_digits;
        for p in points.iter_mut() {
            let clamped_x = p.position.x.clamp(-limit, limit);
            let clamped_y = p.position.y.clamp(-limit, limit);
            if clamped_x != p.position.x || clamped_y != p.position.y {
                result.corrected = true;
                result.warnings.push(format!("clamped extreme coordinates for point {}", p.id));
            }
            p.position.x = clamped_x;
            p.position.y = clamped_y;

            let rounded_x = round_to(p.position.x, digits);
            let rounded_y = round_to(p.position.y, digits);
            if (rounded_x - p.position.x).abs() > f64::EPSILON || (rounded_y - p.position.y).abs() > f64::EPSILON {
                result.corrected = true;
            }
            p.position.x = rounded_x;
            p.position.y = rounded_y;
        }
    }

    /// Overlapping points (pairwise distance < `pointDistance`): keep the
    /// lower-priority number (higher precedence), drop the other.
    fn merge_overlaps(&self, points: &mut Vec<SnapPoint>, result: &mut HandlingResult<Vec<SnapPoint>>) {
        let threshold = self.tolerance.point_distance;
        let mut dropped = 0usize;
        let mut i = 0;
        while i < points.len() {
            let mut j = i + 1;
            while j < points.len() {
                if distance(&points[i].position, &points[j].position) < threshold {
                    // Keep the lower numeric priority (more preferred).
                    if points[j].priority < points[i].priority {
                        points.swap(i, j);
                    }
                    points.remove(j);
                    dropped += 1;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
        if dropped > 0 {
            result.corrected = true;
            result.warnings.push(format!("merged {dropped} overlapping point(s)"));
        }
    }

    /// Adjacent centerline samples within `pointDistance`: drop the later
    /// sample.
    fn drop_zero_length_samples(&self, points: &mut Vec<SnapPoint>, result: &mut HandlingResult<Vec<SnapPoint>>) {
        let threshold = self.tolerance.point_distance;
        let mut by_owner: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
        for (idx, p) in points.iter().enumerate() {
            if let SnapKind::Centerline { .. } = p.kind {
                by_owner.entry(p.owner.id.clone()).or_default().push(idx);
            }
        }
        let mut to_remove: Vec<usize> = Vec::new();
        for indices in by_owner.values() {
            let mut sorted = indices.clone();
            sorted.sort_by_key(|&i| match points[i].kind {
                SnapKind::Centerline { sample_index } => sample_index,
                _ => 0,
            });
            for pair in sorted.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if distance(&points[a].position, &points[b].position) < threshold {
                    to_remove.push(b);
                }
            }
        }
        if !to_remove.is_empty() {
            to_remove.sort_unstable();
            to_remove.dedup();
            for &idx in to_remove.iter().rev() {
                points.remove(idx);
            }
            result.corrected = true;
            result.warnings.push(format!("dropped {} zero-length centerline sample(s)", to_remove.len()));
        }
    }

    /// Self-intersecting polylines are **not** auto-corrected; flagged for
    /// user intervention only.
    fn flag_self_intersections(&self, points: &[SnapPoint], result: &mut HandlingResult<Vec<SnapPoint>>) {
        let mut by_owner: std::collections::HashMap<String, Vec<usize>> = std::collections::HashMap::new();
        for (idx, p) in points.iter().enumerate() {
            if let SnapKind::Centerline { .. } = p.kind {
                by_owner.entry(p.owner.id.clone()).or_default().push(idx);
            }
        }
        for indices in by_owner.values() {
            let mut sorted = indices.clone();
            sorted.sort_by_key(|&i| match points[i].kind {
                SnapKind::Centerline { sample_index } => sample_index,
                _ => 0,
            });
            if sorted.len() < 4 {
                continue;
            }
            for a in 0..sorted.len() - 1 {
                for b in (a + 2)..sorted.len() - 1 {
                    // Skip segments that share an endpoint (adjacent).
                    if b == a + 1 || (a == 0 && b == sorted.len() - 2) {
                        continue;
                    }
                    let (p1, p2) = (&points[sorted[a]].position, &points[sorted[a + 1]].position);
                    let (p3, p4) = (&points[sorted[b]].position, &points[sorted[b + 1]].position);
                    if segment_intersect(p1, p2, p3, p4).is_some() {
                        result.warnings.push(format!(
                            "self-intersecting polyline detected for owner {} between samples {a} and {b}",
                            points[sorted[a]].owner.id
                        ));
                        result.errors.push(CoreError::new(
                            ErrorCategory::GeometryDegenerate,
                            Severity::Medium,
                            "EdgeCaseHandler",
                            "flag_self_intersections",
                            "self-intersecting polyline requires user intervention",
                        ));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::types::OwnerRef;

    fn handler() -> EdgeCaseHandler {
        EdgeCaseHandler::new(ToleranceConfig::default())
    }

    #[test]
    fn rejects_non_finite_query_point() {
        let h = handler();
        assert!(h.normalize_query_point(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn clamps_extreme_coordinates() {
        let h = handler();
        let (x, _) = h.normalize_query_point(1e9, 0.0).unwrap();
        assert_eq!(x, 1e6);
    }

    #[test]
    fn merges_overlapping_points_keeping_higher_precedence() {
        let h = handler();
        let points = vec![
            SnapPoint::new("mid", SnapKind::Midpoint, Point::new(0.0, 0.0), OwnerRef::new("wall", "w1")),
            SnapPoint::new(
                "end",
                SnapKind::Endpoint { is_start: true, is_end: false },
                Point::new(0.01, 0.0),
                OwnerRef::new("wall", "w1"),
            ),
        ];
        let result = h.process_points(points);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.data[0].id.0, "end");
        assert!(result.corrected);
    }

    #[test]
    fn drops_zero_length_centerline_sample() {
        let h = handler();
        let points = vec![
            SnapPoint::new(
                "c0",
                SnapKind::Centerline { sample_index: 0 },
                Point::new(0.0, 0.0),
                OwnerRef::new("duct", "d1"),
            ),
            SnapPoint::new(
                "c1",
                SnapKind::Centerline { sample_index: 1 },
                Point::new(0.01, 0.0),
                OwnerRef::new("duct", "d1"),
            ),
            SnapPoint::new(
                "c2",
                SnapKind::Centerline { sample_index: 2 },
                Point::new(50.0, 0.0),
                OwnerRef::new("duct", "d1"),
            ),
        ];
        let result = h.process_points(points);
        assert_eq!(result.data.len(), 2);
    }

    #[test]
    fn rejects_non_finite_ingress_point() {
        let h = handler();
        let points = vec![SnapPoint::new(
            "bad",
            SnapKind::Midpoint,
            Point::new(f64::NAN, 0.0),
            OwnerRef::new("wall", "w1"),
        )];
        let result = h.process_points(points);
        assert!(result.data.is_empty());
        assert_eq!(result.errors.len(), 1);
    }
}
