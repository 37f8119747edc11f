//! Cross-checks the tree-backed `SpatialIndex` against its linear-scan
//! reference path, which stays the canonical answer for correctness tests.

use snap_core::{Aabb, OwnerRef, QueryFilters, SnapKind, SnapPoint, SpatialIndex};

fn pt(id: &str, x: f64, y: f64) -> SnapPoint {
    SnapPoint::new(id, SnapKind::Endpoint { is_start: true, is_end: false }, snap_core::Point::new(x, y), OwnerRef::new("wall", "w1"))
}

#[test]
fn tree_query_matches_linear_scan_across_many_points() {
    use snap_core::SilentSink;
    let mut idx = SpatialIndex::new(Aabb::new(-1000.0, -1000.0, 2000.0, 2000.0), 8, 8, 1.0);
    let sink = SilentSink;
    for i in 0..200 {
        let x = ((i * 37) % 900) as f64 - 450.0;
        let y = ((i * 53) % 900) as f64 - 450.0;
        idx.add(pt(&format!("p{i}"), x, y), &sink);
    }

    let probes = [(0.0, 0.0), (-300.0, 200.0), (450.0, -450.0), (100.5, -99.25)];
    for probe in probes {
        let p = snap_core::Point::new(probe.0, probe.1);
        let tree_hit = idx.find_nearest(p, 2000.0);
        let scan_hit = idx.linear_scan_nearest(p, 2000.0, &QueryFilters::default());
        assert_eq!(tree_hit.map(|(pt, _)| pt.id), scan_hit.map(|(pt, _)| pt.id), "mismatch at probe {probe:?}");
    }
}

#[test]
fn every_added_point_is_retrievable_by_id() {
    use snap_core::SilentSink;
    let mut idx = SpatialIndex::new(Aabb::new(-100.0, -100.0, 200.0, 200.0), 4, 6, 1.0);
    let sink = SilentSink;
    for i in 0..50 {
        idx.add(pt(&format!("p{i}"), i as f64 - 25.0, (i * 2) as f64 % 100.0 - 50.0), &sink);
    }
    assert_eq!(idx.len(), 50);
    for i in 0..50 {
        assert!(idx.get(&format!("p{i}").into()).is_some());
    }
}
