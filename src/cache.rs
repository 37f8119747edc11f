//! Snap-result cache: LRU + TTL + spatial-region invalidation.
//!
//! The reverse spatial index (`region_to_keys`) is a native
//! `HashMap<GridCell, HashSet<CacheKey>>`: grid coordinates are integers,
//! and the cache key is a hashable struct, not a formatted string.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::config::CacheConfig;
use crate::geometry::Aabb;
use crate::types::{SnapKindTag, SnapResult};

/// 100-unit grid cell used to cluster cache entries for localized
/// invalidation.
const GRID_CELL_SIZE: f64 = 100.0;

type GridCell = (i64, i64);

#[inline]
fn cell_of(x: f64, y: f64) -> GridCell {
    ((x / GRID_CELL_SIZE).floor() as i64, (y / GRID_CELL_SIZE).floor() as i64)
}

/// Most invalidation/put radii touch a handful of grid cells; 16 covers the
/// common case inline without spilling to the heap.
fn cells_touched(aabb: &Aabb) -> SmallVec<[GridCell; 16]> {
    let (min_cx, min_cy) = cell_of(aabb.min_x(), aabb.min_y());
    let (max_cx, max_cy) = cell_of(aabb.max_x(), aabb.max_y());
    let mut cells = SmallVec::new();
    for cx in min_cx..=max_cx {
        for cy in min_cy..=max_cy {
            cells.push((cx, cy));
        }
    }
    cells
}

/// `(quantize(x, 2dp), quantize(y, 2dp), r-at-2dp, sorted(excludeKinds),
/// priorityOverride)`. Quantization is what makes the cache effective along
/// a drag path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    qx: i64,
    qy: i64,
    qr: i64,
    exclude_kinds: Vec<SnapKindTag>,
    priority_override: Option<SnapKindTag>,
}

impl CacheKey {
    pub fn new(x: f64, y: f64, r: f64, mut exclude_kinds: Vec<SnapKindTag>, priority_override: Option<SnapKindTag>) -> Self {
        exclude_kinds.sort_by_key(|k| *k as u8);
        exclude_kinds.dedup();
        CacheKey {
            qx: (x * 100.0).round() as i64,
            qy: (y * 100.0).round() as i64,
            qr: (r * 100.0).round() as i64,
            exclude_kinds,
            priority_override,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    result: SnapResult,
    created_at: Instant,
    last_accessed_at: Instant,
    access_count: u64,
    size_bytes: usize,
    regions: HashSet<GridCell>,
}

/// Running statistics surfaced through `statistics()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatistics {
    pub total_requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub eviction_count: u64,
    pub memory_usage_bytes: usize,
    pub average_access_time_ns: f64,
    pub compression_savings_bytes: usize,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_requests as f64
        }
    }
}

const ACCESS_TIME_SAMPLES: usize = 128;

/// Keyed cache with LRU eviction, TTL expiration, and spatial-region
/// invalidation. Advisory: a miss must never produce incorrect behaviour,
/// and a hit must be indistinguishable from a fresh computation given the
/// inputs that formed the key.
pub struct SnapCache {
    entries: HashMap<CacheKey, CacheEntry>,
    region_to_keys: HashMap<GridCell, HashSet<CacheKey>>,
    config: CacheConfig,
    stats: CacheStatistics,
    access_time_samples: VecDeque<Duration>,
}

impl SnapCache {
    pub fn new(config: CacheConfig) -> Self {
        SnapCache {
            entries: HashMap::new(),
            region_to_keys: HashMap::new(),
            config,
            stats: CacheStatistics::default(),
            access_time_samples: VecDeque::with_capacity(ACCESS_TIME_SAMPLES),
        }
    }

    pub fn set_config(&mut self, config: CacheConfig) {
        self.config = config;
    }

    /// Returns a fresh-looking clone of the cached result, or `None` on a
    /// miss (including an expired entry, which is deleted on access).
    pub fn get(&mut self, key: &CacheKey) -> Option<SnapResult> {
        let start = Instant::now();
        self.stats.total_requests += 1;

        let expired = match self.entries.get(key) {
            Some(entry) => entry.created_at.elapsed() > Duration::from_millis(self.config.ttl_ms),
            None => {
                self.stats.misses += 1;
                return None;
            }
        };
        if expired {
            self.remove_entry(key);
            self.stats.misses += 1;
            return None;
        }
        let result = {
            let entry = self.entries.get_mut(key).expect("checked above");
            entry.last_accessed_at = Instant::now();
            entry.access_count += 1;
            entry.result.clone()
        };
        self.stats.hits += 1;
        self.record_access_time(start.elapsed());
        Some(result)
    }

    fn record_access_time(&mut self, d: Duration) {
        if self.access_time_samples.len() == ACCESS_TIME_SAMPLES {
            self.access_time_samples.pop_front();
        }
        self.access_time_samples.push_back(d);
        let total: Duration = self.access_time_samples.iter().sum();
        self.stats.average_access_time_ns = total.as_nanos() as f64 / self.access_time_samples.len() as f64;
    }

    /// Records the grid cells the result covers: both the query
    /// neighbourhood and, if present, the hit's position, into the reverse
    /// index so invalidation is O(|affected cells|).
    pub fn put(&mut self, key: CacheKey, query_center: (f64, f64), query_radius: f64, mut result: SnapResult) {
        let query_aabb = Aabb::new(
            query_center.0 - query_radius,
            query_center.1 - query_radius,
            query_radius * 2.0,
            query_radius * 2.0,
        );
        let mut regions: HashSet<GridCell> = cells_touched(&query_aabb).into_iter().collect();
        if let Some(hit) = &result.hit {
            regions.insert(cell_of(hit.position.x, hit.position.y));
        }

        let mut size_bytes = estimate_size(&result);
        if size_bytes > self.config.compression_threshold_bytes {
            let before = size_bytes;
            compress(&mut result);
            size_bytes = estimate_size(&result);
            self.stats.compression_savings_bytes += before.saturating_sub(size_bytes);
        }

        let now = Instant::now();
        self.remove_entry(&key);
        for region in &regions {
            self.region_to_keys.entry(*region).or_default().insert(key.clone());
        }
        self.entries.insert(
            key,
            CacheEntry {
                result,
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                size_bytes,
                regions,
            },
        );
        self.stats.memory_usage_bytes += size_bytes;
        self.evict_if_needed();
    }

    fn remove_entry(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.stats.memory_usage_bytes = self.stats.memory_usage_bytes.saturating_sub(entry.size_bytes);
            for region in &entry.regions {
                if let Some(keys) = self.region_to_keys.get_mut(region) {
                    keys.remove(key);
                    if keys.is_empty() {
                        self.region_to_keys.remove(region);
                    }
                }
            }
        }
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.config.max_entries {
            if let Some(victim) = self.entries.iter().min_by_key(|(_, e)| e.last_accessed_at).map(|(k, _)| k.clone()) {
                self.remove_entry(&victim);
                self.stats.eviction_count += 1;
            } else {
                break;
            }
        }
        let budget_bytes = self.config.max_memory_mb * 1024 * 1024;
        while self.stats.memory_usage_bytes > budget_bytes && !self.entries.is_empty() {
            // Least-useful-first: accessCount / sizeBytes ascending.
            let victim = self
                .entries
                .iter()
                .min_by(|(_, a), (_, b)| {
                    let ua = a.access_count as f64 / a.size_bytes.max(1) as f64;
                    let ub = b.access_count as f64 / b.size_bytes.max(1) as f64;
                    ua.partial_cmp(&ub).unwrap_or(std::cmp::Ordering::Equal)
                })
                .map(|(k, _)| k.clone());
            match victim {
                Some(k) => {
                    self.remove_entry(&k);
                    self.stats.eviction_count += 1;
                }
                None => break,
            }
        }
    }

    /// Computes the AABB `(p - r, 2r, 2r)`, derives the grid cells it
    /// touches, unions all cache keys tagged with any of those cells, and
    /// deletes them. Must run on every SnapPoint mutation.
    pub fn invalidate_near_point(&mut self, p: (f64, f64), r: f64) -> usize {
        let aabb = Aabb::new(p.0 - r, p.1 - r, r * 2.0, r * 2.0);
        let mut victims: HashSet<CacheKey> = HashSet::new();
        for cell in cells_touched(&aabb) {
            if let Some(keys) = self.region_to_keys.get(&cell) {
                victims.extend(keys.iter().cloned());
            }
        }
        let count = victims.len();
        for key in victims {
            self.remove_entry(&key);
        }
        tracing::trace!(count, "cache invalidated near point");
        count
    }

    /// Scans entries and deletes those whose cached hit's kind is in
    /// `kinds`. Deliberately limited to hit kind, not owner kind.
    pub fn invalidate_by_kind(&mut self, kinds: &[SnapKindTag]) -> usize {
        let victims: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.result.hit.as_ref().map(|h| kinds.contains(&h.kind.tag())).unwrap_or(false))
            .map(|(k, _)| k.clone())
            .collect();
        let count = victims.len();
        for key in victims {
            self.remove_entry(&key);
        }
        count
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.region_to_keys.clear();
        self.stats.memory_usage_bytes = 0;
    }

    /// Periodic sweep driven by `cleanupInterval`; deletes entries older
    /// than `ttl` without waiting for an access to find them stale.
    pub fn cleanup_expired(&mut self) -> usize {
        let ttl = Duration::from_millis(self.config.ttl_ms);
        let victims: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.created_at.elapsed() > ttl)
            .map(|(k, _)| k.clone())
            .collect();
        let count = victims.len();
        for key in victims {
            self.remove_entry(&key);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.stats
    }
}

/// Coarse footprint estimate: fixed struct overhead plus an owner/id string
/// contribution when a hit is present.
fn estimate_size(result: &SnapResult) -> usize {
    let base = std::mem::size_of::<SnapResult>();
    match &result.hit {
        Some(hit) => base + hit.id.0.len() + hit.owner.kind.len() + hit.owner.id.len(),
        None => base,
    }
}

/// Round hit distance and position to 2 decimal places before storing, once
/// the entry crosses `compressionThreshold`.
fn compress(result: &mut SnapResult) {
    result.distance = crate::geometry::round_to(result.distance, 2);
    if let Some(hit) = &mut result.hit {
        hit.position.x = crate::geometry::round_to(hit.position.x, 2);
        hit.position.y = crate::geometry::round_to(hit.position.y, 2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(x: f64, y: f64) -> CacheKey {
        CacheKey::new(x, y, 20.0, vec![], None)
    }

    #[test]
    fn miss_then_hit() {
        let mut cache = SnapCache::new(CacheConfig::default());
        let k = key(1.0, 1.0);
        assert!(cache.get(&k).is_none());
        cache.put(k.clone(), (1.0, 1.0), 20.0, SnapResult::empty());
        assert!(cache.get(&k).is_some());
        assert_eq!(cache.statistics().hits, 1);
        assert_eq!(cache.statistics().misses, 1);
    }

    #[test]
    fn invalidate_near_point_clears_overlapping_entries() {
        let mut cache = SnapCache::new(CacheConfig::default());
        let k = key(50.0, 50.0);
        cache.put(k.clone(), (50.0, 50.0), 20.0, SnapResult::empty());
        assert!(cache.get(&k).is_some());
        cache.invalidate_near_point((51.0, 51.0), 5.0);
        assert!(cache.get(&k).is_none());
    }

    #[test]
    fn eviction_respects_max_entries() {
        let mut config = CacheConfig::default();
        config.max_entries = 3;
        let mut cache = SnapCache::new(config);
        for i in 0..5 {
            let k = key(i as f64 * 1000.0, 0.0);
            cache.put(k, (i as f64 * 1000.0, 0.0), 20.0, SnapResult::empty());
        }
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.statistics().eviction_count, 2);
    }

    #[test]
    fn clear_is_idempotent() {
        let mut cache = SnapCache::new(CacheConfig::default());
        cache.put(key(1.0, 1.0), (1.0, 1.0), 20.0, SnapResult::empty());
        cache.clear();
        cache.clear();
        assert!(cache.is_empty());
    }
}
