//! Resolver configuration.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::SnapKindTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub alt: bool,
    pub shift: bool,
}

impl Default for Modifiers {
    fn default() -> Self {
        Modifiers {
            ctrl: false,
            alt: false,
            shift: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_memory_mb: usize,
    pub ttl_ms: u64,
    pub cleanup_interval_ms: u64,
    pub compression_threshold_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            max_entries: 2000,
            max_memory_mb: 50,
            ttl_ms: 10_000,
            cleanup_interval_ms: 30_000,
            compression_threshold_bytes: 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuadTreeConfig {
    pub capacity: usize,
    pub max_depth: usize,
    pub min_node_size: u64, // bit-pattern of an f64, kept integral for Eq
}

impl QuadTreeConfig {
    pub fn min_node_size(&self) -> f64 {
        f64::from_bits(self.min_node_size)
    }
}

impl Default for QuadTreeConfig {
    fn default() -> Self {
        QuadTreeConfig {
            capacity: 10,
            max_depth: 8,
            min_node_size: 1.0f64.to_bits(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    pub point_distance: f64,
    pub angle_threshold: f64,
    pub coordinate_limit: f64,
    pub precision_digits: u32,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        ToleranceConfig {
            point_distance: 0.1,
            angle_threshold: 0.01,
            coordinate_limit: 1e6,
            precision_digits: 6,
        }
    }
}

/// Full resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub enabled: bool,
    pub snap_threshold: f64,
    pub magnetic_threshold: f64,
    pub show_feedback: bool,
    pub priority_override: Option<SnapKindTag>,
    pub modifiers: Modifiers,
    pub cache: CacheConfig,
    pub quad_tree: QuadTreeConfig,
    pub tolerance: ToleranceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            enabled: true,
            snap_threshold: 15.0,
            magnetic_threshold: 25.0,
            show_feedback: true,
            priority_override: None,
            modifiers: Modifiers::default(),
            cache: CacheConfig::default(),
            quad_tree: QuadTreeConfig::default(),
            tolerance: ToleranceConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.magnetic_threshold < self.snap_threshold {
            return Err(CoreError::validation(
                "Config",
                "validate",
                "magneticThreshold must be >= snapThreshold",
            ));
        }
        if self.snap_threshold < 0.0 || self.magnetic_threshold < 0.0 {
            return Err(CoreError::validation("Config", "validate", "thresholds must be non-negative"));
        }
        Ok(())
    }
}

/// All-`Option` mirror of `Config`, the argument to `setConfig`. `None`
/// fields leave the current value untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialConfig {
    pub enabled: Option<bool>,
    pub snap_threshold: Option<f64>,
    pub magnetic_threshold: Option<f64>,
    pub show_feedback: Option<bool>,
    pub priority_override: Option<Option<SnapKindTag>>,
    pub modifiers: Option<Modifiers>,
    pub cache: Option<CacheConfig>,
    pub quad_tree: Option<QuadTreeConfig>,
    pub tolerance: Option<ToleranceConfig>,
}

impl Config {
    /// Apply a partial update, validating the result as a whole. On
    /// validation failure the config is left unchanged.
    pub fn apply(&self, partial: PartialConfig) -> Result<Config, CoreError> {
        let mut next = *self;
        if let Some(v) = partial.enabled {
            next.enabled = v;
        }
        if let Some(v) = partial.snap_threshold {
            next.snap_threshold = v;
        }
        if let Some(v) = partial.magnetic_threshold {
            next.magnetic_threshold = v;
        }
        if let Some(v) = partial.show_feedback {
            next.show_feedback = v;
        }
        if let Some(v) = partial.priority_override {
            next.priority_override = v;
        }
        if let Some(v) = partial.modifiers {
            next.modifiers = v;
        }
        if let Some(v) = partial.cache {
            next.cache = v;
        }
        if let Some(v) = partial.quad_tree {
            next.quad_tree = v;
        }
        if let Some(v) = partial.tolerance {
            next.tolerance = v;
        }
        next.validate()?;
        Ok(next)
    }
}
