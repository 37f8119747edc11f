//! Spatial snap-point index for interactive 2D drafting surfaces.
//!
//! A [`resolver::SnapResolver`] owns a capacity/depth-bounded
//! [`quadtree::QuadTree`] of snap points, an advisory [`cache::SnapCache`],
//! and the policy that picks one winner among candidate snap targets under
//! the cursor.

pub mod cache;
pub mod config;
pub mod edge_case;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod quadtree;
pub mod resolver;
pub mod spatial_index;
pub mod types;

#[cfg(feature = "wasm")]
pub mod web;

pub use cache::{CacheStatistics, SnapCache};
pub use config::{CacheConfig, Config, Modifiers, PartialConfig, QuadTreeConfig, ToleranceConfig};
pub use edge_case::{EdgeCaseHandler, HandlingResult};
pub use error::{CoreError, ErrorCategory, ErrorSink, Severity, SilentSink, TracingSink};
pub use geometry::{Aabb, Point};
pub use metrics::{Metrics, MetricsSnapshot, Outcome};
pub use quadtree::QuadTree;
pub use resolver::SnapResolver;
pub use spatial_index::{QueryFilters, SpatialIndex};
pub use types::{Feedback, OwnerRef, SnapKind, SnapKindTag, SnapPoint, SnapPointId, SnapResult};
