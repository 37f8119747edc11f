//! Core data model, with a tagged `SnapKind` variant and an `OwnerRef`
//! back-reference in place of a duck-typed metadata bag.

use std::fmt;

use crate::geometry::Point;

/// Opaque, caller-assigned identifier for a snap point. The core never
/// interprets it beyond equality and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct SnapPointId(pub String);

impl SnapPointId {
    pub fn new(id: impl Into<String>) -> Self {
        SnapPointId(id.into())
    }
}

impl fmt::Display for SnapPointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SnapPointId {
    fn from(s: &str) -> Self {
        SnapPointId::new(s)
    }
}

impl From<String> for SnapPointId {
    fn from(s: String) -> Self {
        SnapPointId::new(s)
    }
}

/// Back-reference to the parent drafting element. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub id: String,
}

impl OwnerRef {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        OwnerRef {
            kind: kind.into(),
            id: id.into(),
        }
    }
}

/// Tagged snap-target kind, in place of a duck-typed `any`-bag of metadata.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SnapKind {
    Endpoint { is_start: bool, is_end: bool },
    Centerline { sample_index: u32 },
    Midpoint,
    Intersection { owners: (OwnerRef, OwnerRef) },
}

impl SnapKind {
    /// Default priority by kind: lower is more preferred.
    pub fn default_priority(&self) -> i32 {
        match self {
            SnapKind::Endpoint { .. } => 1,
            SnapKind::Centerline { .. } => 2,
            SnapKind::Midpoint => 3,
            SnapKind::Intersection { .. } => 4,
        }
    }

    /// Discriminant-only comparison, used for exclusion filters where the
    /// caller only cares about the kind tag and not its payload.
    pub fn tag(&self) -> SnapKindTag {
        match self {
            SnapKind::Endpoint { .. } => SnapKindTag::Endpoint,
            SnapKind::Centerline { .. } => SnapKindTag::Centerline,
            SnapKind::Midpoint => SnapKindTag::Midpoint,
            SnapKind::Intersection { .. } => SnapKindTag::Intersection,
        }
    }

    /// Base feedback marker size by kind.
    pub fn base_feedback_size(&self) -> f64 {
        match self {
            SnapKind::Endpoint { .. } => 12.0,
            SnapKind::Centerline { .. } => 10.0,
            SnapKind::Midpoint => 8.0,
            SnapKind::Intersection { .. } => 6.0,
        }
    }
}

/// Discriminant-only tag for `SnapKind`, used as a hashable/orderable key in
/// exclusion sets and priority overrides without carrying payload data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SnapKindTag {
    Endpoint,
    Centerline,
    Midpoint,
    Intersection,
}

/// A targetable position.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapPoint {
    pub id: SnapPointId,
    pub kind: SnapKind,
    #[serde(with = "point_serde")]
    pub position: Point,
    pub priority: i32,
    pub owner: OwnerRef,
}

impl SnapPoint {
    /// Construct with the kind's default priority.
    pub fn new(id: impl Into<SnapPointId>, kind: SnapKind, position: Point, owner: OwnerRef) -> Self {
        let priority = kind.default_priority();
        SnapPoint {
            id: id.into(),
            kind,
            position,
            priority,
            owner,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

mod point_serde {
    use super::Point;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(p: &Point, s: S) -> Result<S::Ok, S::Error> {
        (p.x, p.y).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Point, D::Error> {
        let (x, y) = <(f64, f64)>::deserialize(d)?;
        Ok(Point::new(x, y))
    }
}

/// Visual-feedback hint, derived at query time — never stored.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Feedback {
    pub show: bool,
    pub kind: Option<SnapKindTag>,
    pub opacity: f64,
    pub size: f64,
}

impl Feedback {
    pub fn hidden() -> Self {
        Feedback {
            show: false,
            kind: None,
            opacity: 0.0,
            size: 0.0,
        }
    }
}

/// Outcome of a query.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SnapResult {
    pub hit: Option<SnapPoint>,
    pub distance: f64,
    pub snapped: bool,
    pub feedback: Feedback,
}

impl SnapResult {
    /// The canonical "free cursor" result: no hit, no feedback.
    pub fn empty() -> Self {
        SnapResult {
            hit: None,
            distance: f64::INFINITY,
            snapped: false,
            feedback: Feedback::hidden(),
        }
    }
}

impl Default for SnapResult {
    fn default() -> Self {
        SnapResult::empty()
    }
}
