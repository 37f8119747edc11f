//! Error taxonomy for the snap core.
//!
//! Replaces the class-hierarchy-of-exceptions pattern with a single flat
//! struct plus an enum for category (no inheritance, no `dyn Error` trait
//! objects inside the core). Nothing in this crate panics or propagates an
//! error across the public `SnapResolver` API; every failure is captured as
//! a `CoreError`, posted to the configured `ErrorSink`, and the calling
//! operation degrades to an empty/neutral result.

use thiserror::Error;

/// Coarse category of a core failure, used by collaborators to decide how to
/// react (e.g. only surfacing `Validation` to the end user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Non-finite coordinates, out-of-range values, invalid ids, malformed config.
    Validation,
    /// Zero-length or self-intersecting structure detected.
    GeometryDegenerate,
    /// Cache or index under memory pressure.
    CapacityExceeded,
    /// An internal structure invariant was violated (e.g. tree/map mismatch).
    InternalInvariantViolation,
}

/// Severity ladder, from auto-recovered to feature-disabling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Auto-recovered; only worth a debug log.
    Low,
    /// Recovered with a warning.
    Medium,
    /// Recovered via a fallback path.
    High,
    /// Feature disabled for the remainder of the session.
    Critical,
}

/// A single flat error value posted to the error sink. Never escapes the
/// public API as a `panic!` or an `Err` the caller must unwrap.
#[derive(Debug, Clone, Error)]
#[error("[{component}/{operation}] {category:?} ({severity:?}): {message}")]
pub struct CoreError {
    pub category: ErrorCategory,
    pub severity: Severity,
    pub component: &'static str,
    pub operation: &'static str,
    pub message: String,
}

impl CoreError {
    pub fn new(
        category: ErrorCategory,
        severity: Severity,
        component: &'static str,
        operation: &'static str,
        message: impl Into<String>,
    ) -> Self {
        CoreError {
            category,
            severity,
            component,
            operation,
            message: message.into(),
        }
    }

    pub fn validation(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Validation, Severity::Low, component, operation, message)
    }

    pub fn capacity(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::CapacityExceeded, Severity::Medium, component, operation, message)
    }

    pub fn invariant(component: &'static str, operation: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCategory::InternalInvariantViolation,
            Severity::High,
            component,
            operation,
            message,
        )
    }
}

/// Injected error sink. One method, no observer list.
pub trait ErrorSink: Send {
    fn on_error(&self, error: &CoreError);
}

/// Default sink: silent. Errors still reach `tracing` at debug level so they
/// aren't truly invisible, just not surfaced to the host by default.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSink;

impl ErrorSink for SilentSink {
    fn on_error(&self, error: &CoreError) {
        match error.severity {
            Severity::Low => tracing::debug!(%error, "suppressed by silent sink"),
            Severity::Medium => tracing::debug!(%error, "suppressed by silent sink"),
            Severity::High | Severity::Critical => tracing::debug!(%error, "suppressed by silent sink"),
        }
    }
}

/// Sink that forwards every error to `tracing` at a level matching severity.
/// Convenient default for collaborators that just want log visibility.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn on_error(&self, error: &CoreError) {
        match error.severity {
            Severity::Low => tracing::debug!(%error),
            Severity::Medium => tracing::warn!(%error),
            Severity::High => tracing::error!(%error),
            Severity::Critical => tracing::error!(%error, "feature disabled for remainder of session"),
        }
    }
}
