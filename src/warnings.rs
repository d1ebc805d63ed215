//! Per-query warning annotations
//!
//! Non-fatal conditions (mixed types in a binary operation, histogram
//! arithmetic on incompatible layouts) do not abort execution; they are
//! appended to a per-query [`Warnings`] sink and surfaced alongside the
//! query result.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::histogram::HistogramError;

/// A non-fatal annotation attached to a query result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    /// A binary operation was attempted between incompatible value kinds
    IncompatibleTypesInBinOp {
        /// Kind of the left operand ("float" or "histogram")
        left: &'static str,
        /// Operator name as written in the query
        op: &'static str,
        /// Kind of the right operand
        right: &'static str,
    },
    /// Histogram-histogram arithmetic failed on incompatible layouts
    HistogramArithmetic(String),
}

impl fmt::Display for Annotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Annotation::IncompatibleTypesInBinOp { left, op, right } => write!(
                f,
                "incompatible sample types encountered for binary operator \"{op}\": {left} {op} {right}"
            ),
            Annotation::HistogramArithmetic(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<HistogramError> for Annotation {
    fn from(err: HistogramError) -> Self {
        Annotation::HistogramArithmetic(err.to_string())
    }
}

/// Append-only, concurrency-safe warning collector scoped to one query
#[derive(Debug, Clone, Default)]
pub struct Warnings {
    inner: Arc<Mutex<Vec<Annotation>>>,
}

impl Warnings {
    /// Create an empty collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an annotation
    pub fn add(&self, annotation: Annotation) {
        self.inner.lock().push(annotation);
    }

    /// Snapshot the collected annotations
    pub fn collect(&self) -> Vec<Annotation> {
        self.inner.lock().clone()
    }

    /// True if no annotations were collected
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
