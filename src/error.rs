//! Error types for query execution
//!
//! Fatal errors abort the current `next()` call and surface to the caller;
//! non-fatal conditions become [`crate::warnings::Annotation`]s on the
//! per-query warnings sink and execution continues.

use thiserror::Error;

use crate::labels::Labels;

/// Which side of a binary operation an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOpSide {
    /// Left-hand side
    Left,
    /// Right-hand side
    Right,
}

impl std::fmt::Display for BinOpSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinOpSide::Left => write!(f, "left"),
            BinOpSide::Right => write!(f, "right"),
        }
    }
}

/// Main error type for the execution engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Query was cancelled through its context
    #[error("query cancelled")]
    Cancelled,

    /// Query ran past its deadline
    #[error("query deadline exceeded")]
    DeadlineExceeded,

    /// Two concurrently live series share a label set
    #[error("vector cannot contain metrics with the same labelset")]
    DuplicateLabelSet,

    /// Low-cardinality side of a join produced two rows with one signature
    #[error(
        "found duplicate series for the match group {group} on the {side} hand-side of the operation: [{duplicate}, {original}];many-to-many matching not allowed: matching labels must be unique on one side"
    )]
    ManyToManyMatch {
        /// Side of the operation the duplicates were found on
        side: BinOpSide,
        /// The match group the duplicates collide in
        group: Labels,
        /// The series that collided with an already-bucketed one
        duplicate: Labels,
        /// The series that was bucketed first
        original: Labels,
    },

    /// One-to-one matching found multiple high-card rows for one group
    #[error("multiple matches for labels: many-to-one matching must be explicit (group_left/group_right)")]
    ImplicitManyToOne,

    /// Matching cardinality outside the supported set
    #[error("unexpected matching cardinality: {0}")]
    InvalidMatchingCardinality(String),

    /// The planner referenced a function this engine does not implement
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
