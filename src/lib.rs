//! Promvec - Vectorized pull-based execution engine for PromQL-style queries
//!
//! This library provides the execution core of a PromQL query engine:
//! - Pull-based operator pipeline over per-step sample vectors
//! - Hash-signature join machinery for vector binary operations
//!   (one-to-one, many-to-one, one-to-many, and the logical set operators)
//! - Reusable step-vector arenas for allocation-free hot loops
//! - Native histogram support with value-semantic arithmetic
//! - Runtime duplicate-label detection and per-query warnings
//!
//! A planner hands a tree of [`model::VectorOperator`]s to the
//! [`executor::Executor`]; evaluation advances by pulling batches of
//! step vectors from the root until end of stream.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod executor;
pub mod histogram;
pub mod labels;
pub mod model;
pub mod operators;
pub mod query;
pub mod telemetry;
pub mod testing;
pub mod types;
pub mod warnings;

// Re-export main types
pub use error::{EngineError, Result};
pub use executor::{Executor, QueryResult};
pub use histogram::FloatHistogram;
pub use labels::{Labels, Matcher};
pub use model::{StepVector, VectorOperator, VectorPool};
pub use query::{Options, QueryContext};
pub use types::{Sample, SampleId, Timestamp};

#[cfg(test)]
mod tests {
    #[test]
    fn test_basic_sanity() {
        assert_eq!(2 + 2, 4);
    }
}
