//! Core data types used throughout the execution engine
//!
//! # Key Types
//!
//! - **`Timestamp`**: Milliseconds since the Unix epoch
//! - **`SampleId`**: Dense index into an operator's output series table
//! - **`Sample`**: A single timestamped measurement
//!
//! Every operator owns a stable, zero-based numbering of its output series
//! for the lifetime of one query. Sample ids are only meaningful relative
//! to the series table of the operator that produced them.

use serde::{Deserialize, Serialize};

/// Evaluation timestamp in milliseconds since the Unix epoch
pub type Timestamp = i64;

/// Dense index into an operator's output series table
///
/// Ids are assigned per operator: id `i` refers to the `i`-th label set
/// returned by that operator's `series()`.
pub type SampleId = u64;

/// A single timestamped floating-point measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Timestamp in milliseconds since epoch
    pub timestamp: Timestamp,
    /// Sample value
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}
