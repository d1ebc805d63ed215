//! Query options and the per-query execution context
//!
//! [`Options`] carries the evaluation range and engine switches the planner
//! hands to operator constructors. [`QueryContext`] carries cancellation,
//! the deadline, and the warnings sink through the operator tree; every
//! `series()`/`next()` checks it at entry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{EngineError, Result};
use crate::types::Timestamp;
use crate::warnings::Warnings;

/// Default number of evaluation steps returned per `next()` batch
pub const DEFAULT_STEPS_BATCH: usize = 10;

/// Evaluation options for one query
#[derive(Debug, Clone)]
pub struct Options {
    /// First evaluation timestamp (ms since epoch)
    pub start: Timestamp,
    /// Last evaluation timestamp, inclusive (ms since epoch)
    pub end: Timestamp,
    /// Interval between evaluation steps; zero for an instant query
    pub step: Duration,
    /// Maximum number of steps per batch
    pub steps_batch: usize,
    /// Enable per-operator telemetry collection
    pub enable_analysis: bool,
    /// Track per-step sample counts in telemetry
    pub enable_per_step_stats: bool,
    /// How far back a selector may look for the latest sample
    pub lookback_delta: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            start: 0,
            end: 0,
            step: Duration::ZERO,
            steps_batch: DEFAULT_STEPS_BATCH,
            enable_analysis: false,
            enable_per_step_stats: false,
            lookback_delta: Duration::from_secs(5 * 60),
        }
    }
}

impl Options {
    /// Options for an instant query at `ts`
    pub fn instant(ts: Timestamp) -> Self {
        Self {
            start: ts,
            end: ts,
            ..Default::default()
        }
    }

    /// Options for a range query
    pub fn range(start: Timestamp, end: Timestamp, step: Duration) -> Self {
        Self {
            start,
            end,
            step,
            ..Default::default()
        }
    }

    /// Set the per-batch step count
    pub fn with_steps_batch(mut self, steps: usize) -> Self {
        self.steps_batch = steps.max(1);
        self
    }

    /// Enable telemetry collection
    pub fn with_analysis(mut self) -> Self {
        self.enable_analysis = true;
        self
    }

    /// Enable per-step sample statistics
    pub fn with_per_step_stats(mut self) -> Self {
        self.enable_per_step_stats = true;
        self
    }

    /// Set the lookback delta
    pub fn with_lookback_delta(mut self, delta: Duration) -> Self {
        self.lookback_delta = delta;
        self
    }

    /// Step interval in milliseconds; zero for instant queries
    pub fn step_millis(&self) -> i64 {
        self.step.as_millis() as i64
    }

    /// Number of evaluation steps in the range
    pub fn num_steps(&self) -> usize {
        let step = self.step_millis();
        if step == 0 {
            return 1;
        }
        ((self.end - self.start) / step) as usize + 1
    }
}

/// Per-query execution context: cancellation, deadline, warnings
///
/// Cloned handles share state, so the context can be held by the driver
/// while operators deep in the tree observe cancellation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    started: Instant,
    timeout: Option<Duration>,
    cancelled: Arc<AtomicBool>,
    warnings: Warnings,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryContext {
    /// New context without a deadline
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            timeout: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            warnings: Warnings::new(),
        }
    }

    /// New context that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::new()
        }
    }

    /// Request cancellation; the next entry check fails
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Entry check performed by every `series()`/`next()`
    pub fn check(&self) -> Result<()> {
        if self.cancelled.load(Ordering::Relaxed) {
            return Err(EngineError::Cancelled);
        }
        if let Some(timeout) = self.timeout {
            if self.started.elapsed() > timeout {
                return Err(EngineError::DeadlineExceeded);
            }
        }
        Ok(())
    }

    /// The per-query warnings sink
    pub fn warnings(&self) -> &Warnings {
        &self.warnings
    }
}
