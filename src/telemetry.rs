//! Per-operator telemetry
//!
//! Two implementations selected at construction by
//! [`Options::enable_analysis`](crate::query::Options): a no-op that keeps
//! the hot path branch-free, and a tracked variant that accumulates series
//! and next timings, peak sample counts, and optional per-step sample
//! statistics.

use std::time::Duration;

use crate::histogram::FloatHistogram;
use crate::query::Options;
use crate::types::Timestamp;

/// Timing and sample accounting recorded by each operator
pub trait OperatorTelemetry: Send {
    /// Record time spent inside `series()`
    fn add_series_execution_time(&mut self, d: Duration);
    /// Record time spent inside `next()`
    fn add_next_execution_time(&mut self, d: Duration);
    /// Total time spent in `series()`
    fn series_execution_time(&self) -> Duration;
    /// Total time spent in `next()`
    fn next_execution_time(&self) -> Duration;
    /// Total execution time (series + next)
    fn execution_time(&self) -> Duration;
    /// Record the operator's output series count
    fn set_max_series_count(&mut self, count: i64);
    /// The recorded output series count
    fn max_series_count(&self) -> i64;
    /// Record `samples` loaded at evaluation timestamp `t`
    fn increment_samples_at_timestamp(&mut self, samples: usize, t: Timestamp);
    /// Collected sample statistics, if tracked
    fn samples(&self) -> Option<&QuerySamples>;
}

/// Construct the telemetry implementation selected by `opts`
pub fn new_telemetry(opts: &Options) -> Box<dyn OperatorTelemetry> {
    if opts.enable_analysis {
        Box::new(TrackedTelemetry::new(opts))
    } else {
        Box::new(NoopTelemetry)
    }
}

/// Step interval used for per-step sample bucketing
///
/// Milliseconds per step, or 1 for instant queries so a single bucket
/// covers the whole evaluation.
pub fn step_tracking_interval(step: Duration) -> i64 {
    let ms = step.as_millis() as i64;
    if ms == 0 {
        1
    } else {
        ms
    }
}

/// Sample-equivalent weight of a float histogram
///
/// Histograms are larger than plain samples; weigh them by their size
/// relative to a 16-byte sample (value plus timestamp).
pub fn histogram_sample_count(h: &FloatHistogram) -> usize {
    (h.size() + 8) / 16
}

/// Telemetry that records nothing
pub struct NoopTelemetry;

impl OperatorTelemetry for NoopTelemetry {
    fn add_series_execution_time(&mut self, _d: Duration) {}
    fn add_next_execution_time(&mut self, _d: Duration) {}
    fn series_execution_time(&self) -> Duration {
        Duration::ZERO
    }
    fn next_execution_time(&self) -> Duration {
        Duration::ZERO
    }
    fn execution_time(&self) -> Duration {
        Duration::ZERO
    }
    fn set_max_series_count(&mut self, _count: i64) {}
    fn max_series_count(&self) -> i64 {
        0
    }
    fn increment_samples_at_timestamp(&mut self, _samples: usize, _t: Timestamp) {}
    fn samples(&self) -> Option<&QuerySamples> {
        None
    }
}

/// Telemetry that accumulates timings and sample statistics
pub struct TrackedTelemetry {
    series_count: i64,
    execution_time: Duration,
    series_time: Duration,
    next_time: Duration,
    loaded_samples: QuerySamples,
}

impl TrackedTelemetry {
    /// Create tracked telemetry for the query described by `opts`
    pub fn new(opts: &Options) -> Self {
        let mut samples = QuerySamples::new(opts.enable_per_step_stats);
        samples.init_step_tracking(opts.start, opts.end, step_tracking_interval(opts.step));
        Self {
            series_count: 0,
            execution_time: Duration::ZERO,
            series_time: Duration::ZERO,
            next_time: Duration::ZERO,
            loaded_samples: samples,
        }
    }
}

impl OperatorTelemetry for TrackedTelemetry {
    fn add_series_execution_time(&mut self, d: Duration) {
        self.series_time += d;
        self.execution_time += d;
    }

    fn add_next_execution_time(&mut self, d: Duration) {
        self.next_time += d;
        self.execution_time += d;
    }

    fn series_execution_time(&self) -> Duration {
        self.series_time
    }

    fn next_execution_time(&self) -> Duration {
        self.next_time
    }

    fn execution_time(&self) -> Duration {
        self.execution_time
    }

    fn set_max_series_count(&mut self, count: i64) {
        self.series_count = count;
    }

    fn max_series_count(&self) -> i64 {
        self.series_count
    }

    fn increment_samples_at_timestamp(&mut self, samples: usize, t: Timestamp) {
        self.loaded_samples.update_peak(samples as i64);
        self.loaded_samples.increment_samples_at_timestamp(t, samples as i64);
    }

    fn samples(&self) -> Option<&QuerySamples> {
        Some(&self.loaded_samples)
    }
}

/// Sample counts loaded during one query, optionally bucketed per step
#[derive(Debug, Clone, Default)]
pub struct QuerySamples {
    /// Total samples loaded
    pub total_samples: i64,
    /// Largest sample count observed at a single step
    pub peak_samples: i64,
    per_step: Option<StepBuckets>,
}

#[derive(Debug, Clone)]
struct StepBuckets {
    start: Timestamp,
    interval: i64,
    counts: Vec<i64>,
}

impl QuerySamples {
    /// Create a sample accumulator; per-step buckets when `per_step` is set
    pub fn new(per_step: bool) -> Self {
        Self {
            total_samples: 0,
            peak_samples: 0,
            per_step: if per_step {
                Some(StepBuckets {
                    start: 0,
                    interval: 1,
                    counts: Vec::new(),
                })
            } else {
                None
            },
        }
    }

    /// Size the per-step buckets for the evaluation range
    pub fn init_step_tracking(&mut self, start: Timestamp, end: Timestamp, interval: i64) {
        if let Some(buckets) = &mut self.per_step {
            buckets.start = start;
            buckets.interval = interval.max(1);
            let steps = ((end - start) / buckets.interval) as usize + 1;
            buckets.counts = vec![0; steps];
        }
    }

    /// Add `samples` at timestamp `t`
    pub fn increment_samples_at_timestamp(&mut self, t: Timestamp, samples: i64) {
        self.total_samples += samples;
        if let Some(buckets) = &mut self.per_step {
            let idx = ((t - buckets.start) / buckets.interval) as usize;
            if let Some(slot) = buckets.counts.get_mut(idx) {
                *slot += samples;
            }
        }
    }

    /// Raise the peak if `samples` exceeds it
    pub fn update_peak(&mut self, samples: i64) {
        if samples > self.peak_samples {
            self.peak_samples = samples;
        }
    }

    /// Per-step sample counts, if tracking was enabled
    pub fn per_step_counts(&self) -> Option<&[i64]> {
        self.per_step.as_ref().map(|b| b.counts.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_records_nothing() {
        let mut t = NoopTelemetry;
        t.add_next_execution_time(Duration::from_secs(1));
        t.set_max_series_count(10);
        t.increment_samples_at_timestamp(5, 0);
        assert_eq!(t.execution_time(), Duration::ZERO);
        assert_eq!(t.max_series_count(), 0);
        assert!(t.samples().is_none());
    }

    #[test]
    fn test_tracked_accumulates_times() {
        let opts = Options::default().with_analysis();
        let mut t = TrackedTelemetry::new(&opts);
        t.add_series_execution_time(Duration::from_millis(10));
        t.add_next_execution_time(Duration::from_millis(5));
        assert_eq!(t.series_execution_time(), Duration::from_millis(10));
        assert_eq!(t.next_execution_time(), Duration::from_millis(5));
        assert_eq!(t.execution_time(), Duration::from_millis(15));
    }

    #[test]
    fn test_tracked_peak_and_total() {
        let opts = Options::default().with_analysis();
        let mut t = TrackedTelemetry::new(&opts);
        t.increment_samples_at_timestamp(3, 0);
        t.increment_samples_at_timestamp(7, 0);
        t.increment_samples_at_timestamp(2, 0);
        let s = t.samples().unwrap();
        assert_eq!(s.peak_samples, 7);
        assert_eq!(s.total_samples, 12);
    }

    #[test]
    fn test_per_step_buckets() {
        let opts = crate::query::Options::range(0, 2000, Duration::from_secs(1))
            .with_analysis()
            .with_per_step_stats();
        let mut t = TrackedTelemetry::new(&opts);
        t.increment_samples_at_timestamp(1, 0);
        t.increment_samples_at_timestamp(2, 1000);
        t.increment_samples_at_timestamp(4, 2000);
        let counts = t.samples().unwrap().per_step_counts().unwrap();
        assert_eq!(counts, &[1, 2, 4]);
    }

    #[test]
    fn test_step_tracking_interval() {
        assert_eq!(step_tracking_interval(Duration::ZERO), 1);
        assert_eq!(step_tracking_interval(Duration::from_secs(30)), 30_000);
    }

    #[test]
    fn test_histogram_sample_count_scales_with_size() {
        let small = FloatHistogram::exponential(0);
        let large =
            FloatHistogram::exponential(0).with_positive_buckets((0..64).map(|i| (i, 1.0)).collect());
        assert!(histogram_sample_count(&large) > histogram_sample_count(&small));
    }
}
