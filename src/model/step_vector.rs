//! Step vectors: one evaluation step's worth of output
//!
//! A [`StepVector`] holds the samples and native histograms produced for a
//! single evaluation timestamp as parallel id/value arrays. Invariants:
//! ids index the producing operator's series table, and a given id appears
//! at most once per step.

use crate::histogram::FloatHistogram;
use crate::types::{SampleId, Timestamp};

/// Samples and histograms for a single evaluation timestamp
#[derive(Debug, Clone, Default)]
pub struct StepVector {
    /// Evaluation timestamp in milliseconds since epoch
    pub t: Timestamp,
    /// Series ids of the float samples, parallel to `samples`
    pub sample_ids: Vec<SampleId>,
    /// Float sample values
    pub samples: Vec<f64>,
    /// Series ids of the histogram samples, parallel to `histograms`
    pub histogram_ids: Vec<SampleId>,
    /// Histogram sample values
    pub histograms: Vec<FloatHistogram>,
}

impl StepVector {
    /// Append a float sample
    #[inline]
    pub fn append_sample(&mut self, id: SampleId, value: f64) {
        self.sample_ids.push(id);
        self.samples.push(value);
    }

    /// Append a histogram sample
    #[inline]
    pub fn append_histogram(&mut self, id: SampleId, h: FloatHistogram) {
        self.histogram_ids.push(id);
        self.histograms.push(h);
    }

    /// True if the step carries neither samples nor histograms
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.histograms.is_empty()
    }

    /// Total number of samples (floats plus histograms)
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len() + self.histograms.len()
    }

    /// Drop all samples, keeping allocated capacity
    pub fn clear(&mut self) {
        self.sample_ids.clear();
        self.samples.clear();
        self.histogram_ids.clear();
        self.histograms.clear();
    }
}
