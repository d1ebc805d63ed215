//! In-memory test data source
//!
//! [`DataOperator`] is a leaf operator fed directly with series and
//! per-step samples. Integration tests and benchmarks use it in place of a
//! storage selector.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::histogram::FloatHistogram;
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{histogram_sample_count, new_telemetry, OperatorTelemetry};
use crate::types::{SampleId, Timestamp};

/// One predefined evaluation step
#[derive(Debug, Clone, Default)]
pub struct TestStep {
    /// Evaluation timestamp
    pub t: Timestamp,
    /// Float samples as `(series id, value)`
    pub samples: Vec<(SampleId, f64)>,
    /// Histogram samples as `(series id, histogram)`
    pub histograms: Vec<(SampleId, FloatHistogram)>,
}

impl TestStep {
    /// A step with float samples only
    pub fn floats(t: Timestamp, samples: Vec<(SampleId, f64)>) -> Self {
        Self {
            t,
            samples,
            histograms: Vec::new(),
        }
    }

    /// A step carrying no samples at all
    pub fn empty(t: Timestamp) -> Self {
        Self {
            t,
            samples: Vec::new(),
            histograms: Vec::new(),
        }
    }
}

/// Leaf operator yielding predefined step data
pub struct DataOperator {
    series: Arc<[Labels]>,
    steps: Vec<TestStep>,
    cursor: usize,
    steps_batch: usize,
    pool: Arc<VectorPool>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl DataOperator {
    /// Create a data source over `series` yielding `steps` in order
    pub fn new(series: Vec<Labels>, steps: Vec<TestStep>) -> Self {
        Self::with_options(series, steps, &Options::default())
    }

    /// Create a data source honoring `opts.steps_batch`
    pub fn with_options(series: Vec<Labels>, steps: Vec<TestStep>, opts: &Options) -> Self {
        let pool = Arc::new(VectorPool::new(series.len()));
        Self {
            series: series.into(),
            steps,
            cursor: 0,
            steps_batch: opts.steps_batch,
            pool,
            telemetry: new_telemetry(opts),
        }
    }

    /// A data source with no series and no steps
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

#[async_trait]
impl VectorOperator for DataOperator {
    fn name(&self) -> &'static str {
        "TestData"
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        ctx.check()?;
        self.telemetry.set_max_series_count(self.series.len() as i64);
        Ok(self.series.clone())
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        ctx.check()?;
        if self.cursor >= self.steps.len() {
            self.telemetry.add_next_execution_time(start.elapsed());
            return Ok(None);
        }

        let mut batch = self.pool.get_vector_batch();
        let end = (self.cursor + self.steps_batch).min(self.steps.len());
        for step in &self.steps[self.cursor..end] {
            let mut sv = self.pool.get_step_vector(step.t);
            for &(id, value) in &step.samples {
                sv.append_sample(id, value);
            }
            for (id, h) in &step.histograms {
                sv.append_histogram(*id, h.clone());
            }
            let loaded = sv.samples.len()
                + sv.histograms.iter().map(histogram_sample_count).sum::<usize>();
            self.telemetry.increment_samples_at_timestamp(loaded, step.t);
            batch.push(sv);
        }
        self.cursor = end;
        self.telemetry.add_next_execution_time(start.elapsed());
        Ok(Some(batch))
    }

    fn pool(&self) -> Arc<VectorPool> {
        self.pool.clone()
    }

    fn telemetry(&self) -> Option<&dyn OperatorTelemetry> {
        Some(self.telemetry.as_ref())
    }
}
