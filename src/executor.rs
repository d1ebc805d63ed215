//! Query driver
//!
//! The executor pulls batches from the root operator until end of stream,
//! enforces the pool discipline (every step vector goes back to the
//! producer's pool), and folds the stream into a per-series result matrix.

use tracing::debug;

use crate::error::Result;
use crate::histogram::FloatHistogram;
use crate::labels::Labels;
use crate::model::VectorOperator;
use crate::query::{Options, QueryContext};
use crate::types::{Sample, Timestamp};
use crate::warnings::Annotation;

/// All samples collected for one output series
#[derive(Debug, Clone, Default)]
pub struct SeriesResult {
    /// The series' label set
    pub labels: Labels,
    /// Float samples in step order
    pub samples: Vec<Sample>,
    /// Histogram samples in step order
    pub histograms: Vec<(Timestamp, FloatHistogram)>,
}

/// The materialized result of driving one query to completion
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// One entry per output series, in series-table order
    pub series: Vec<SeriesResult>,
    /// Non-fatal annotations collected during execution
    pub warnings: Vec<Annotation>,
    /// Number of evaluation steps processed
    pub steps: usize,
}

impl QueryResult {
    /// The result series matching `labels`, if present
    pub fn series_with(&self, labels: &Labels) -> Option<&SeriesResult> {
        self.series.iter().find(|s| &s.labels == labels)
    }
}

/// Drives an operator tree to completion
pub struct Executor {
    opts: Options,
}

impl Executor {
    /// Create an executor for the given options
    pub fn new(opts: Options) -> Self {
        Self { opts }
    }

    /// The options this executor was built with
    pub fn options(&self) -> &Options {
        &self.opts
    }

    /// Pull `root` to end of stream and collect the result matrix
    ///
    /// Scalar streams report an empty series table while emitting sample
    /// id zero; those samples land in a synthesized row with empty labels.
    pub async fn execute(
        &self,
        root: &mut dyn VectorOperator,
        ctx: &QueryContext,
    ) -> Result<QueryResult> {
        let series = root.series(ctx).await?;
        debug!(series = series.len(), "executing operator tree");

        let mut rows: Vec<SeriesResult> = series
            .iter()
            .map(|labels| SeriesResult {
                labels: labels.clone(),
                ..Default::default()
            })
            .collect();
        let mut scalar_row: Option<SeriesResult> = None;

        let pool = root.pool();
        let mut steps = 0usize;
        let mut last_ts: Option<Timestamp> = None;

        while let Some(mut batch) = root.next(ctx).await? {
            for mut sv in batch.drain(..) {
                debug_assert!(
                    last_ts.map_or(true, |prev| sv.t > prev),
                    "steps must arrive in strictly ascending timestamp order"
                );
                last_ts = Some(sv.t);
                steps += 1;

                for (i, &id) in sv.sample_ids.iter().enumerate() {
                    let sample = Sample::new(sv.t, sv.samples[i]);
                    match rows.get_mut(id as usize) {
                        Some(row) => row.samples.push(sample),
                        None => scalar_row
                            .get_or_insert_with(SeriesResult::default)
                            .samples
                            .push(sample),
                    }
                }
                for (i, &id) in sv.histogram_ids.iter().enumerate() {
                    let entry = (sv.t, std::mem::take(&mut sv.histograms[i]));
                    match rows.get_mut(id as usize) {
                        Some(row) => row.histograms.push(entry),
                        None => scalar_row
                            .get_or_insert_with(SeriesResult::default)
                            .histograms
                            .push(entry),
                    }
                }
                pool.put_step_vector(sv);
            }
            pool.put_vectors(batch);
        }

        rows.extend(scalar_row);
        debug!(steps, "operator tree exhausted");

        Ok(QueryResult {
            series: rows,
            warnings: ctx.warnings().collect(),
            steps,
        })
    }
}
