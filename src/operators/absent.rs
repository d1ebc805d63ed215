//! The `absent()` operator
//!
//! Emits the value 1 for a single synthesized series at every step where
//! the input produces neither samples nor histograms, and nothing
//! otherwise. The output series is derived from the equality matchers of
//! the wrapped selector, so `absent(up{job="x"})` reports `{job="x"}`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::labels::{Labels, LabelsBuilder, MatchOp, Matcher, METRIC_NAME};
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};

/// Synthesizes a presence indicator for an absent input
pub struct AbsentOperator {
    pool: Arc<VectorPool>,
    next: Box<dyn VectorOperator>,
    /// Matchers of the wrapped selector; `None` when the argument is not a
    /// vector or matrix selector
    matchers: Option<Vec<Matcher>>,
    series: Option<Arc<[Labels]>>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl AbsentOperator {
    /// Create the operator; `matchers` come from the selector argument
    pub fn new(
        next: Box<dyn VectorOperator>,
        matchers: Option<Vec<Matcher>>,
        opts: &Options,
    ) -> Self {
        Self {
            pool: Arc::new(VectorPool::new(1)),
            next,
            matchers,
            series: None,
            telemetry: new_telemetry(opts),
        }
    }

    fn load_series(&mut self) -> Arc<[Labels]> {
        if let Some(series) = &self.series {
            return series.clone();
        }
        self.pool.set_step_size(1);

        let labels = match &self.matchers {
            None => Labels::empty(),
            Some(matchers) => {
                let mut has: HashSet<&str> = HashSet::new();
                let mut b = LabelsBuilder::new();
                for m in matchers {
                    if m.name == METRIC_NAME {
                        continue;
                    }
                    if m.op == MatchOp::Equal && !has.contains(m.name.as_str()) {
                        b.set(&m.name, &m.value);
                        has.insert(&m.name);
                    } else {
                        b.del(&m.name);
                    }
                }
                b.labels()
            }
        };
        let series: Arc<[Labels]> = vec![labels].into();
        self.telemetry.set_max_series_count(1);
        self.series = Some(series.clone());
        series
    }
}

#[async_trait]
impl VectorOperator for AbsentOperator {
    fn name(&self) -> &'static str {
        "Absent"
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        let start = Instant::now();
        ctx.check()?;
        let series = self.load_series();
        self.telemetry.add_series_execution_time(start.elapsed());
        Ok(series)
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        let res = async {
            ctx.check()?;
            self.load_series();

            let Some(mut input) = self.next.next(ctx).await? else {
                return Ok(None);
            };

            let mut out = self.pool.get_vector_batch();
            for vector in input.drain(..) {
                let mut sv = self.pool.get_step_vector(vector.t);
                if vector.samples.is_empty() && vector.histograms.is_empty() {
                    sv.append_sample(0, 1.0);
                }
                out.push(sv);
                self.next.pool().put_step_vector(vector);
            }
            self.next.pool().put_vectors(input);
            Ok(Some(out))
        }
        .await;
        self.telemetry.add_next_execution_time(start.elapsed());
        res
    }

    fn pool(&self) -> Arc<VectorPool> {
        self.pool.clone()
    }

    fn telemetry(&self) -> Option<&dyn OperatorTelemetry> {
        Some(self.telemetry.as_ref())
    }

    fn explain(&self) -> Vec<&dyn VectorOperator> {
        vec![self.next.as_ref()]
    }
}
