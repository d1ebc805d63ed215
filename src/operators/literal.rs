//! Number-literal leaf operator
//!
//! Produces a constant value at every evaluation step, as a single series
//! with the empty label set. `vector(3)` and the scalar sides of binary
//! expressions bottom out here.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};
use crate::types::Timestamp;

/// Emits one constant sample per evaluation step
pub struct NumberLiteralOperator {
    value: f64,
    current: Timestamp,
    end: Timestamp,
    step: i64,
    steps_batch: usize,
    done: bool,
    pool: Arc<VectorPool>,
    series: Arc<[Labels]>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl NumberLiteralOperator {
    /// Create a literal producing `value` over the query range
    pub fn new(value: f64, opts: &Options) -> Self {
        Self {
            value,
            current: opts.start,
            end: opts.end,
            step: opts.step_millis().max(1),
            steps_batch: opts.steps_batch,
            done: false,
            pool: Arc::new(VectorPool::new(1)),
            series: vec![Labels::empty()].into(),
            telemetry: new_telemetry(opts),
        }
    }
}

#[async_trait]
impl VectorOperator for NumberLiteralOperator {
    fn name(&self) -> &'static str {
        "NumberLiteral"
    }

    fn detail(&self) -> String {
        format!("NumberLiteral: {}", self.value)
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        ctx.check()?;
        self.telemetry.set_max_series_count(1);
        Ok(self.series.clone())
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        ctx.check()?;
        if self.done {
            self.telemetry.add_next_execution_time(start.elapsed());
            return Ok(None);
        }

        let mut batch = self.pool.get_vector_batch();
        for _ in 0..self.steps_batch {
            if self.current > self.end {
                self.done = true;
                break;
            }
            let mut sv = self.pool.get_step_vector(self.current);
            sv.append_sample(0, self.value);
            batch.push(sv);
            self.current += self.step;
        }
        let res = if batch.is_empty() {
            self.pool.put_vectors(batch);
            Ok(None)
        } else {
            Ok(Some(batch))
        };
        self.telemetry.add_next_execution_time(start.elapsed());
        res
    }

    fn pool(&self) -> Arc<VectorPool> {
        self.pool.clone()
    }

    fn telemetry(&self) -> Option<&dyn OperatorTelemetry> {
        Some(self.telemetry.as_ref())
    }
}
