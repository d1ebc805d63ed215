//! The `scalar()` projection operator
//!
//! Projects a vector stream onto a scalar stream: at each step, the single
//! sample's value if the input has exactly one sample, NaN otherwise.
//! Scalar streams carry no series table; the emitted sample id is always
//! zero. Histograms never propagate through `scalar()`.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};

/// Projects each input step onto a single scalar value
pub struct ScalarFunctionOperator {
    pool: Arc<VectorPool>,
    next: Box<dyn VectorOperator>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl ScalarFunctionOperator {
    /// Create the operator over a vector child
    pub fn new(next: Box<dyn VectorOperator>, opts: &Options) -> Self {
        Self {
            pool: Arc::new(VectorPool::new(1)),
            next,
            telemetry: new_telemetry(opts),
        }
    }
}

#[async_trait]
impl VectorOperator for ScalarFunctionOperator {
    fn name(&self) -> &'static str {
        "Scalar"
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        ctx.check()?;
        Ok(Vec::new().into())
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        let res = async {
            ctx.check()?;

            let Some(mut input) = self.next.next(ctx).await? else {
                return Ok(None);
            };

            let mut out = self.pool.get_vector_batch();
            for vector in input.drain(..) {
                let mut sv = self.pool.get_step_vector(vector.t);
                if vector.samples.len() == 1 {
                    sv.append_sample(0, vector.samples[0]);
                } else {
                    sv.append_sample(0, f64::NAN);
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
