//! Binary operations where one operand is a scalar stream
//!
//! The vector child drives the steps; the scalar child contributes one
//! value per step (NaN when it produces none). Histogram samples go
//! through the same element kernel as the vector-vector join, so scaling
//! by a scalar works and incompatible combinations turn into annotations.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::Result;
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::operators::binary::{should_drop_metric_name, vector_elem_binop, BinaryOp};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};

/// Which side of the operation the scalar operand sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarSide {
    /// Both operands are scalar streams
    Both,
    /// `scalar OP vector`
    Left,
    /// `vector OP scalar`
    Right,
}

/// Binary operator with a scalar on one (or both) sides
pub struct VectorScalarBinaryOperator {
    pool: Arc<VectorPool>,
    next: Box<dyn VectorOperator>,
    scalar: Box<dyn VectorOperator>,
    op: BinaryOp,
    scalar_side: ScalarSide,
    return_bool: bool,
    series: Option<Arc<[Labels]>>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl VectorScalarBinaryOperator {
    /// Create the operator; `next` is the vector child, `scalar` the scalar child
    pub fn new(
        next: Box<dyn VectorOperator>,
        scalar: Box<dyn VectorOperator>,
        op: BinaryOp,
        scalar_side: ScalarSide,
        return_bool: bool,
        opts: &Options,
    ) -> Self {
        Self {
            pool: Arc::new(VectorPool::new(0)),
            next,
            scalar,
            op,
            scalar_side,
            return_bool,
            series: None,
            telemetry: new_telemetry(opts),
        }
    }

    async fn load_series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        if let Some(series) = &self.series {
            return Ok(series.clone());
        }
        let vector_series = self.next.series(ctx).await?;
        let drop_name = should_drop_metric_name(self.op, self.return_bool);
        let series: Vec<Labels> = vector_series
            .iter()
            .map(|lbls| {
                if drop_name && !lbls.is_empty() {
                    lbls.drop_metric_name()
                } else {
                    lbls.clone()
                }
            })
            .collect();
        self.pool.set_step_size(series.len());
        let series: Arc<[Labels]> = series.into();
        self.telemetry.set_max_series_count(series.len() as i64);
        self.series = Some(series.clone());
        Ok(series)
    }

    /// Operand pair and the index of the vector-side value
    fn operands(&self, sample: f64, scalar: f64) -> ([f64; 2], usize) {
        match self.scalar_side {
            ScalarSide::Left => ([scalar, sample], 1),
            ScalarSide::Right | ScalarSide::Both => ([sample, scalar], 0),
        }
    }

    fn apply_float(&self, operands: [f64; 2], value_idx: usize) -> (f64, bool) {
        let [lhs, rhs] = operands;
        if self.op.is_comparison() {
            let cmp = match self.op {
                BinaryOp::Eql => lhs == rhs,
                BinaryOp::Neq => lhs != rhs,
                BinaryOp::Gtr => lhs > rhs,
                BinaryOp::Lss => lhs < rhs,
                BinaryOp::Gte => lhs >= rhs,
                BinaryOp::Lte => lhs <= rhs,
                _ => unreachable!(),
            };
            if self.scalar_side == ScalarSide::Both {
                // scalar-scalar comparisons evaluate to 0/1 directly
                return (if cmp { 1.0 } else { 0.0 }, true);
            }
            return (operands[value_idx], cmp);
        }
        let r = vector_elem_binop(self.op, lhs, rhs, None, None);
        (r.value, r.keep)
    }

    fn apply_histogram(
        &self,
        ctx: &QueryContext,
        h: &crate::histogram::FloatHistogram,
        scalar: f64,
    ) -> Option<crate::histogram::FloatHistogram> {
        let r = match self.scalar_side {
            ScalarSide::Left => vector_elem_binop(self.op, scalar, 0.0, None, Some(h)),
            ScalarSide::Right | ScalarSide::Both => {
                vector_elem_binop(self.op, 0.0, scalar, Some(h), None)
            }
        };
        if let Some(warning) = r.warning {
            ctx.warnings().add(warning);
        }
        r.histogram
    }

    async fn next_inner(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        ctx.check()?;

        let Some(mut input) = self.next.next(ctx).await? else {
            return Ok(None);
        };
        if self.series.is_none() {
            self.load_series(ctx).await?;
        }
        let mut scalar_in = self.scalar.next(ctx).await?.unwrap_or_default();

        let mut out = self.pool.get_vector_batch();
        for (idx, vector) in input.drain(..).enumerate() {
            let mut step = self.pool.get_step_vector(vector.t);
            let scalar_val = scalar_in
                .get(idx)
                .and_then(|sv| sv.samples.first().copied())
                .unwrap_or(f64::NAN);

            for i in 0..vector.samples.len() {
                let (operands, value_idx) = self.operands(vector.samples[i], scalar_val);
                let (mut val, keep) = self.apply_float(operands, value_idx);
                if self.return_bool {
                    if self.scalar_side != ScalarSide::Both {
                        val = if keep { 1.0 } else { 0.0 };
                    }
                } else if !keep {
                    continue;
                }
                step.append_sample(vector.sample_ids[i], val);
            }

            for i in 0..vector.histograms.len() {
                if let Some(h) = self.apply_histogram(ctx, &vector.histograms[i], scalar_val) {
                    step.append_histogram(vector.histogram_ids[i], h);
                }
            }

            out.push(step);
            self.next.pool().put_step_vector(vector);
        }

        let scalar_pool = self.scalar.pool();
        for sv in scalar_in.drain(..) {
            scalar_pool.put_step_vector(sv);
        }
        self.next.pool().put_vectors(input);
        scalar_pool.put_vectors(scalar_in);

        Ok(Some(out))
    }
}

#[async_trait]
impl VectorOperator for VectorScalarBinaryOperator {
    fn name(&self) -> &'static str {
        "VectorScalarBinary"
    }

    fn detail(&self) -> String {
        format!("VectorScalarBinary: {}", self.op)
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        let start = Instant::now();
        ctx.check()?;
        let res = self.load_series(ctx).await;
        self.telemetry.add_series_execution_time(start.elapsed());
        res
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        let res = self.next_inner(ctx).await;
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
        vec![self.next.as_ref(), self.scalar.as_ref()]
    }
}
