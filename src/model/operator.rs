//! The pull-based operator protocol
//!
//! Every physical operator is a pull source of step-vector batches. The
//! driving loop calls [`VectorOperator::next`] until it returns `None`;
//! [`VectorOperator::series`] exposes the output schema and may be called
//! before or interleaved with `next`.
//!
//! Operators whose `next` depends on the series table resolve it lazily on
//! first use. The `&mut self` receivers make the one-shot initialization
//! rule hold by construction: only one caller can be inside an operator at
//! a time, so memoizing in an `Option` is race-free.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::labels::Labels;
use crate::model::pool::VectorPool;
use crate::model::step_vector::StepVector;
use crate::query::QueryContext;
use crate::telemetry::OperatorTelemetry;

/// A pull source of step-vector batches
#[async_trait]
pub trait VectorOperator: Send {
    /// Stable operator name for explain output and tracing
    fn name(&self) -> &'static str;

    /// Human-readable operator description with parameters
    fn detail(&self) -> String {
        self.name().to_string()
    }

    /// The output schema: one label set per output series
    ///
    /// Idempotent; memoized on first call. Checks `ctx` at entry.
    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>>;

    /// Produce the next batch of contiguous evaluation steps
    ///
    /// Returns `None` at end of stream. Each returned step vector must be
    /// handed back to [`VectorOperator::pool`] after consumption, then the
    /// batch itself via `put_vectors`. Checks `ctx` at entry.
    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>>;

    /// The pool owning batches returned by this operator
    fn pool(&self) -> Arc<VectorPool>;

    /// Child operators, for introspection only
    fn explain(&self) -> Vec<&dyn VectorOperator> {
        Vec::new()
    }

    /// This operator's telemetry
    ///
    /// Returns the no-op implementation unless the query enabled analysis.
    fn telemetry(&self) -> Option<&dyn OperatorTelemetry> {
        None
    }
}

/// Render an operator tree as an indented explain string
pub fn explain_tree(op: &dyn VectorOperator) -> String {
    fn walk(op: &dyn VectorOperator, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&op.detail());
        out.push('\n');
        for child in op.explain() {
            walk(child, depth + 1, out);
        }
    }
    let mut out = String::new();
    walk(op, 0, &mut out);
    out
}
