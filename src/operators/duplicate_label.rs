//! Duplicate label-set runtime guard
//!
//! Wraps any vector operator and fails the query when two concurrently
//! live series share a label set at the same evaluation timestamp. The
//! collision candidates are precomputed from the child's series table by
//! label-set hash; the per-step check then only touches those candidates.
//!
//! The collision mask is reset per timestamp, not per batch, so a
//! timestamp whose samples are split across batches cannot smear state
//! into its neighbours.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::error::{EngineError, Result};
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};

/// A candidate pair of series with identical label-set hashes
#[derive(Debug, Clone, Copy)]
struct Pair {
    a: usize,
    b: usize,
}

/// Fails the query on two live series sharing a label set
pub struct DuplicateLabelCheckOperator {
    next: Box<dyn VectorOperator>,
    initialized: bool,
    pairs: Vec<Pair>,
    mask: Vec<u64>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl DuplicateLabelCheckOperator {
    /// Wrap `next` with the duplicate check
    pub fn new(next: Box<dyn VectorOperator>, opts: &Options) -> Self {
        Self {
            next,
            initialized: false,
            pairs: Vec::new(),
            mask: Vec::new(),
            telemetry: new_telemetry(opts),
        }
    }

    async fn init(&mut self, ctx: &QueryContext) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        let series = self.next.series(ctx).await?;
        let mut first_by_hash: HashMap<u64, usize> = HashMap::with_capacity(series.len());
        let mut pairs = Vec::new();
        for (i, labels) in series.iter().enumerate() {
            let h = labels.hash();
            if let Some(&j) = first_by_hash.get(&h) {
                pairs.push(Pair { a: i, b: j });
            } else {
                first_by_hash.insert(h, i);
            }
        }
        self.pairs = pairs;
        self.mask = vec![0; series.len()];
        self.initialized = true;
        Ok(())
    }

    /// Check one step against the recorded collision pairs
    fn check_step(&mut self, sv: &StepVector) -> Result<()> {
        let (pairs, mask) = (&self.pairs, &mut self.mask);
        for pair in pairs {
            mask[pair.a] = 0;
            mask[pair.b] = 0;
        }
        for &sid in &sv.sample_ids {
            mask[sid as usize] |= 1;
        }
        for pair in pairs {
            if mask[pair.a] & mask[pair.b] != 0 {
                return Err(EngineError::DuplicateLabelSet);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl VectorOperator for DuplicateLabelCheckOperator {
    fn name(&self) -> &'static str {
        "DuplicateLabelCheck"
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        let start = Instant::now();
        ctx.check()?;
        let res = async {
            self.init(ctx).await?;
            let series = self.next.series(ctx).await?;
            self.telemetry.set_max_series_count(series.len() as i64);
            Ok(series)
        }
        .await;
        self.telemetry.add_series_execution_time(start.elapsed());
        res
    }

    async fn next(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        let start = Instant::now();
        let res = async {
            ctx.check()?;
            self.init(ctx).await?;

            let Some(batch) = self.next.next(ctx).await? else {
                return Ok(None);
            };

            if !self.pairs.is_empty() {
                for sv in &batch {
                    self.check_step(sv)?;
                }
            }

            // forward the batch unchanged
            Ok(Some(batch))
        }
        .await;
        self.telemetry.add_next_execution_time(start.elapsed());
        res
    }

    fn pool(&self) -> Arc<VectorPool> {
        self.next.pool()
    }

    fn telemetry(&self) -> Option<&dyn OperatorTelemetry> {
        Some(self.telemetry.as_ref())
    }

    fn explain(&self) -> Vec<&dyn VectorOperator> {
        vec![self.next.as_ref()]
    }
}
