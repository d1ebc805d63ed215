//! Binary operations between two vectors
//!
//! The join is signature-based: each side's series get a 64-bit signature
//! from the matching labels, and series with equal signatures share a join
//! bucket. Buckets live in one arena; the per-side tables hold indices into
//! it, so a bucket touched through the low-cardinality side is visible when
//! the high-cardinality side probes it in the same step.
//!
//! Output series ids come from a cantor pairing of `(hc + 1, lc + 1)`;
//! the `+1` reserves zero for "no partner", which `or` and `unless` use.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{BinOpSide, EngineError, Result};
use crate::histogram::FloatHistogram;
use crate::labels::{Labels, LabelsBuilder, SignatureFunc};
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::operators::binary::{
    should_drop_metric_name, vector_elem_binop, BinaryOp, BinopResult, VectorMatchCardinality,
    VectorMatching,
};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};
use crate::types::{SampleId, Timestamp};

/// Join state shared between all series of one signature
#[derive(Debug, Clone, Default)]
struct JoinBucket {
    /// Timestamp the low-card side last touched this bucket
    ats: Timestamp,
    /// Timestamp the high-card side last consumed this bucket
    bts: Timestamp,
    /// Low-card sample id that touched the bucket
    sid: SampleId,
    /// Low-card histogram id that touched the bucket
    hid: SampleId,
    /// Low-card float value at `ats`
    val: f64,
    /// Low-card histogram value, if one was bucketed
    hval: Option<FloatHistogram>,
}

impl JoinBucket {
    fn unused() -> Self {
        Self {
            ats: -1,
            bts: -1,
            ..Default::default()
        }
    }
}

/// Matching-aware binary operator over two vectors
pub struct VectorBinaryOperator {
    pool: Arc<VectorPool>,
    lhs: Box<dyn VectorOperator>,
    rhs: Box<dyn VectorOperator>,
    matching: VectorMatching,
    op: BinaryOp,
    return_bool: bool,

    lhs_series: Vec<Labels>,
    rhs_series: Vec<Labels>,
    series: Option<Arc<[Labels]>>,

    buckets: Vec<JoinBucket>,
    lc_join_buckets: Vec<usize>,
    hc_join_buckets: Vec<usize>,
    output_map: HashMap<u64, u64>,

    telemetry: Box<dyn OperatorTelemetry>,
}

/// Bijection ℕ²→ℕ used to key `(hc, lc)` pairs in the output map
fn cantor_pairing(hc: u64, lc: u64) -> u64 {
    (hc + lc) * (hc + lc + 1) / 2 + lc
}

/// Deduplicating collector of output label sets
#[derive(Default)]
struct JoinHelper {
    seen: HashMap<u64, u64>,
    ls: Vec<Labels>,
}

impl JoinHelper {
    fn append(&mut self, labels: Labels) -> u64 {
        let hash = labels.hash();
        if let Some(&n) = self.seen.get(&hash) {
            return n;
        }
        let n = self.ls.len() as u64;
        self.seen.insert(hash, n);
        self.ls.push(labels);
        n
    }
}

impl VectorBinaryOperator {
    /// Create the operator over `lhs OP rhs` with the given matching
    pub fn new(
        lhs: Box<dyn VectorOperator>,
        rhs: Box<dyn VectorOperator>,
        matching: VectorMatching,
        op: BinaryOp,
        return_bool: bool,
        opts: &Options,
    ) -> Self {
        Self {
            pool: Arc::new(VectorPool::new(0)),
            lhs,
            rhs,
            matching,
            op,
            return_bool,
            lhs_series: Vec::new(),
            rhs_series: Vec::new(),
            series: None,
            buckets: Vec::new(),
            lc_join_buckets: Vec::new(),
            hc_join_buckets: Vec::new(),
            output_map: HashMap::new(),
            telemetry: new_telemetry(opts),
        }
    }

    async fn init_once(&mut self, ctx: &QueryContext) -> Result<()> {
        if self.series.is_some() {
            return Ok(());
        }

        let (lhs_res, rhs_res) = tokio::join!(self.lhs.series(ctx), self.rhs.series(ctx));
        let rhs_series = rhs_res?;
        let lhs_series = lhs_res?;
        self.lhs_series = lhs_series.to_vec();
        self.rhs_series = rhs_series.to_vec();

        let (high_card, low_card) = if self.matching.card == VectorMatchCardinality::OneToMany {
            (self.rhs_series.clone(), self.lhs_series.clone())
        } else {
            (self.lhs_series.clone(), self.rhs_series.clone())
        };

        self.init_join_tables(&high_card, &low_card);
        debug!(
            op = %self.op,
            high_card = high_card.len(),
            low_card = low_card.len(),
            output = self.series.as_ref().map_or(0, |s| s.len()),
            "join tables initialized"
        );
        Ok(())
    }

    fn init_join_tables(&mut self, high_card: &[Labels], low_card: &[Labels]) {
        let mut sig_func = SignatureFunc::new(self.matching.on, &self.matching.matching_labels);

        let mut bucket_by_sig: HashMap<u64, usize> = HashMap::new();
        let mut buckets: Vec<JoinBucket> = Vec::new();
        let mut lc_join_buckets = vec![0usize; low_card.len()];
        let mut hc_join_buckets = vec![0usize; high_card.len()];
        let mut lc_hash_to_series: HashMap<u64, Vec<u64>> = HashMap::with_capacity(low_card.len());
        let mut lc_signatures: Vec<u64> = Vec::with_capacity(low_card.len());
        let mut hc_signatures: Vec<u64> = Vec::with_capacity(high_card.len());

        for (i, labels) in low_card.iter().enumerate() {
            let sig = sig_func.signature(labels);
            lc_signatures.push(sig);
            lc_hash_to_series.entry(sig).or_default().push(i as u64);
            let idx = *bucket_by_sig.entry(sig).or_insert_with(|| {
                buckets.push(JoinBucket::unused());
                buckets.len() - 1
            });
            lc_join_buckets[i] = idx;
        }
        for (i, labels) in high_card.iter().enumerate() {
            let sig = sig_func.signature(labels);
            hc_signatures.push(sig);
            let idx = *bucket_by_sig.entry(sig).or_insert_with(|| {
                buckets.push(JoinBucket::unused());
                buckets.len() - 1
            });
            hc_join_buckets[i] = idx;
        }

        let mut helper = JoinHelper::default();
        let mut output_map: HashMap<u64, u64> = HashMap::with_capacity(high_card.len());
        match self.op {
            BinaryOp::And => {
                for (i, sig) in hc_signatures.iter().enumerate() {
                    let Some(lcs) = lc_hash_to_series.get(sig) else {
                        continue;
                    };
                    for &lc in lcs {
                        output_map.insert(
                            cantor_pairing(i as u64 + 1, lc + 1),
                            helper.append(high_card[i].clone()),
                        );
                    }
                }
            }
            BinaryOp::Or => {
                for (i, labels) in high_card.iter().enumerate() {
                    output_map
                        .insert(cantor_pairing(i as u64 + 1, 0), helper.append(labels.clone()));
                }
                for (i, labels) in low_card.iter().enumerate() {
                    output_map
                        .insert(cantor_pairing(0, i as u64 + 1), helper.append(labels.clone()));
                }
            }
            BinaryOp::Unless => {
                for (i, labels) in high_card.iter().enumerate() {
                    output_map
                        .insert(cantor_pairing(i as u64 + 1, 0), helper.append(labels.clone()));
                }
            }
            _ => {
                let mut b = LabelsBuilder::new();
                for (i, sig) in hc_signatures.iter().enumerate() {
                    let Some(lcs) = lc_hash_to_series.get(sig) else {
                        continue;
                    };
                    for &lc in lcs {
                        let metric =
                            self.result_metric(&mut b, &high_card[i], &low_card[lc as usize]);
                        output_map
                            .insert(cantor_pairing(i as u64 + 1, lc + 1), helper.append(metric));
                    }
                }
            }
        }

        self.pool.set_step_size(helper.ls.len());
        self.telemetry.set_max_series_count(helper.ls.len() as i64);
        self.series = Some(helper.ls.into());
        self.output_map = output_map;
        self.buckets = buckets;
        self.lc_join_buckets = lc_join_buckets;
        self.hc_join_buckets = hc_join_buckets;
    }

    fn result_metric(&self, b: &mut LabelsBuilder, high_card: &Labels, low_card: &Labels) -> Labels {
        b.reset(high_card);

        if should_drop_metric_name(self.op, self.return_bool) {
            b.del(crate::labels::METRIC_NAME);
        }

        if self.matching.card == VectorMatchCardinality::OneToOne {
            if self.matching.on {
                b.keep(&self.matching.matching_labels);
            } else {
                b.del_all(&self.matching.matching_labels);
            }
        }
        for name in &self.matching.include {
            match low_card.get(name) {
                Some(v) if !v.is_empty() => {
                    b.set(name, v);
                }
                _ => {
                    b.del(name);
                }
            }
        }
        if self.return_bool {
            b.del(crate::labels::METRIC_NAME);
        }
        b.labels()
    }

    fn output_series_id(&self, hc: u64, lc: u64) -> SampleId {
        self.output_map
            .get(&cantor_pairing(hc, lc))
            .copied()
            .unwrap_or(0)
    }

    /// The element kernel, with operands swapped on `group_right`
    fn compute_binary_pairing(
        &self,
        lhs: f64,
        rhs: f64,
        hlhs: Option<&FloatHistogram>,
        hrhs: Option<&FloatHistogram>,
    ) -> BinopResult {
        // the operator is not commutative, so address potential swapping
        if self.matching.card == VectorMatchCardinality::OneToMany {
            vector_elem_binop(self.op, rhs, lhs, hrhs, hlhs)
        } else {
            vector_elem_binop(self.op, lhs, rhs, hlhs, hrhs)
        }
    }

    fn exec_binary_operation(
        &mut self,
        ctx: &QueryContext,
        lhs: &StepVector,
        rhs: &StepVector,
    ) -> Result<StepVector> {
        match self.op {
            BinaryOp::And => Ok(self.exec_binary_and(lhs, rhs)),
            BinaryOp::Or => Ok(self.exec_binary_or(lhs, rhs)),
            BinaryOp::Unless => Ok(self.exec_binary_unless(lhs, rhs)),
            _ => self.exec_binary_arithmetic(ctx, lhs, rhs),
        }
    }

    fn exec_binary_and(&mut self, lhs: &StepVector, rhs: &StepVector) -> StepVector {
        let ts = lhs.t;
        let mut step = self.pool.get_step_vector(ts);

        for &sid in &rhs.sample_ids {
            let idx = self.lc_join_buckets[sid as usize];
            let jb = &mut self.buckets[idx];
            jb.sid = sid;
            jb.ats = ts;
        }
        for (i, &sid) in lhs.sample_ids.iter().enumerate() {
            let jb = &self.buckets[self.hc_join_buckets[sid as usize]];
            if jb.ats == ts {
                let out = self.output_series_id(sid + 1, jb.sid + 1);
                step.append_sample(out, lhs.samples[i]);
            }
        }
        step
    }

    fn exec_binary_or(&mut self, lhs: &StepVector, rhs: &StepVector) -> StepVector {
        let ts = lhs.t;
        let mut step = self.pool.get_step_vector(ts);

        for (i, &sid) in lhs.sample_ids.iter().enumerate() {
            let idx = self.hc_join_buckets[sid as usize];
            self.buckets[idx].ats = ts;
            step.append_sample(self.output_series_id(sid + 1, 0), lhs.samples[i]);
        }
        for (i, &sid) in rhs.sample_ids.iter().enumerate() {
            let jb = &self.buckets[self.lc_join_buckets[sid as usize]];
            if jb.ats != ts {
                step.append_sample(self.output_series_id(0, sid + 1), rhs.samples[i]);
            }
        }
        step
    }

    fn exec_binary_unless(&mut self, lhs: &StepVector, rhs: &StepVector) -> StepVector {
        let ts = lhs.t;
        let mut step = self.pool.get_step_vector(ts);

        for &sid in &rhs.sample_ids {
            let idx = self.lc_join_buckets[sid as usize];
            self.buckets[idx].ats = ts;
        }
        for (i, &sid) in lhs.sample_ids.iter().enumerate() {
            let jb = &self.buckets[self.hc_join_buckets[sid as usize]];
            if jb.ats != ts {
                step.append_sample(self.output_series_id(sid + 1, 0), lhs.samples[i]);
            }
        }
        step
    }

    fn exec_binary_arithmetic(
        &mut self,
        ctx: &QueryContext,
        lhs: &StepVector,
        rhs: &StepVector,
    ) -> Result<StepVector> {
        let ts = lhs.t;
        let mut step = self.pool.get_step_vector(ts);

        let (hcs, lcs) = match self.matching.card {
            VectorMatchCardinality::ManyToOne | VectorMatchCardinality::OneToOne => (lhs, rhs),
            VectorMatchCardinality::OneToMany => (rhs, lhs),
            VectorMatchCardinality::ManyToMany => {
                return Err(EngineError::InvalidMatchingCardinality(
                    self.matching.card.to_string(),
                ))
            }
        };

        // no samples on the high-card side means no pairings to compute
        if hcs.samples.is_empty() && hcs.histograms.is_empty() {
            return Ok(step);
        }

        for (i, &sid) in lcs.sample_ids.iter().enumerate() {
            let idx = self.lc_join_buckets[sid as usize];
            let jb = &mut self.buckets[idx];
            // A second touch in the same step means two low-card rows share
            // a signature: a many-to-many relation.
            if jb.ats == ts {
                let original = jb.sid;
                return Err(self.many_to_many_match_error(original, sid));
            }
            jb.sid = sid;
            jb.val = lcs.samples[i];
            jb.ats = ts;
        }

        for (i, &hid) in lcs.histogram_ids.iter().enumerate() {
            let idx = self.lc_join_buckets[hid as usize];
            let jb = &mut self.buckets[idx];
            if jb.ats == ts {
                let original = jb.hid;
                return Err(self.many_to_many_match_error(original, hid));
            }
            jb.hid = hid;
            jb.hval = Some(lcs.histograms[i].clone());
            jb.ats = ts;
        }

        for (i, &sid) in hcs.sample_ids.iter().enumerate() {
            let idx = self.hc_join_buckets[sid as usize];
            let (ats, bts, lc_sid, lc_val) = {
                let jb = &self.buckets[idx];
                (jb.ats, jb.bts, jb.sid, jb.val)
            };
            if ats != ts {
                continue;
            }
            // A second consumption in one-to-one mode is an implicit
            // many-to-one match.
            if bts == ts && self.matching.card == VectorMatchCardinality::OneToOne {
                return Err(EngineError::ImplicitManyToOne);
            }
            self.buckets[idx].bts = ts;

            let r = self.compute_binary_pairing(hcs.samples[i], lc_val, None, None);
            if let Some(warning) = r.warning {
                ctx.warnings().add(warning);
            }
            let mut value = r.value;
            if self.return_bool {
                value = if r.keep { 1.0 } else { 0.0 };
            } else if !r.keep {
                continue;
            }
            step.append_sample(self.output_series_id(sid + 1, lc_sid + 1), value);
        }

        for (i, &hid) in hcs.histogram_ids.iter().enumerate() {
            let idx = self.hc_join_buckets[hid as usize];
            let (ats, bts, lc_sid) = {
                let jb = &self.buckets[idx];
                (jb.ats, jb.bts, jb.sid)
            };
            if ats != ts {
                continue;
            }
            if bts == ts && self.matching.card == VectorMatchCardinality::OneToOne {
                return Err(EngineError::ImplicitManyToOne);
            }
            self.buckets[idx].bts = ts;

            let hval = self.buckets[idx].hval.clone();
            let r = self.compute_binary_pairing(0.0, 0.0, Some(&hcs.histograms[i]), hval.as_ref());
            if let Some(warning) = r.warning {
                ctx.warnings().add(warning);
            }
            if let Some(h) = r.histogram {
                step.append_histogram(self.output_series_id(hid + 1, lc_sid + 1), h);
            }
        }

        Ok(step)
    }

    fn many_to_many_match_error(&self, original: SampleId, duplicate: SampleId) -> EngineError {
        let (side, labels) = if self.matching.card == VectorMatchCardinality::OneToMany {
            (BinOpSide::Left, &self.lhs_series)
        } else {
            (BinOpSide::Right, &self.rhs_series)
        };
        let duplicate = labels[duplicate as usize].clone();
        let original = labels[original as usize].clone();
        let group = if self.matching.on {
            duplicate.with_labels(&self.matching.matching_labels)
        } else {
            duplicate.without_labels(&self.matching.matching_labels)
        };
        EngineError::ManyToManyMatch {
            side,
            group,
            duplicate,
            original,
        }
    }

    async fn next_inner(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        ctx.check()?;

        // Some parents never call series() on all their children.
        self.init_once(ctx).await?;

        let (lhs_res, rhs_res) = tokio::join!(self.lhs.next(ctx), self.rhs.next(ctx));
        let rhs_batch = rhs_res?;
        let lhs_batch = lhs_res?;

        let (mut lhs_batch, mut rhs_batch) = match (lhs_batch, rhs_batch) {
            (Some(l), Some(r)) => (l, r),
            (l, r) => {
                // one side ended: drain the other back into its pool
                if let Some(mut l) = l {
                    for sv in l.drain(..) {
                        self.lhs.pool().put_step_vector(sv);
                    }
                    self.lhs.pool().put_vectors(l);
                }
                if let Some(mut r) = r {
                    for sv in r.drain(..) {
                        self.rhs.pool().put_step_vector(sv);
                    }
                    self.rhs.pool().put_vectors(r);
                }
                return Ok(None);
            }
        };

        let mut batch = self.pool.get_vector_batch();
        let paired = lhs_batch.len().min(rhs_batch.len());
        for i in 0..paired {
            let lhs_sv = std::mem::take(&mut lhs_batch[i]);
            let rhs_sv = std::mem::take(&mut rhs_batch[i]);
            let step = self.exec_binary_operation(ctx, &lhs_sv, &rhs_sv)?;
            batch.push(step);
            self.lhs.pool().put_step_vector(lhs_sv);
            self.rhs.pool().put_step_vector(rhs_sv);
        }
        for sv in lhs_batch.drain(paired..) {
            self.lhs.pool().put_step_vector(sv);
        }
        for sv in rhs_batch.drain(paired..) {
            self.rhs.pool().put_step_vector(sv);
        }
        lhs_batch.clear();
        rhs_batch.clear();
        self.lhs.pool().put_vectors(lhs_batch);
        self.rhs.pool().put_vectors(rhs_batch);

        Ok(Some(batch))
    }
}

#[async_trait]
impl VectorOperator for VectorBinaryOperator {
    fn name(&self) -> &'static str {
        "VectorBinary"
    }

    fn detail(&self) -> String {
        if self.matching.on {
            format!(
                "VectorBinary: {} {}, on: {:?}, group: {:?}",
                self.op, self.matching.card, self.matching.matching_labels, self.matching.include
            )
        } else {
            format!(
                "VectorBinary: {} {}, ignoring: {:?}, group: {:?}",
                self.op, self.matching.card, self.matching.matching_labels, self.matching.include
            )
        }
    }

    async fn series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        let start = Instant::now();
        ctx.check()?;
        let res = match self.init_once(ctx).await {
            Ok(()) => match &self.series {
                Some(series) => Ok(series.clone()),
                None => Err(EngineError::Internal(
                    "join tables left uninitialized".to_string(),
                )),
            },
            Err(err) => Err(err),
        };
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
        vec![self.lhs.as_ref(), self.rhs.as_ref()]
    }
}
