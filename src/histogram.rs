//! Sparse float histograms
//!
//! A [`FloatHistogram`] carries a total `count` and `sum`, a zero bucket,
//! and sparse signed buckets on either side of zero. Buckets are either
//! exponential (bounds derived from a resolution `schema`) or custom
//! (explicit upper bounds). Arithmetic is value-semantic: callers clone
//! before mutating so upstream owners never observe changes.
//!
//! Bucket storage is a sorted `(index, count)` vector per sign rather than
//! the span-encoded layout used on the wire; the execution core only needs
//! cheap merge, scale and iteration.

use thiserror::Error;

/// Errors from histogram-histogram arithmetic
///
/// These are non-fatal at the query level: binary operators convert them
/// into annotations and drop the sample.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistogramError {
    /// One operand uses custom bucket bounds, the other exponential ones
    #[error("cannot apply this operation to histograms with a mix of exponential and custom bucket schemas")]
    MixedSchemas,

    /// Both operands use custom bounds but the bounds differ
    #[error("cannot apply this operation to histograms with different custom bucket boundaries")]
    IncompatibleCustomBounds,
}

/// One materialized bucket: `(lower, upper]` carrying `count` observations
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    /// Lower bound (exclusive for positive buckets)
    pub lower: f64,
    /// Upper bound (inclusive for positive buckets)
    pub upper: f64,
    /// Number of observations in the bucket
    pub count: f64,
}

/// A sparse histogram over 64-bit floats
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatHistogram {
    /// Exponential resolution: bucket `i` has upper bound `2^(i * 2^-schema)`.
    /// Ignored when `custom_values` is set.
    pub schema: i8,
    /// Custom bucket upper bounds, sorted ascending. When set, `positive`
    /// indexes into this table and `negative`/zero bucket are unused.
    pub custom_values: Option<Vec<f64>>,
    /// Width of the zero bucket: observations in `[-zero_threshold, zero_threshold]`
    pub zero_threshold: f64,
    /// Observations in the zero bucket
    pub zero_count: f64,
    /// Total observation count
    pub count: f64,
    /// Sum of all observed values
    pub sum: f64,
    /// Positive buckets as `(index, count)`, sorted by index
    pub positive: Vec<(i32, f64)>,
    /// Negative buckets as `(index, count)`, sorted by index
    pub negative: Vec<(i32, f64)>,
}

impl FloatHistogram {
    /// New empty exponential histogram at the given schema
    pub fn exponential(schema: i8) -> Self {
        Self {
            schema,
            ..Default::default()
        }
    }

    /// New empty histogram over custom bucket bounds
    pub fn custom(bounds: Vec<f64>) -> Self {
        Self {
            custom_values: Some(bounds),
            ..Default::default()
        }
    }

    /// Set the total sum
    pub fn with_sum(mut self, sum: f64) -> Self {
        self.sum = sum;
        self
    }

    /// Set the total count
    pub fn with_count(mut self, count: f64) -> Self {
        self.count = count;
        self
    }

    /// Set the zero bucket
    pub fn with_zero(mut self, threshold: f64, count: f64) -> Self {
        self.zero_threshold = threshold;
        self.zero_count = count;
        self
    }

    /// Set the positive buckets; indices must be unique
    pub fn with_positive_buckets(mut self, mut buckets: Vec<(i32, f64)>) -> Self {
        buckets.sort_by_key(|&(i, _)| i);
        self.positive = buckets;
        self
    }

    /// Set the negative buckets; indices must be unique
    pub fn with_negative_buckets(mut self, mut buckets: Vec<(i32, f64)>) -> Self {
        buckets.sort_by_key(|&(i, _)| i);
        self.negative = buckets;
        self
    }

    /// True if this histogram uses custom bucket bounds
    pub fn uses_custom_buckets(&self) -> bool {
        self.custom_values.is_some()
    }

    /// Scale every count and the sum by `factor`
    pub fn mul(mut self, factor: f64) -> Self {
        self.count *= factor;
        self.sum *= factor;
        self.zero_count *= factor;
        for (_, c) in &mut self.positive {
            *c *= factor;
        }
        for (_, c) in &mut self.negative {
            *c *= factor;
        }
        self
    }

    /// Divide every count and the sum by `divisor`
    pub fn div(self, divisor: f64) -> Self {
        self.mul(1.0 / divisor)
    }

    /// Add another histogram, merging buckets
    ///
    /// Exponential operands of differing resolution are reduced to the
    /// coarser schema first. Mixing custom and exponential operands, or
    /// custom operands with different bounds, is an error.
    pub fn add(self, other: &Self) -> Result<Self, HistogramError> {
        self.combine(other, 1.0)
    }

    /// Subtract another histogram, merging buckets
    pub fn sub(self, other: &Self) -> Result<Self, HistogramError> {
        self.combine(other, -1.0)
    }

    fn combine(mut self, other: &Self, sign: f64) -> Result<Self, HistogramError> {
        match (&self.custom_values, &other.custom_values) {
            (Some(a), Some(b)) => {
                if a != b {
                    return Err(HistogramError::IncompatibleCustomBounds);
                }
            }
            (None, None) => {}
            _ => return Err(HistogramError::MixedSchemas),
        }

        let mut rhs = other.clone();
        if !self.uses_custom_buckets() {
            let target = self.schema.min(rhs.schema);
            self.reduce_to_schema(target);
            rhs.reduce_to_schema(target);

            let threshold = self.zero_threshold.max(rhs.zero_threshold);
            self.widen_zero_bucket(threshold);
            rhs.widen_zero_bucket(threshold);
        }

        self.count += sign * rhs.count;
        self.sum += sign * rhs.sum;
        self.zero_count += sign * rhs.zero_count;
        self.positive = merge_buckets(&self.positive, &rhs.positive, sign);
        self.negative = merge_buckets(&self.negative, &rhs.negative, sign);
        Ok(self)
    }

    /// Exact structural equality
    pub fn equals(&self, other: &Self) -> bool {
        self == other
    }

    /// Drop buckets whose absolute count does not exceed `tolerance`
    pub fn compact(mut self, tolerance: f64) -> Self {
        self.positive.retain(|&(_, c)| c.abs() > tolerance);
        self.negative.retain(|&(_, c)| c.abs() > tolerance);
        self
    }

    /// Iterate every bucket as `(lower, upper, count)`
    ///
    /// Order: negative buckets by ascending index, the zero bucket when
    /// populated, then positive buckets by ascending index. Custom-bound
    /// histograms only carry positive buckets; the first custom bucket is
    /// open below.
    pub fn all_buckets(&self) -> Vec<Bucket> {
        let mut out = Vec::with_capacity(self.positive.len() + self.negative.len() + 1);
        if let Some(bounds) = &self.custom_values {
            for &(i, count) in &self.positive {
                let idx = i as usize;
                let upper = bounds.get(idx).copied().unwrap_or(f64::INFINITY);
                let lower = if idx == 0 {
                    f64::NEG_INFINITY
                } else {
                    bounds[idx - 1]
                };
                out.push(Bucket { lower, upper, count });
            }
            return out;
        }

        for &(i, count) in &self.negative {
            out.push(Bucket {
                lower: -self.exponential_bound(i),
                upper: -self.exponential_bound(i - 1),
                count,
            });
        }
        if self.zero_count != 0.0 {
            out.push(Bucket {
                lower: -self.zero_threshold,
                upper: self.zero_threshold,
                count: self.zero_count,
            });
        }
        for &(i, count) in &self.positive {
            out.push(Bucket {
                lower: self.exponential_bound(i - 1),
                upper: self.exponential_bound(i),
                count,
            });
        }
        out
    }

    /// Approximate in-memory size in bytes, for sample accounting
    pub fn size(&self) -> usize {
        let buckets = self.positive.len() + self.negative.len();
        let custom = self.custom_values.as_ref().map_or(0, |v| v.len());
        48 + 16 * buckets + 8 * custom
    }

    /// Upper bound of exponential bucket `index` at this schema
    fn exponential_bound(&self, index: i32) -> f64 {
        // 2^(index * 2^-schema)
        2f64.powf(index as f64 * 2f64.powi(-(self.schema as i32)))
    }

    /// Reduce exponential resolution to `target` (must be <= self.schema)
    fn reduce_to_schema(&mut self, target: i8) {
        if self.uses_custom_buckets() || target >= self.schema {
            return;
        }
        let shift = (self.schema - target) as u32;
        let div = 1i32 << shift;
        self.positive = downscale(&self.positive, div);
        self.negative = downscale(&self.negative, div);
        self.schema = target;
    }

    /// Grow the zero bucket to `threshold`, folding covered buckets in
    fn widen_zero_bucket(&mut self, threshold: f64) {
        if threshold <= self.zero_threshold {
            return;
        }
        self.zero_threshold = threshold;
        let mut folded = 0.0;
        let mut kept_pos = Vec::with_capacity(self.positive.len());
        for &(i, c) in &self.positive {
            if self.exponential_bound(i) <= threshold {
                folded += c;
            } else {
                kept_pos.push((i, c));
            }
        }
        let mut kept_neg = Vec::with_capacity(self.negative.len());
        for &(i, c) in &self.negative {
            if self.exponential_bound(i) <= threshold {
                folded += c;
            } else {
                kept_neg.push((i, c));
            }
        }
        self.positive = kept_pos;
        self.negative = kept_neg;
        self.zero_count += folded;
    }
}

/// Merge two sorted bucket lists, adding `sign * rhs` counts
fn merge_buckets(lhs: &[(i32, f64)], rhs: &[(i32, f64)], sign: f64) -> Vec<(i32, f64)> {
    let mut out = Vec::with_capacity(lhs.len() + rhs.len());
    let (mut i, mut j) = (0, 0);
    while i < lhs.len() && j < rhs.len() {
        match lhs[i].0.cmp(&rhs[j].0) {
            std::cmp::Ordering::Less => {
                out.push(lhs[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push((rhs[j].0, sign * rhs[j].1));
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push((lhs[i].0, lhs[i].1 + sign * rhs[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&lhs[i..]);
    out.extend(rhs[j..].iter().map(|&(idx, c)| (idx, sign * c)));
    out
}

/// Map bucket indices to a coarser schema: `ceil(index / div)`
fn downscale(buckets: &[(i32, f64)], div: i32) -> Vec<(i32, f64)> {
    let mut out: Vec<(i32, f64)> = Vec::with_capacity(buckets.len());
    for &(i, c) in buckets {
        let target = ceil_div(i, div);
        match out.last_mut() {
            Some(last) if last.0 == target => last.1 += c,
            _ => out.push((target, c)),
        }
    }
    out
}

fn ceil_div(a: i32, b: i32) -> i32 {
    let d = a.div_euclid(b);
    if a.rem_euclid(b) != 0 {
        d + 1
    } else {
        d
    }
}
