//! Instant functions and their operators
//!
//! Two operator shapes live here: [`FunctionOperator`] applies a per-sample
//! transform to a vector child (with optional scalar-valued argument
//! children, e.g. `round`'s `to_nearest`), and [`NoArgFunctionOperator`]
//! generates its own steps for functions like `time()` that are keyed on
//! the evaluation timestamp alone.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Timelike, Utc};

use crate::error::{EngineError, Result};
use crate::histogram::FloatHistogram;
use crate::labels::Labels;
use crate::model::{StepVector, VectorOperator, VectorPool};
use crate::query::{Options, QueryContext};
use crate::telemetry::{new_telemetry, OperatorTelemetry};
use crate::types::Timestamp;

/// A per-sample instant function
///
/// Takes the float value, the histogram value when the sample is a native
/// histogram, and any scalar arguments. Returns the output value and
/// whether the sample is kept.
pub type FunctionCall = fn(f64, Option<&FloatHistogram>, &[f64]) -> (f64, bool);

/// A function keyed on the evaluation timestamp alone
pub type NoArgFunctionCall = fn(Timestamp) -> f64;

macro_rules! float_only {
    ($v:ident, $h:ident, $body:expr) => {{
        if $h.is_some() {
            (0.0, false)
        } else {
            ($body, true)
        }
    }};
}

/// Look up an instant function by name
pub fn instant_function(name: &str) -> Option<FunctionCall> {
    let call: FunctionCall = match name {
        "abs" => |v, h, _| float_only!(v, h, v.abs()),
        "ceil" => |v, h, _| float_only!(v, h, v.ceil()),
        "exp" => |v, h, _| float_only!(v, h, v.exp()),
        "floor" => |v, h, _| float_only!(v, h, v.floor()),
        "sqrt" => |v, h, _| float_only!(v, h, v.sqrt()),
        "ln" => |v, h, _| float_only!(v, h, v.ln()),
        "log2" => |v, h, _| float_only!(v, h, v.log2()),
        "log10" => |v, h, _| float_only!(v, h, v.log10()),
        "sin" => |v, h, _| float_only!(v, h, v.sin()),
        "cos" => |v, h, _| float_only!(v, h, v.cos()),
        "tan" => |v, h, _| float_only!(v, h, v.tan()),
        "asin" => |v, h, _| float_only!(v, h, v.asin()),
        "acos" => |v, h, _| float_only!(v, h, v.acos()),
        "atan" => |v, h, _| float_only!(v, h, v.atan()),
        "sinh" => |v, h, _| float_only!(v, h, v.sinh()),
        "cosh" => |v, h, _| float_only!(v, h, v.cosh()),
        "tanh" => |v, h, _| float_only!(v, h, v.tanh()),
        "asinh" => |v, h, _| float_only!(v, h, v.asinh()),
        "acosh" => |v, h, _| float_only!(v, h, v.acosh()),
        "atanh" => |v, h, _| float_only!(v, h, v.atanh()),
        "rad" => |v, h, _| float_only!(v, h, v * std::f64::consts::PI / 180.0),
        "deg" => |v, h, _| float_only!(v, h, v * 180.0 / std::f64::consts::PI),
        "sgn" => |v, h, _| {
            float_only!(v, h, {
                if v.is_nan() {
                    f64::NAN
                } else if v > 0.0 {
                    1.0
                } else if v < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            })
        },
        "round" => |v, h, args| {
            if h.is_some() || args.len() > 1 {
                return (0.0, false);
            }
            let to_nearest = args.first().copied().unwrap_or(1.0);
            let inverse = 1.0 / to_nearest;
            ((v * inverse + 0.5).floor() / inverse, true)
        },
        "pi" => |_, _, _| (std::f64::consts::PI, true),
        "vector" => |v, _, _| (v, true),
        "clamp" => |v, h, args| {
            if h.is_some() || args.len() != 2 {
                return (0.0, false);
            }
            let (min, max) = (args[0], args[1]);
            if max < min {
                return (0.0, false);
            }
            (min.max(max.min(v)), true)
        },
        "clamp_min" => |v, h, args| {
            if h.is_some() || args.len() != 1 {
                return (0.0, false);
            }
            (args[0].max(v), true)
        },
        "clamp_max" => |v, h, args| {
            if h.is_some() || args.len() != 1 {
                return (0.0, false);
            }
            (args[0].min(v), true)
        },
        "histogram_sum" => |_, h, _| match h {
            Some(h) => (h.sum, true),
            None => (0.0, false),
        },
        "histogram_count" => |_, h, _| match h {
            Some(h) => (h.count, true),
            None => (0.0, false),
        },
        "histogram_avg" => |_, h, _| match h {
            Some(h) => (h.sum / h.count, true),
            None => (0.0, false),
        },
        "histogram_stddev" => |_, h, _| match h {
            Some(h) => (histogram_variance(h).sqrt(), true),
            None => (0.0, false),
        },
        "histogram_stdvar" => |_, h, _| match h {
            Some(h) => (histogram_variance(h), true),
            None => (0.0, false),
        },
        // date functions over the sample value as a unix timestamp
        "days_in_month" => |v, h, _| float_only!(v, h, days_in_month(date_from_sample_value(v))),
        "day_of_month" => |v, h, _| float_only!(v, h, date_from_sample_value(v).day() as f64),
        "day_of_week" => |v, h, _| {
            float_only!(v, h, date_from_sample_value(v).weekday().num_days_from_sunday() as f64)
        },
        "day_of_year" => |v, h, _| float_only!(v, h, date_from_sample_value(v).ordinal() as f64),
        "hour" => |v, h, _| float_only!(v, h, date_from_sample_value(v).hour() as f64),
        "minute" => |v, h, _| float_only!(v, h, date_from_sample_value(v).minute() as f64),
        "month" => |v, h, _| float_only!(v, h, date_from_sample_value(v).month() as f64),
        "year" => |v, h, _| float_only!(v, h, date_from_sample_value(v).year() as f64),
        // sorting happens during plan construction; at this level the sort
        // family is an identity over values
        "sort" | "sort_desc" | "sort_by_label" | "sort_by_label_desc" => {
            |v, h, _| float_only!(v, h, v)
        }
        _ => return None,
    };
    Some(call)
}

/// Look up a no-argument function by name
pub fn no_arg_function(name: &str) -> Option<NoArgFunctionCall> {
    let call: NoArgFunctionCall = match name {
        "pi" => |_| std::f64::consts::PI,
        "time" => |t| t as f64 / 1000.0,
        "days_in_month" => |t| days_in_month(date_from_step_time(t)),
        "day_of_month" => |t| date_from_step_time(t).day() as f64,
        "day_of_week" => |t| date_from_step_time(t).weekday().num_days_from_sunday() as f64,
        "day_of_year" => |t| date_from_step_time(t).ordinal() as f64,
        "hour" => |t| date_from_step_time(t).hour() as f64,
        "minute" => |t| date_from_step_time(t).minute() as f64,
        "month" => |t| date_from_step_time(t).month() as f64,
        "year" => |t| date_from_step_time(t).year() as f64,
        _ => return None,
    };
    Some(call)
}

fn date_from_sample_value(v: f64) -> DateTime<Utc> {
    Utc.timestamp_opt(v as i64, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn date_from_step_time(t: Timestamp) -> DateTime<Utc> {
    Utc.timestamp_opt(t / 1000, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

fn days_in_month(t: DateTime<Utc>) -> f64 {
    let (year, month) = (t.year(), t.month());
    let first = NaiveDate::from_ymd_opt(year, month, 1);
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    match (first, next) {
        (Some(a), Some(b)) => (b - a).num_days() as f64,
        _ => f64::NAN,
    }
}

/// Kahan-compensated variance over all buckets of a histogram
///
/// The representative value per bucket is the arithmetic midpoint for
/// custom bounds, zero inside a bucket crossing zero, and the geometric
/// mean otherwise (negated below zero).
fn histogram_variance(h: &FloatHistogram) -> f64 {
    let mean = h.sum / h.count;
    let mut variance = 0.0;
    let mut compensation = 0.0;
    for bucket in h.all_buckets() {
        if bucket.count == 0.0 {
            continue;
        }
        let val = if h.uses_custom_buckets() {
            (bucket.upper + bucket.lower) / 2.0
        } else if bucket.lower <= 0.0 && bucket.upper >= 0.0 {
            0.0
        } else {
            let gm = (bucket.upper * bucket.lower).sqrt();
            if bucket.upper < 0.0 {
                -gm
            } else {
                gm
            }
        };
        let delta = val - mean;
        let (v, c) = kahan_sum_inc(bucket.count * delta * delta, variance, compensation);
        variance = v;
        compensation = c;
    }
    variance += compensation;
    variance / h.count
}

fn kahan_sum_inc(inc: f64, sum: f64, c: f64) -> (f64, f64) {
    let t = sum + inc;
    let c = if sum.abs() >= inc.abs() {
        c + ((sum - t) + inc)
    } else {
        c + ((inc - t) + sum)
    };
    (t, c)
}

// ============================================================================
// Function Operator
// ============================================================================

/// Applies an instant function to every sample of its vector child
pub struct FunctionOperator {
    func_name: String,
    call: FunctionCall,
    next: Box<dyn VectorOperator>,
    /// Scalar-valued argument children, one value per step each
    args: Vec<Box<dyn VectorOperator>>,
    arg_values: Vec<f64>,
    pool: Arc<VectorPool>,
    series: Option<Arc<[Labels]>>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl FunctionOperator {
    /// Create the operator; fails for unknown function names
    pub fn new(
        func_name: &str,
        next: Box<dyn VectorOperator>,
        args: Vec<Box<dyn VectorOperator>>,
        opts: &Options,
    ) -> Result<Self> {
        let call = instant_function(func_name)
            .ok_or_else(|| EngineError::UnknownFunction(func_name.to_string()))?;
        Ok(Self {
            func_name: func_name.to_string(),
            call,
            next,
            arg_values: vec![0.0; args.len()],
            args,
            pool: Arc::new(VectorPool::new(0)),
            series: None,
            telemetry: new_telemetry(opts),
        })
    }

    async fn load_series(&mut self, ctx: &QueryContext) -> Result<Arc<[Labels]>> {
        if let Some(series) = &self.series {
            return Ok(series.clone());
        }
        let input = self.next.series(ctx).await?;
        let keep_name = matches!(
            self.func_name.as_str(),
            "sort" | "sort_desc" | "sort_by_label" | "sort_by_label_desc"
        );
        let series: Vec<Labels> = input
            .iter()
            .map(|lbls| {
                if keep_name {
                    lbls.clone()
                } else {
                    lbls.drop_metric_name()
                }
            })
            .collect();
        self.pool.set_step_size(series.len());
        self.telemetry.set_max_series_count(series.len() as i64);
        let series: Arc<[Labels]> = series.into();
        self.series = Some(series.clone());
        Ok(series)
    }

    async fn next_inner(&mut self, ctx: &QueryContext) -> Result<Option<Vec<StepVector>>> {
        ctx.check()?;

        let Some(mut input) = self.next.next(ctx).await? else {
            return Ok(None);
        };
        if self.series.is_none() {
            self.load_series(ctx).await?;
        }

        let mut arg_batches: Vec<Vec<StepVector>> = Vec::with_capacity(self.args.len());
        for arg in &mut self.args {
            arg_batches.push(arg.next(ctx).await?.unwrap_or_default());
        }

        let mut out = self.pool.get_vector_batch();
        for (idx, vector) in input.drain(..).enumerate() {
            for (a, batch) in arg_batches.iter().enumerate() {
                self.arg_values[a] = batch
                    .get(idx)
                    .and_then(|sv| sv.samples.first().copied())
                    .unwrap_or(f64::NAN);
            }

            let mut step = self.pool.get_step_vector(vector.t);
            for i in 0..vector.samples.len() {
                let (val, keep) = (self.call)(vector.samples[i], None, &self.arg_values);
                if keep {
                    step.append_sample(vector.sample_ids[i], val);
                }
            }
            for i in 0..vector.histograms.len() {
                let (val, keep) = (self.call)(0.0, Some(&vector.histograms[i]), &self.arg_values);
                if keep {
                    step.append_sample(vector.histogram_ids[i], val);
                }
            }
            out.push(step);
            self.next.pool().put_step_vector(vector);
        }
        self.next.pool().put_vectors(input);

        for (arg, mut batch) in self.args.iter().zip(arg_batches.into_iter()) {
            let pool = arg.pool();
            for sv in batch.drain(..) {
                pool.put_step_vector(sv);
            }
            pool.put_vectors(batch);
        }

        Ok(Some(out))
    }
}

#[async_trait]
impl VectorOperator for FunctionOperator {
    fn name(&self) -> &'static str {
        "Function"
    }

    fn detail(&self) -> String {
        format!("Function: {}", self.func_name)
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
        let mut children: Vec<&dyn VectorOperator> = vec![self.next.as_ref()];
        children.extend(self.args.iter().map(|a| a.as_ref() as &dyn VectorOperator));
        children
    }
}

// ============================================================================
// No-Arg Function Operator
// ============================================================================

/// Generates steps for functions keyed on the evaluation timestamp alone
///
/// `time()`, `pi()` and the no-argument date functions have no vector
/// input; this leaf derives its steps from the query range.
pub struct NoArgFunctionOperator {
    func_name: String,
    call: NoArgFunctionCall,
    current: Timestamp,
    end: Timestamp,
    step: i64,
    steps_batch: usize,
    done: bool,
    pool: Arc<VectorPool>,
    series: Arc<[Labels]>,
    telemetry: Box<dyn OperatorTelemetry>,
}

impl NoArgFunctionOperator {
    /// Create the operator; fails for unknown function names
    pub fn new(func_name: &str, opts: &Options) -> Result<Self> {
        let call = no_arg_function(func_name)
            .ok_or_else(|| EngineError::UnknownFunction(func_name.to_string()))?;
        let pool = Arc::new(VectorPool::new(1));
        Ok(Self {
            func_name: func_name.to_string(),
            call,
            current: opts.start,
            end: opts.end,
            step: opts.step_millis().max(1),
            steps_batch: opts.steps_batch,
            done: false,
            pool,
            series: vec![Labels::empty()].into(),
            telemetry: new_telemetry(opts),
        })
    }
}

#[async_trait]
impl VectorOperator for NoArgFunctionOperator {
    fn name(&self) -> &'static str {
        "NoArgFunction"
    }

    fn detail(&self) -> String {
        format!("NoArgFunction: {}", self.func_name)
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
            sv.append_sample(0, (self.call)(self.current));
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
