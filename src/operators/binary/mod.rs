//! Binary operations: operator types, vector matching, and the scalar kernel
//!
//! The metric-name drop policy lives here so it is applied identically when
//! operators build their output series and when the vector join computes
//! result metrics.

pub mod scalar;
pub mod vector;

pub use scalar::{ScalarSide, VectorScalarBinaryOperator};
pub use vector::VectorBinaryOperator;

use crate::histogram::FloatHistogram;
use crate::warnings::Annotation;

/// A PromQL binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `^`
    Pow,
    /// `%`
    Mod,
    /// `==`
    Eql,
    /// `!=`
    Neq,
    /// `>`
    Gtr,
    /// `<`
    Lss,
    /// `>=`
    Gte,
    /// `<=`
    Lte,
    /// `atan2`
    Atan2,
    /// `and`
    And,
    /// `or`
    Or,
    /// `unless`
    Unless,
}

impl BinaryOp {
    /// The operator as written in a query
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Mod => "%",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Gtr => ">",
            BinaryOp::Lss => "<",
            BinaryOp::Gte => ">=",
            BinaryOp::Lte => "<=",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Unless => "unless",
        }
    }

    /// True for `==`, `!=`, `>`, `<`, `>=`, `<=`
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eql
                | BinaryOp::Neq
                | BinaryOp::Gtr
                | BinaryOp::Lss
                | BinaryOp::Gte
                | BinaryOp::Lte
        )
    }

    /// True for the logical set operators `and`, `or`, `unless`
    pub fn is_set_operator(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Unless)
    }
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join cardinality between the two sides of a vector binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorMatchCardinality {
    /// Both sides contribute at most one series per signature
    OneToOne,
    /// `group_left`: the left side may have several series per signature
    ManyToOne,
    /// `group_right`: the right side may have several series per signature
    OneToMany,
    /// Set operators: no uniqueness requirement on either side
    ManyToMany,
}

impl std::fmt::Display for VectorMatchCardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorMatchCardinality::OneToOne => write!(f, "one-to-one"),
            VectorMatchCardinality::ManyToOne => write!(f, "many-to-one"),
            VectorMatchCardinality::OneToMany => write!(f, "one-to-many"),
            VectorMatchCardinality::ManyToMany => write!(f, "many-to-many"),
        }
    }
}

/// How the two sides of a vector binary operation are matched
#[derive(Debug, Clone)]
pub struct VectorMatching {
    /// Join cardinality
    pub card: VectorMatchCardinality,
    /// Labels the join key is built from (`on`) or built without (`ignoring`)
    pub matching_labels: Vec<String>,
    /// True for `on(...)`, false for `ignoring(...)`
    pub on: bool,
    /// Labels copied over from the low-cardinality side (`group_left`/`group_right`)
    pub include: Vec<String>,
}

impl Default for VectorMatching {
    fn default() -> Self {
        Self {
            card: VectorMatchCardinality::OneToOne,
            matching_labels: Vec::new(),
            on: false,
            include: Vec::new(),
        }
    }
}

impl VectorMatching {
    /// One-to-one matching on the given labels
    pub fn on(labels: &[&str]) -> Self {
        Self {
            on: true,
            matching_labels: labels.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// One-to-one matching ignoring the given labels
    pub fn ignoring(labels: &[&str]) -> Self {
        Self {
            on: false,
            matching_labels: labels.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    /// Set the cardinality
    pub fn with_card(mut self, card: VectorMatchCardinality) -> Self {
        self.card = card;
        self
    }

    /// Set the include labels (`group_left(...)`/`group_right(...)`)
    pub fn with_include(mut self, labels: &[&str]) -> Self {
        self.include = labels.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// Whether the output of a binary operation strips `__name__`
///
/// Every arithmetic operation drops the metric name; comparisons keep it
/// only in filtering mode (no `bool` modifier). Centralized so series
/// construction and per-step result metrics always agree.
pub fn should_drop_metric_name(op: BinaryOp, return_bool: bool) -> bool {
    if op.is_set_operator() {
        return false;
    }
    if op.is_comparison() {
        return return_bool;
    }
    true
}

/// Outcome of one element-wise binary pairing
pub struct BinopResult {
    /// Float result; meaningful when `histogram` is `None` and `keep` is set
    pub value: f64,
    /// Histogram result for histogram-valued pairings
    pub histogram: Option<FloatHistogram>,
    /// False when the sample is filtered out
    pub keep: bool,
    /// Non-fatal annotation to surface on the warnings sink
    pub warning: Option<Annotation>,
}

impl BinopResult {
    fn float(value: f64, keep: bool) -> Self {
        Self {
            value,
            histogram: None,
            keep,
            warning: None,
        }
    }

    fn hist(histogram: FloatHistogram) -> Self {
        Self {
            value: 0.0,
            histogram: Some(histogram),
            keep: true,
            warning: None,
        }
    }

    fn dropped(warning: Annotation) -> Self {
        Self {
            value: 0.0,
            histogram: None,
            keep: false,
            warning: Some(warning),
        }
    }
}

/// Evaluate a binary operation between two vector elements
///
/// The float/histogram combination decides the semantics: plain IEEE float
/// arithmetic, scalar scaling of a histogram, or histogram-histogram
/// arithmetic. Combinations outside the supported matrix yield a dropped
/// sample with an incompatible-types annotation. Set operators never reach
/// this kernel.
pub fn vector_elem_binop(
    op: BinaryOp,
    lhs: f64,
    rhs: f64,
    hlhs: Option<&FloatHistogram>,
    hrhs: Option<&FloatHistogram>,
) -> BinopResult {
    let op_name = op.as_str();
    match (hlhs, hrhs) {
        (None, None) => match op {
            BinaryOp::Add => BinopResult::float(lhs + rhs, true),
            BinaryOp::Sub => BinopResult::float(lhs - rhs, true),
            BinaryOp::Mul => BinopResult::float(lhs * rhs, true),
            BinaryOp::Div => BinopResult::float(lhs / rhs, true),
            BinaryOp::Pow => BinopResult::float(lhs.powf(rhs), true),
            BinaryOp::Mod => BinopResult::float(fmod(lhs, rhs), true),
            BinaryOp::Eql => BinopResult::float(lhs, lhs == rhs),
            BinaryOp::Neq => BinopResult::float(lhs, lhs != rhs),
            BinaryOp::Gtr => BinopResult::float(lhs, lhs > rhs),
            BinaryOp::Lss => BinopResult::float(lhs, lhs < rhs),
            BinaryOp::Gte => BinopResult::float(lhs, lhs >= rhs),
            BinaryOp::Lte => BinopResult::float(lhs, lhs <= rhs),
            BinaryOp::Atan2 => BinopResult::float(lhs.atan2(rhs), true),
            _ => unreachable!("operator {op_name:?} not allowed between vector elements"),
        },
        (None, Some(hr)) => match op {
            BinaryOp::Mul => BinopResult::hist(hr.clone().mul(lhs).compact(0.0)),
            _ => BinopResult::dropped(Annotation::IncompatibleTypesInBinOp {
                left: "float",
                op: op_name,
                right: "histogram",
            }),
        },
        (Some(hl), None) => match op {
            BinaryOp::Mul => BinopResult::hist(hl.clone().mul(rhs).compact(0.0)),
            BinaryOp::Div => BinopResult::hist(hl.clone().div(rhs).compact(0.0)),
            _ => BinopResult::dropped(Annotation::IncompatibleTypesInBinOp {
                left: "histogram",
                op: op_name,
                right: "float",
            }),
        },
        (Some(hl), Some(hr)) => match op {
            BinaryOp::Add => match hl.clone().add(hr) {
                Ok(sum) => BinopResult::hist(sum.compact(0.0)),
                Err(err) => BinopResult::dropped(err.into()),
            },
            BinaryOp::Sub => match hl.clone().sub(hr) {
                Ok(diff) => BinopResult::hist(diff.compact(0.0)),
                Err(err) => BinopResult::dropped(err.into()),
            },
            // Equality expects both operands already compacted.
            BinaryOp::Eql => BinopResult {
                value: 0.0,
                histogram: Some(hl.clone()),
                keep: hl.equals(hr),
                warning: None,
            },
            BinaryOp::Neq => BinopResult {
                value: 0.0,
                histogram: Some(hl.clone()),
                keep: !hl.equals(hr),
                warning: None,
            },
            _ => BinopResult::dropped(Annotation::IncompatibleTypesInBinOp {
                left: "histogram",
                op: op_name,
                right: "histogram",
            }),
        },
    }
}

/// Floating-point remainder with the sign of the dividend
fn fmod(a: f64, b: f64) -> f64 {
    a % b
}
