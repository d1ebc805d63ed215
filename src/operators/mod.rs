//! Physical operators of the execution engine
//!
//! Operators form a tree; each pulls step-vector batches from its children
//! and produces its own. Leaves (literals, no-arg functions, storage
//! selectors) derive their steps from the query range.

pub mod absent;
pub mod binary;
pub mod duplicate_label;
pub mod function;
pub mod literal;
pub mod scalar;

pub use absent::AbsentOperator;
pub use binary::{
    should_drop_metric_name, vector_elem_binop, BinaryOp, ScalarSide, VectorBinaryOperator,
    VectorMatchCardinality, VectorMatching, VectorScalarBinaryOperator,
};
pub use duplicate_label::DuplicateLabelCheckOperator;
pub use function::{FunctionOperator, NoArgFunctionOperator};
pub use literal::NumberLiteralOperator;
pub use scalar::ScalarFunctionOperator;
