//! Execution model: step vectors, pools, and the operator protocol

pub mod operator;
pub mod pool;
pub mod step_vector;

pub use operator::{explain_tree, VectorOperator};
pub use pool::VectorPool;
pub use step_vector::StepVector;
