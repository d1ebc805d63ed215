//! Integration tests for the vector-scalar binary operator

use promvec::executor::Executor;
use promvec::histogram::FloatHistogram;
use promvec::labels::Labels;
use promvec::operators::{
    BinaryOp, NumberLiteralOperator, ScalarSide, VectorScalarBinaryOperator,
};
use promvec::query::{Options, QueryContext};
use promvec::testing::{DataOperator, TestStep};
use promvec::warnings::Annotation;

fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs.iter().copied())
}

fn up_metric() -> DataOperator {
    DataOperator::new(
        vec![
            labels(&[("__name__", "up"), ("i", "1")]),
            labels(&[("__name__", "up"), ("i", "2")]),
        ],
        vec![TestStep::floats(0, vec![(0, 1.0), (1, 0.0)])],
    )
}

async fn run(
    vector: DataOperator,
    scalar_value: f64,
    op: BinaryOp,
    side: ScalarSide,
    return_bool: bool,
) -> promvec::executor::QueryResult {
    let opts = Options::default();
    let scalar = NumberLiteralOperator::new(scalar_value, &opts);
    let mut root = VectorScalarBinaryOperator::new(
        Box::new(vector),
        Box::new(scalar),
        op,
        side,
        return_bool,
        &opts,
    );
    let ctx = QueryContext::new();
    Executor::new(opts).execute(&mut root, &ctx).await.unwrap()
}

#[tokio::test]
async fn test_vector_times_scalar() {
    let data = DataOperator::new(
        vec![labels(&[("__name__", "m"), ("i", "1")])],
        vec![
            TestStep::floats(0, vec![(0, 2.0)]),
            TestStep::floats(1000, vec![(0, 3.0)]),
        ],
    );
    let result = run(data, 10.0, BinaryOp::Mul, ScalarSide::Right, false).await;

    // arithmetic drops the metric name
    let row = result.series_with(&labels(&[("i", "1")])).unwrap();
    let values: Vec<f64> = row.samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![20.0, 30.0]);
}

#[tokio::test]
async fn test_scalar_on_left_of_subtraction() {
    let data = DataOperator::new(
        vec![labels(&[("i", "1")])],
        vec![TestStep::floats(0, vec![(0, 3.0)])],
    );
    // 10 - vector
    let result = run(data, 10.0, BinaryOp::Sub, ScalarSide::Left, false).await;
    assert_eq!(result.series[0].samples[0].value, 7.0);
}

#[tokio::test]
async fn test_up_equals_bool_one() {
    // up == bool 1 emits 1 for up{i="1"} and 0 for up{i="2"}, names dropped
    let result = run(up_metric(), 1.0, BinaryOp::Eql, ScalarSide::Right, true).await;

    assert_eq!(
        result.series_with(&labels(&[("i", "1")])).unwrap().samples[0].value,
        1.0
    );
    assert_eq!(
        result.series_with(&labels(&[("i", "2")])).unwrap().samples[0].value,
        0.0
    );
}

#[tokio::test]
async fn test_comparison_without_bool_filters() {
    // up > 0 keeps only up{i="1"}, metric name preserved
    let result = run(up_metric(), 0.0, BinaryOp::Gtr, ScalarSide::Right, false).await;

    let kept = result
        .series_with(&labels(&[("__name__", "up"), ("i", "1")]))
        .unwrap();
    assert_eq!(kept.samples.len(), 1);
    assert_eq!(kept.samples[0].value, 1.0);
    let filtered = result
        .series_with(&labels(&[("__name__", "up"), ("i", "2")]))
        .unwrap();
    assert!(filtered.samples.is_empty());
}

#[tokio::test]
async fn test_histogram_scaled_by_scalar() {
    let h = FloatHistogram::exponential(0)
        .with_sum(4.0)
        .with_count(2.0)
        .with_positive_buckets(vec![(1, 2.0)]);
    let data = DataOperator::new(
        vec![labels(&[("i", "1")])],
        vec![TestStep {
            t: 0,
            samples: vec![],
            histograms: vec![(0, h)],
        }],
    );
    let result = run(data, 3.0, BinaryOp::Mul, ScalarSide::Right, false).await;

    let (_, scaled) = &result.series[0].histograms[0];
    assert_eq!(scaled.sum, 12.0);
    assert_eq!(scaled.count, 6.0);
}

#[tokio::test]
async fn test_scalar_plus_histogram_is_dropped_with_annotation() {
    let h = FloatHistogram::exponential(0).with_sum(4.0).with_count(2.0);
    let data = DataOperator::new(
        vec![labels(&[("i", "1")])],
        vec![TestStep {
            t: 0,
            samples: vec![],
            histograms: vec![(0, h)],
        }],
    );
    let result = run(data, 3.0, BinaryOp::Add, ScalarSide::Right, false).await;

    assert!(result.series[0].histograms.is_empty());
    assert!(matches!(
        result.warnings[0],
        Annotation::IncompatibleTypesInBinOp { .. }
    ));
}

#[tokio::test]
async fn test_missing_scalar_step_yields_nan() {
    // scalar child ends immediately: operand is NaN, sum is NaN
    let data = DataOperator::new(
        vec![labels(&[("i", "1")])],
        vec![TestStep::floats(0, vec![(0, 1.0)])],
    );
    let opts = Options::default();
    let scalar = DataOperator::empty();
    let mut root = VectorScalarBinaryOperator::new(
        Box::new(data),
        Box::new(scalar),
        BinaryOp::Add,
        ScalarSide::Right,
        false,
        &opts,
    );
    let ctx = QueryContext::new();
    let result = Executor::new(opts).execute(&mut root, &ctx).await.unwrap();
    assert!(result.series[0].samples[0].value.is_nan());
}
