//! Integration tests for the vector-vector binary operator
//!
//! Covers the matching machinery: signature joins, set operators, grouped
//! matching with include labels, swap commutativity, and the fatal
//! matching errors.

use promvec::error::EngineError;
use promvec::executor::Executor;
use promvec::labels::Labels;
use promvec::operators::{
    BinaryOp, NumberLiteralOperator, VectorBinaryOperator, VectorMatchCardinality, VectorMatching,
};
use promvec::query::{Options, QueryContext};
use promvec::testing::{DataOperator, TestStep};

// ============================================================================
// Helpers
// ============================================================================

fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs.iter().copied())
}

async fn run(
    lhs: DataOperator,
    rhs: DataOperator,
    matching: VectorMatching,
    op: BinaryOp,
    return_bool: bool,
) -> Result<promvec::executor::QueryResult, EngineError> {
    let opts = Options::default();
    let mut root = VectorBinaryOperator::new(
        Box::new(lhs),
        Box::new(rhs),
        matching,
        op,
        return_bool,
        &opts,
    );
    let ctx = QueryContext::new();
    Executor::new(opts).execute(&mut root, &ctx).await
}

fn one_step(series: Vec<Labels>, samples: Vec<(u64, f64)>) -> DataOperator {
    DataOperator::new(series, vec![TestStep::floats(0, samples)])
}

// ============================================================================
// Arithmetic matching
// ============================================================================

#[tokio::test]
async fn test_literal_addition_over_three_steps() {
    // vector(3) + vector(4) over three steps
    let opts = Options::range(0, 2000, std::time::Duration::from_secs(1));
    let lhs = NumberLiteralOperator::new(3.0, &opts);
    let rhs = NumberLiteralOperator::new(4.0, &opts);
    let mut root = VectorBinaryOperator::new(
        Box::new(lhs),
        Box::new(rhs),
        VectorMatching::default(),
        BinaryOp::Add,
        false,
        &opts,
    );

    let ctx = QueryContext::new();
    let result = Executor::new(opts).execute(&mut root, &ctx).await.unwrap();

    assert_eq!(result.steps, 3);
    assert_eq!(result.series.len(), 1);
    assert!(result.series[0].labels.is_empty());
    let values: Vec<f64> = result.series[0].samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![7.0, 7.0, 7.0]);
}

#[tokio::test]
async fn test_one_to_one_on_matching() {
    let lhs = one_step(
        vec![labels(&[("__name__", "a"), ("x", "1")])],
        vec![(0, 2.0)],
    );
    let rhs = one_step(
        vec![labels(&[("__name__", "b"), ("x", "1")])],
        vec![(0, 10.0)],
    );
    let result = run(lhs, rhs, VectorMatching::on(&["x"]), BinaryOp::Mul, false)
        .await
        .unwrap();

    // one-to-one with on() keeps only the matching labels
    let row = result.series_with(&labels(&[("x", "1")])).unwrap();
    assert_eq!(row.samples[0].value, 20.0);
}

#[tokio::test]
async fn test_group_left_carries_include_labels() {
    // a * on(x) group_left(y) b
    let lhs = one_step(
        vec![
            labels(&[("__name__", "a"), ("x", "1")]),
            labels(&[("__name__", "a"), ("x", "1"), ("q", "z")]),
        ],
        vec![(0, 2.0), (1, 3.0)],
    );
    let rhs = one_step(
        vec![labels(&[("__name__", "b"), ("x", "1"), ("y", "Y")])],
        vec![(0, 10.0)],
    );
    let matching = VectorMatching::on(&["x"])
        .with_card(VectorMatchCardinality::ManyToOne)
        .with_include(&["y"]);
    let result = run(lhs, rhs, matching, BinaryOp::Mul, false).await.unwrap();

    assert_eq!(result.series.len(), 2);
    let first = result
        .series_with(&labels(&[("x", "1"), ("y", "Y")]))
        .unwrap();
    assert_eq!(first.samples[0].value, 20.0);
    let second = result
        .series_with(&labels(&[("q", "z"), ("x", "1"), ("y", "Y")]))
        .unwrap();
    assert_eq!(second.samples[0].value, 30.0);
}

#[tokio::test]
async fn test_group_right_mirrors_group_left() {
    // A * on(x) group_right B == B * on(x) group_left A, pointwise
    let a_series = vec![labels(&[("x", "1"), ("side", "a")])];
    let b_series = vec![
        labels(&[("x", "1"), ("i", "1")]),
        labels(&[("x", "1"), ("i", "2")]),
    ];

    let group_right = run(
        one_step(a_series.clone(), vec![(0, 10.0)]),
        one_step(b_series.clone(), vec![(0, 2.0), (1, 4.0)]),
        VectorMatching::on(&["x"]).with_card(VectorMatchCardinality::OneToMany),
        BinaryOp::Mul,
        false,
    )
    .await
    .unwrap();

    let group_left = run(
        one_step(b_series, vec![(0, 2.0), (1, 4.0)]),
        one_step(a_series, vec![(0, 10.0)]),
        VectorMatching::on(&["x"]).with_card(VectorMatchCardinality::ManyToOne),
        BinaryOp::Mul,
        false,
    )
    .await
    .unwrap();

    assert_eq!(group_right.series.len(), group_left.series.len());
    for row in &group_left.series {
        let other = group_right.series_with(&row.labels).unwrap();
        let left: Vec<f64> = row.samples.iter().map(|s| s.value).collect();
        let right: Vec<f64> = other.samples.iter().map(|s| s.value).collect();
        assert_eq!(left, right, "mismatch for {}", row.labels);
    }
}

#[tokio::test]
async fn test_group_right_preserves_operand_order() {
    // A / on(x) group_right B: the semantic dividend stays on the left
    // even though the engine designates B as the high-cardinality side
    let a_series = vec![labels(&[("x", "1"), ("side", "a")])];
    let b_series = vec![
        labels(&[("x", "1"), ("i", "1")]),
        labels(&[("x", "1"), ("i", "2")]),
    ];
    let result = run(
        one_step(a_series, vec![(0, 10.0)]),
        one_step(b_series, vec![(0, 2.0), (1, 4.0)]),
        VectorMatching::on(&["x"]).with_card(VectorMatchCardinality::OneToMany),
        BinaryOp::Div,
        false,
    )
    .await
    .unwrap();

    assert_eq!(
        result
            .series_with(&labels(&[("x", "1"), ("i", "1")]))
            .unwrap()
            .samples[0]
            .value,
        5.0
    );
    assert_eq!(
        result
            .series_with(&labels(&[("x", "1"), ("i", "2")]))
            .unwrap()
            .samples[0]
            .value,
        2.5
    );
}

#[tokio::test]
async fn test_arithmetic_drops_metric_name() {
    let lhs = one_step(
        vec![labels(&[("__name__", "a"), ("i", "1")])],
        vec![(0, 1.0)],
    );
    let rhs = one_step(
        vec![labels(&[("__name__", "b"), ("i", "1")])],
        vec![(0, 2.0)],
    );
    let result = run(lhs, rhs, VectorMatching::default(), BinaryOp::Add, false)
        .await
        .unwrap();
    assert!(result.series_with(&labels(&[("i", "1")])).is_some());
}

#[tokio::test]
async fn test_comparison_keeps_metric_name_without_bool() {
    let lhs = one_step(
        vec![labels(&[("__name__", "a"), ("i", "1")])],
        vec![(0, 5.0)],
    );
    let rhs = one_step(
        vec![labels(&[("__name__", "b"), ("i", "1")])],
        vec![(0, 2.0)],
    );
    let result = run(lhs, rhs, VectorMatching::default(), BinaryOp::Gtr, false)
        .await
        .unwrap();

    // filtering comparison: value passes through, name preserved
    let row = result
        .series_with(&labels(&[("__name__", "a"), ("i", "1")]))
        .unwrap();
    assert_eq!(row.samples[0].value, 5.0);
}

#[tokio::test]
async fn test_comparison_with_bool_returns_zero_one_and_drops_name() {
    let lhs = one_step(
        vec![
            labels(&[("__name__", "a"), ("i", "1")]),
            labels(&[("__name__", "a"), ("i", "2")]),
        ],
        vec![(0, 5.0), (1, 1.0)],
    );
    let rhs = one_step(
        vec![
            labels(&[("__name__", "b"), ("i", "1")]),
            labels(&[("__name__", "b"), ("i", "2")]),
        ],
        vec![(0, 2.0), (1, 2.0)],
    );
    let result = run(lhs, rhs, VectorMatching::default(), BinaryOp::Gtr, true)
        .await
        .unwrap();

    assert_eq!(
        result.series_with(&labels(&[("i", "1")])).unwrap().samples[0].value,
        1.0
    );
    assert_eq!(
        result.series_with(&labels(&[("i", "2")])).unwrap().samples[0].value,
        0.0
    );
}

// ============================================================================
// Set operators
// ============================================================================

fn set_matching() -> VectorMatching {
    VectorMatching {
        card: VectorMatchCardinality::ManyToMany,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_and_is_intersection_on_signature() {
    let lhs = one_step(
        vec![labels(&[("i", "1")]), labels(&[("i", "2")])],
        vec![(0, 1.0), (1, 2.0)],
    );
    let rhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 9.0)]);
    let result = run(lhs, rhs, set_matching(), BinaryOp::And, false)
        .await
        .unwrap();

    let alive: Vec<&Labels> = result
        .series
        .iter()
        .filter(|s| !s.samples.is_empty())
        .map(|s| &s.labels)
        .collect();
    assert_eq!(alive, vec![&labels(&[("i", "1")])]);
    // lhs values win
    assert_eq!(
        result.series_with(&labels(&[("i", "1")])).unwrap().samples[0].value,
        1.0
    );
}

#[tokio::test]
async fn test_unless_is_subtraction() {
    // a unless b with a{i=1}, a{i=2} and b{i=1} leaves only {i=2}
    let lhs = one_step(
        vec![labels(&[("i", "1")]), labels(&[("i", "2")])],
        vec![(0, 1.0), (1, 2.0)],
    );
    let rhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 9.0)]);
    let result = run(lhs, rhs, set_matching(), BinaryOp::Unless, false)
        .await
        .unwrap();

    let alive: Vec<&Labels> = result
        .series
        .iter()
        .filter(|s| !s.samples.is_empty())
        .map(|s| &s.labels)
        .collect();
    assert_eq!(alive.len(), 1);
    assert_eq!(alive[0], &labels(&[("i", "2")]));
    assert_eq!(
        result.series_with(&labels(&[("i", "2")])).unwrap().samples[0].value,
        2.0
    );
}

#[tokio::test]
async fn test_or_symmetry_of_output_series_set() {
    let a_series = vec![labels(&[("i", "1")]), labels(&[("i", "2")])];
    let b_series = vec![labels(&[("i", "2")]), labels(&[("i", "3")])];

    let ab = run(
        one_step(a_series.clone(), vec![(0, 1.0), (1, 2.0)]),
        one_step(b_series.clone(), vec![(0, 20.0), (1, 30.0)]),
        set_matching(),
        BinaryOp::Or,
        false,
    )
    .await
    .unwrap();
    let ba = run(
        one_step(b_series, vec![(0, 20.0), (1, 30.0)]),
        one_step(a_series, vec![(0, 1.0), (1, 2.0)]),
        set_matching(),
        BinaryOp::Or,
        false,
    )
    .await
    .unwrap();

    let mut ab_labels: Vec<String> = ab.series.iter().map(|s| s.labels.to_string()).collect();
    let mut ba_labels: Vec<String> = ba.series.iter().map(|s| s.labels.to_string()).collect();
    ab_labels.sort();
    ba_labels.sort();
    assert_eq!(ab_labels, ba_labels);

    // lhs wins where both sides carry the series
    assert_eq!(
        ab.series_with(&labels(&[("i", "2")])).unwrap().samples[0].value,
        2.0
    );
    assert_eq!(
        ba.series_with(&labels(&[("i", "2")])).unwrap().samples[0].value,
        20.0
    );
}

// ============================================================================
// Matching errors
// ============================================================================

#[tokio::test]
async fn test_many_to_many_on_low_card_side_fails() {
    let lhs = one_step(vec![labels(&[("x", "1"), ("i", "1")])], vec![(0, 1.0)]);
    let rhs = one_step(
        vec![
            labels(&[("x", "1"), ("j", "1")]),
            labels(&[("x", "1"), ("j", "2")]),
        ],
        vec![(0, 1.0), (1, 2.0)],
    );
    let err = run(lhs, rhs, VectorMatching::on(&["x"]), BinaryOp::Add, false)
        .await
        .unwrap_err();
    match err {
        EngineError::ManyToManyMatch { .. } => {
            assert!(err.to_string().contains("many-to-many matching not allowed"));
        }
        other => panic!("expected ManyToManyMatch, got {other}"),
    }
}

#[tokio::test]
async fn test_implicit_many_to_one_fails() {
    let lhs = one_step(
        vec![
            labels(&[("x", "1"), ("i", "1")]),
            labels(&[("x", "1"), ("i", "2")]),
        ],
        vec![(0, 1.0), (1, 2.0)],
    );
    let rhs = one_step(vec![labels(&[("x", "1")])], vec![(0, 10.0)]);
    let err = run(lhs, rhs, VectorMatching::on(&["x"]), BinaryOp::Add, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ImplicitManyToOne));
}

#[tokio::test]
async fn test_explicit_group_left_allows_many_to_one() {
    let lhs = one_step(
        vec![
            labels(&[("x", "1"), ("i", "1")]),
            labels(&[("x", "1"), ("i", "2")]),
        ],
        vec![(0, 1.0), (1, 2.0)],
    );
    let rhs = one_step(vec![labels(&[("x", "1")])], vec![(0, 10.0)]);
    let matching = VectorMatching::on(&["x"]).with_card(VectorMatchCardinality::ManyToOne);
    let result = run(lhs, rhs, matching, BinaryOp::Add, false).await.unwrap();
    assert_eq!(result.series.len(), 2);
}

// ============================================================================
// Pool discipline and cancellation
// ============================================================================

#[tokio::test]
async fn test_join_returns_all_vectors_to_pools() {
    use promvec::model::VectorOperator;

    let lhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 1.0)]);
    let rhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 2.0)]);
    let lhs_pool = lhs.pool();
    let rhs_pool = rhs.pool();

    let opts = Options::default();
    let mut root = VectorBinaryOperator::new(
        Box::new(lhs),
        Box::new(rhs),
        VectorMatching::default(),
        BinaryOp::Add,
        false,
        &opts,
    );
    let root_pool = root.pool();

    let ctx = QueryContext::new();
    Executor::new(opts).execute(&mut root, &ctx).await.unwrap();

    assert_eq!(lhs_pool.outstanding(), 0);
    assert_eq!(rhs_pool.outstanding(), 0);
    assert_eq!(root_pool.outstanding(), 0);
}

#[test]
fn test_explain_lists_both_children() {
    let lhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 1.0)]);
    let rhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 2.0)]);
    let opts = Options::default();
    let root = VectorBinaryOperator::new(
        Box::new(lhs),
        Box::new(rhs),
        VectorMatching::default(),
        BinaryOp::Add,
        false,
        &opts,
    );
    let tree = promvec::model::explain_tree(&root);
    assert!(tree.contains("VectorBinary"));
    assert_eq!(tree.matches("TestData").count(), 2);
}

#[tokio::test]
async fn test_cancellation_propagates() {
    use promvec::model::VectorOperator;

    let lhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 1.0)]);
    let rhs = one_step(vec![labels(&[("i", "1")])], vec![(0, 2.0)]);
    let opts = Options::default();
    let mut root = VectorBinaryOperator::new(
        Box::new(lhs),
        Box::new(rhs),
        VectorMatching::default(),
        BinaryOp::Add,
        false,
        &opts,
    );

    let ctx = QueryContext::new();
    ctx.cancel();
    let err = root.next(&ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
}
