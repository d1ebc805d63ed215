//! Integration tests for the duplicate label-set check

use promvec::error::EngineError;
use promvec::executor::Executor;
use promvec::labels::Labels;
use promvec::operators::DuplicateLabelCheckOperator;
use promvec::query::{Options, QueryContext};
use promvec::testing::{DataOperator, TestStep};

fn labels(pairs: &[(&str, &str)]) -> Labels {
    Labels::from_pairs(pairs.iter().copied())
}

async fn run(data: DataOperator) -> Result<promvec::executor::QueryResult, EngineError> {
    let opts = Options::default();
    let mut root = DuplicateLabelCheckOperator::new(Box::new(data), &opts);
    let ctx = QueryContext::new();
    Executor::new(opts).execute(&mut root, &ctx).await
}

#[tokio::test]
async fn test_both_series_alive_at_same_step_fails() {
    // two series with the same label set sampled at one timestamp
    let data = DataOperator::new(
        vec![labels(&[("a", "1")]), labels(&[("a", "1")])],
        vec![TestStep::floats(0, vec![(0, 10.0), (1, 20.0)])],
    );
    let err = run(data).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateLabelSet));
}

#[tokio::test]
async fn test_one_alive_per_step_passes() {
    // the same duplicate pair, but never live at the same timestamp
    let data = DataOperator::new(
        vec![labels(&[("a", "1")]), labels(&[("a", "1")])],
        vec![
            TestStep::floats(0, vec![(0, 10.0)]),
            TestStep::floats(1000, vec![(1, 20.0)]),
            TestStep::floats(2000, vec![(0, 30.0)]),
        ],
    );
    let result = run(data).await.unwrap();
    assert_eq!(result.steps, 3);
}

#[tokio::test]
async fn test_alternating_across_batch_boundary_passes() {
    // one step per batch: the mask must reset per timestamp, so state from
    // a previous batch cannot combine with the current one
    let steps: Vec<TestStep> = (0..8)
        .map(|i| TestStep::floats(i * 1000, vec![((i % 2) as u64, i as f64)]))
        .collect();
    let data = DataOperator::with_options(
        vec![labels(&[("a", "1")]), labels(&[("a", "1")])],
        steps,
        &Options::default().with_steps_batch(1),
    );
    let result = run(data).await.unwrap();
    assert_eq!(result.steps, 8);
}

#[tokio::test]
async fn test_distinct_series_never_fail() {
    let data = DataOperator::new(
        vec![labels(&[("a", "1")]), labels(&[("a", "2")])],
        vec![TestStep::floats(0, vec![(0, 10.0), (1, 20.0)])],
    );
    let result = run(data).await.unwrap();
    assert_eq!(result.series.len(), 2);
}

#[tokio::test]
async fn test_duplicate_detected_in_later_step() {
    let data = DataOperator::new(
        vec![labels(&[("a", "1")]), labels(&[("a", "1")])],
        vec![
            TestStep::floats(0, vec![(0, 1.0)]),
            TestStep::floats(1000, vec![(0, 2.0), (1, 3.0)]),
        ],
    );
    let err = run(data).await.unwrap_err();
    assert!(matches!(err, EngineError::DuplicateLabelSet));
}

#[tokio::test]
async fn test_forwards_batches_unchanged() {
    let data = DataOperator::new(
        vec![labels(&[("a", "1")]), labels(&[("b", "2")])],
        vec![
            TestStep::floats(0, vec![(0, 1.0), (1, 2.0)]),
            TestStep::floats(1000, vec![(0, 3.0)]),
        ],
    );
    let result = run(data).await.unwrap();
    let first = result.series_with(&labels(&[("a", "1")])).unwrap();
    assert_eq!(first.samples.len(), 2);
    let second = result.series_with(&labels(&[("b", "2")])).unwrap();
    assert_eq!(second.samples.len(), 1);
}
