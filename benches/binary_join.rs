//! Benchmark for the vector-vector join hot loop

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use promvec::executor::Executor;
use promvec::labels::Labels;
use promvec::operators::{BinaryOp, VectorBinaryOperator, VectorMatching};
use promvec::query::{Options, QueryContext};
use promvec::testing::{DataOperator, TestStep};

fn make_side(num_series: usize, num_steps: usize, base: f64) -> DataOperator {
    let series: Vec<Labels> = (0..num_series)
        .map(|i| Labels::from_pairs([("pod", format!("pod-{i}")), ("job", "api".to_string())]))
        .collect();
    let steps: Vec<TestStep> = (0..num_steps)
        .map(|s| {
            TestStep::floats(
                s as i64 * 30_000,
                (0..num_series).map(|i| (i as u64, base + i as f64)).collect(),
            )
        })
        .collect();
    DataOperator::new(series, steps)
}

fn bench_one_to_one_join(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("vector_binary_join");

    for num_series in [100usize, 1_000, 10_000] {
        group.bench_with_input(
            BenchmarkId::new("one_to_one_add", num_series),
            &num_series,
            |b, &n| {
                b.to_async(&rt).iter(|| async move {
                    let opts = Options::default();
                    let mut root = VectorBinaryOperator::new(
                        Box::new(make_side(n, 10, 1.0)),
                        Box::new(make_side(n, 10, 100.0)),
                        VectorMatching::default(),
                        BinaryOp::Add,
                        false,
                        &opts,
                    );
                    let ctx = QueryContext::new();
                    Executor::new(opts).execute(&mut root, &ctx).await.unwrap()
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_one_to_one_join);
criterion_main!(benches);
