use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use driftguard::prelude::*;
use polars::prelude::*;
use rand::prelude::*;

fn create_scored_data(n_rows: usize) -> DataFrame {
    let mut rng = rand::thread_rng();

    let proba: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>()).collect();
    let y_pred: Vec<i64> = proba.iter().map(|p| (*p >= 0.5) as i64).collect();
    let y_true: Vec<i64> = proba.iter().map(|p| rng.gen_bool(*p) as i64).collect();
    let feature: Vec<f64> = (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect();
    let category: Vec<&str> = (0..n_rows).map(|i| ["a", "b", "c", "d"][i % 4]).collect();

    df!(
        "y_true" => y_true,
        "y_pred" => y_pred,
        "proba" => proba,
        "feature" => feature,
        "category" => category
    )
    .unwrap()
}

fn size_chunker() -> ChunkerConfig {
    ChunkerConfig::Size {
        chunk_size: 1000,
        incomplete: IncompleteChunk::Keep,
    }
}

fn bench_chunking(c: &mut Criterion) {
    let mut group = c.benchmark_group("chunking");

    for n_rows in [10_000, 100_000].iter() {
        let df = create_scored_data(*n_rows);
        let chunker = size_chunker().build().unwrap();

        group.bench_with_input(BenchmarkId::new("size", n_rows), &df, |b, df| {
            b.iter(|| chunker.split(black_box(df), None, None, 0).unwrap())
        });
    }

    group.finish();
}

fn bench_cbpe(c: &mut Criterion) {
    let mut group = c.benchmark_group("cbpe");
    group.sample_size(10);

    let reference = create_scored_data(20_000);
    let config = CbpeConfig::new(
        ClassificationColumns::binary("y_true", "y_pred", "proba"),
        vec![MetricKind::RocAuc, MetricKind::F1, MetricKind::Accuracy],
    )
    .with_chunker(size_chunker());

    group.bench_function("fit", |b| {
        b.iter(|| {
            let mut estimator = Cbpe::new(config.clone()).unwrap();
            estimator.fit(black_box(&reference)).unwrap()
        })
    });

    let mut estimator = Cbpe::new(config.clone()).unwrap();
    estimator.fit(&reference).unwrap();

    for n_rows in [5_000, 50_000].iter() {
        let analysis = create_scored_data(*n_rows);
        group.bench_with_input(BenchmarkId::new("estimate", n_rows), &analysis, |b, df| {
            b.iter(|| estimator.estimate(black_box(df)).unwrap())
        });
    }

    group.finish();
}

fn bench_drift(c: &mut Criterion) {
    let mut group = c.benchmark_group("univariate_drift");
    group.sample_size(10);

    let reference = create_scored_data(20_000);
    let analysis = create_scored_data(20_000);
    let config = UnivariateDriftConfig::new(["feature", "category"])
        .with_chunker(size_chunker())
        .with_continuous_methods(["jensen_shannon", "kolmogorov_smirnov"])
        .with_categorical_methods(["jensen_shannon", "chi2"]);

    let mut calc = UnivariateDriftCalculator::new(config).unwrap();
    calc.fit(&reference).unwrap();

    group.bench_function("calculate", |b| b.iter(|| calc.calculate(black_box(&analysis)).unwrap()));

    group.finish();
}

criterion_group!(benches, bench_chunking, bench_cbpe, bench_drift);
criterion_main!(benches);
