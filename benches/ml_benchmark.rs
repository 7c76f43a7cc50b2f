//! Criterion benchmarks for the case-type classifier
//!
//! Measures training time against data set size and single-request
//! prediction latency.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use forensic_case_manager::{
    ml::{train_model, BoostingParams, FeatureRow, InferenceService},
    seed::generate_random_cases,
};
use serde_json::Value;

fn documents(n: usize) -> Vec<Value> {
    generate_random_cases(n, &mut rand::rng())
        .iter()
        .map(|c| c.to_document())
        .collect()
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    let params = BoostingParams {
        n_estimators: 20,
        ..BoostingParams::default()
    };

    for size in [50usize, 200, 1000] {
        let docs = documents(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &docs, |b, docs| {
            b.iter(|| train_model(black_box(docs), &params))
        });
    }
    group.finish();
}

fn bench_prediction(c: &mut Criterion) {
    let artifact = match train_model(&documents(500), &BoostingParams::default()) {
        Ok(outcome) => outcome.artifact,
        Err(e) => panic!("benchmark training failed: {}", e),
    };
    let service = InferenceService::new(artifact);
    let row = FeatureRow::new(34.0, "Parda", "Centro");

    c.bench_function("predict_single", |b| {
        b.iter(|| service.predict(black_box(&row)))
    });

    c.bench_function("feature_importance", |b| {
        b.iter(|| service.feature_importance())
    });
}

criterion_group!(benches, bench_training, bench_prediction);
criterion_main!(benches);
