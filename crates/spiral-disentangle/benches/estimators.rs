use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use spiral_disentangle::{
    mutual_info_estimate, representative_importance_matrix, ClassifierKind, MutualInfoOptions,
};

fn synthetic(samples: usize, codes: usize, factors: usize) -> (Array2<f64>, Array2<i64>) {
    let mut rng = StdRng::seed_from_u64(7);
    let labels = Array2::from_shape_fn((samples, factors), |_| rng.gen_range(0..4i64));
    let reps = Array2::from_shape_fn((samples, codes), |(i, j)| {
        if j < factors {
            labels[[i, j]] as f64 + rng.gen_range(-0.3..0.3)
        } else {
            rng.gen_range(-2.0..2.0)
        }
    });
    (reps, labels)
}

fn bench_knn_mutual_info(c: &mut Criterion) {
    let mut group = c.benchmark_group("knn_mutual_info");
    for &samples in &[250usize, 500, 1000] {
        let (reps, labels) = synthetic(samples, 6, 3);
        let factors = labels.mapv(|v| v as f64);
        let options = MutualInfoOptions {
            seed: 1,
            ..MutualInfoOptions::default()
        };
        group.bench_with_input(BenchmarkId::from_parameter(samples), &samples, |b, _| {
            b.iter(|| {
                let mi = mutual_info_estimate(black_box(&reps), black_box(&factors), &options);
                black_box(mi.ok());
            });
        });
    }
    group.finish();
}

fn bench_importance_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("importance_matrix");
    group.sample_size(10);
    let (reps, labels) = synthetic(400, 5, 2);
    let (train_reps, test_reps) = reps.view().split_at(ndarray::Axis(0), 300);
    let (train_labels, test_labels) = labels.view().split_at(ndarray::Axis(0), 300);
    let (train_reps, test_reps) = (train_reps.to_owned(), test_reps.to_owned());
    let (train_labels, test_labels) = (train_labels.to_owned(), test_labels.to_owned());
    for kind in [
        ClassifierKind::GradientBoosting,
        ClassifierKind::RandomForest,
        ClassifierKind::Logistic,
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(kind.as_str()), &kind, |b, &kind| {
            b.iter(|| {
                let matrix = representative_importance_matrix(
                    black_box(&train_reps),
                    black_box(&train_labels),
                    black_box(&test_reps),
                    black_box(&test_labels),
                    3,
                    kind,
                );
                black_box(matrix.ok());
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_knn_mutual_info, bench_importance_matrix);
criterion_main!(benches);
