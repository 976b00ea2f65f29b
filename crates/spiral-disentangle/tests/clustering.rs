// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};
use spiral_disentangle::{
    unsupervised_clustering_scores, ClusteringScores, MetricsError, PredictionAlgorithm,
};

/// Three tight blobs in 3-D with one-hot factor labels.
fn blobs(seed: u64, per_blob: usize) -> (Array2<f64>, Array2<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.25).unwrap();
    let centers = [[0.0, 0.0, 0.0], [8.0, 0.0, 0.0], [0.0, 8.0, 8.0]];
    let n = 3 * per_blob;
    let reps = Array2::from_shape_fn((n, 3), |(i, j)| centers[i % 3][j] + noise.sample(&mut rng));
    let factors = Array2::from_shape_fn((n, 3), |(i, j)| if i % 3 == j { 1.0 } else { 0.0 });
    (reps, factors)
}

fn assert_near_perfect(scores: &ClusteringScores) {
    assert!(scores.ari > 0.99, "{scores:?}");
    assert!(scores.nmi > 0.99, "{scores:?}");
    assert!(scores.uca > 0.99, "{scores:?}");
    assert!(scores.asw > 0.8, "{scores:?}");
}

#[test]
fn kmeans_recovers_separable_blobs() {
    let (reps, factors) = blobs(1, 40);
    let scores =
        unsupervised_clustering_scores(&reps, &factors, PredictionAlgorithm::KMeans, 1).unwrap();
    assert_near_perfect(&scores);
}

#[test]
fn gaussian_mixture_recovers_separable_blobs() {
    let (reps, factors) = blobs(2, 40);
    let scores = unsupervised_clustering_scores(
        &reps,
        &factors,
        PredictionAlgorithm::GaussianMixture,
        1,
    )
    .unwrap();
    assert_near_perfect(&scores);
}

#[test]
fn both_averages_the_two_algorithms() {
    let (reps, factors) = blobs(3, 30);
    let km = unsupervised_clustering_scores(&reps, &factors, PredictionAlgorithm::KMeans, 5)
        .unwrap();
    let gmm = unsupervised_clustering_scores(
        &reps,
        &factors,
        PredictionAlgorithm::GaussianMixture,
        5,
    )
    .unwrap();
    let both =
        unsupervised_clustering_scores(&reps, &factors, PredictionAlgorithm::Both, 5).unwrap();
    assert!((both.ari - (km.ari + gmm.ari) / 2.0).abs() < 1e-12);
    assert!((both.asw - (km.asw + gmm.asw) / 2.0).abs() < 1e-12);
}

#[test]
fn scores_serialise_to_json() {
    let (reps, factors) = blobs(4, 10);
    let scores =
        unsupervised_clustering_scores(&reps, &factors, PredictionAlgorithm::KMeans, 0).unwrap();
    let json = serde_json::to_string(&scores).unwrap();
    let back: ClusteringScores = serde_json::from_str(&json).unwrap();
    assert_abs_diff_eq!(back.asw, scores.asw, epsilon = 1e-12);
    assert_abs_diff_eq!(back.ari, scores.ari, epsilon = 1e-12);
    assert_abs_diff_eq!(back.nmi, scores.nmi, epsilon = 1e-12);
    assert_abs_diff_eq!(back.uca, scores.uca, epsilon = 1e-12);
}

#[test]
fn unknown_algorithm_names_are_rejected() {
    let err = "spectral".parse::<PredictionAlgorithm>().unwrap_err();
    match err {
        MetricsError::UnsupportedAlgorithm { name, .. } => assert_eq!(name, "spectral"),
        other => panic!("unexpected {other:?}"),
    }
}
