// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use approx::assert_abs_diff_eq;
use ndarray::{array, s, Array2};
use rand::{rngs::StdRng, Rng, SeedableRng};
use spiral_disentangle::{
    completeness_score, dci_scores, discrete_entropy, discrete_mutual_info, discretize,
    disentanglement_score, mutual_info_estimate, mutual_info_gap, relative_strength,
    DciScores, MetricsError, MutualInfoOptions,
};

fn random_labels(seed: u64, rows: usize, cols: usize, classes: i64) -> Array2<i64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_fn((rows, cols), |_| rng.gen_range(0..classes))
}

#[test]
fn identical_columns_carry_the_factor_entropy() {
    let factors = random_labels(1, 120, 3, 4);
    let mut codes = random_labels(2, 120, 4, 3);
    codes.column_mut(2).assign(&factors.column(1));

    let mi = discrete_mutual_info(&codes, &factors).unwrap();
    let h = discrete_entropy(&factors);
    assert_eq!(mi.dim(), (4, 3));
    assert_abs_diff_eq!(mi[[2, 1]], h[1], epsilon = 1e-12);
}

#[test]
fn concrete_two_by_two_scenario_is_ln_two() {
    let codes = array![[0], [0], [1], [1]];
    let mi = discrete_mutual_info(&codes, &codes).unwrap();
    let h = discrete_entropy(&codes);
    assert_abs_diff_eq!(mi[[0, 0]], 2f64.ln(), epsilon = 1e-12);
    assert_abs_diff_eq!(h[0], 2f64.ln(), epsilon = 1e-12);
}

#[test]
fn constant_column_entropy_is_exactly_zero() {
    let labels = Array2::<i64>::from_elem((50, 2), 9);
    assert!(discrete_entropy(&labels).iter().all(|&h| h == 0.0));
}

#[test]
fn mig_ignores_code_order_but_not_factor_identity() {
    let factors = random_labels(3, 200, 2, 3);
    let mut rng = StdRng::seed_from_u64(4);
    let codes = Array2::from_shape_fn((200, 4), |(i, j)| match j {
        0 => factors[[i, 0]],
        1 => {
            if rng.gen_bool(0.8) {
                factors[[i, 1]]
            } else {
                rng.gen_range(0..3)
            }
        }
        _ => rng.gen_range(0..3),
    });
    let permuted = codes.slice(s![.., ..;-1]).to_owned();
    let mig = mutual_info_gap(&codes, &factors).unwrap();
    assert_abs_diff_eq!(mig, mutual_info_gap(&permuted, &factors).unwrap(), epsilon = 1e-12);

    // Squashing the second factor's values changes its entropy and the gap.
    let mut coarse = factors.clone();
    coarse.column_mut(1).mapv_inplace(|v| v.min(1));
    assert!((mig - mutual_info_gap(&codes, &coarse).unwrap()).abs() > 1e-6);
}

#[test]
fn dci_extremes_follow_the_importance_structure() {
    let diagonal = Array2::<f64>::eye(5);
    assert_abs_diff_eq!(disentanglement_score(&diagonal).unwrap(), 1.0, epsilon = 1e-6);
    assert_abs_diff_eq!(completeness_score(&diagonal).unwrap(), 1.0, epsilon = 1e-6);

    let uniform = Array2::<f64>::from_elem((5, 5), 1.0);
    assert_abs_diff_eq!(disentanglement_score(&uniform).unwrap(), 0.0, epsilon = 1e-9);
    assert_abs_diff_eq!(completeness_score(&uniform).unwrap(), 0.0, epsilon = 1e-9);
}

#[test]
fn dci_on_axis_aligned_codes_is_high() {
    let mut rng = StdRng::seed_from_u64(8);
    let make = |rng: &mut StdRng, n: usize| {
        let factors = Array2::from_shape_fn((n, 2), |_| rng.gen_range(0..4i64));
        let reps = Array2::from_shape_fn((n, 2), |(i, j)| {
            factors[[i, j]] as f64 + rng.gen_range(-0.2..0.2)
        });
        (reps, factors)
    };
    let (r_train, f_train) = make(&mut rng, 200);
    let (r_test, f_test) = make(&mut rng, 80);
    let DciScores {
        disentanglement,
        completeness,
        informativeness,
        ..
    } = dci_scores(&r_train, &f_train, &r_test, &f_test, 0).unwrap();
    assert!(disentanglement > 0.9, "d = {disentanglement}");
    assert!(completeness > 0.9, "c = {completeness}");
    assert!(informativeness > 0.95, "i = {informativeness}");
}

#[test]
fn identity_correlation_has_unit_strength() {
    for n in [1, 2, 7] {
        assert_abs_diff_eq!(
            relative_strength(&Array2::<f64>::eye(n)).unwrap(),
            1.0,
            epsilon = 1e-12
        );
    }
}

#[test]
fn knn_estimate_prefers_the_generating_code() {
    let mut rng = StdRng::seed_from_u64(12);
    let n = 300;
    let factors = Array2::from_shape_fn((n, 1), |_| rng.gen_range(0..3) as f64);
    let reps = Array2::from_shape_fn((n, 2), |(i, j)| {
        if j == 0 {
            factors[[i, 0]] + rng.gen_range(-0.3..0.3)
        } else {
            rng.gen_range(-1.0..1.0)
        }
    });
    let mi = mutual_info_estimate(&reps, &factors, &MutualInfoOptions::default()).unwrap();
    assert!(mi[[0, 0]] > 0.8, "mi {mi:?}");
    assert!(mi[[1, 0]] < 0.1, "mi {mi:?}");
    assert!(mi.iter().all(|&v| v >= 0.0));
}

#[test]
fn failing_factor_is_reported_by_index() {
    let reps = Array2::from_shape_fn((20, 2), |(i, j)| (i + j) as f64);
    let mut factors = Array2::from_shape_fn((20, 3), |(i, _)| (i % 2) as f64);
    factors[[5, 2]] = f64::NAN;
    let err = mutual_info_estimate(&reps, &factors, &MutualInfoOptions::default()).unwrap_err();
    assert_eq!(err.factor_index(), Some(2));
}

#[test]
fn row_mismatch_fails_fast() {
    let reps = Array2::<f64>::zeros((10, 2));
    let factors = Array2::<f64>::zeros((9, 1));
    let err = mutual_info_estimate(&reps, &factors, &MutualInfoOptions::default()).unwrap_err();
    assert!(matches!(err, MetricsError::Shape(_)));
}

#[test]
fn discretised_codes_feed_the_gap() {
    let mut rng = StdRng::seed_from_u64(21);
    let factors = random_labels(22, 150, 1, 5);
    let reps = Array2::from_shape_fn((150, 2), |(i, j)| {
        if j == 0 {
            factors[[i, 0]] as f64 * 2.0 + rng.gen_range(0.0..0.5)
        } else {
            rng.gen_range(0.0..10.0)
        }
    });
    let codes = discretize(&reps, 20).unwrap();
    let mig = mutual_info_gap(&codes, &factors).unwrap();
    assert!(mig > 0.5, "mig {mig}");
}
