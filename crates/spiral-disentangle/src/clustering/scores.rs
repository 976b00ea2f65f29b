// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! External clustering validity indices.

use super::assignment::min_cost_assignment;
use crate::information::discrete::LabelColumn;
use ndarray::{Array2, ArrayView2};
use rayon::prelude::*;
use tracing::warn;

fn contingency(a: &LabelColumn, b: &LabelColumn) -> Array2<f64> {
    let mut table = Array2::<f64>::zeros((a.n_classes(), b.n_classes()));
    for (&i, &j) in a.ids.iter().zip(b.ids.iter()) {
        table[[i, j]] += 1.0;
    }
    table
}

fn pairs(count: f64) -> f64 {
    count * (count - 1.0) / 2.0
}

/// Mean silhouette coefficient with Euclidean distances.
///
/// Samples in singleton clusters score 0. Fewer than two clusters yields 0.
pub fn silhouette_score(data: ArrayView2<'_, f64>, labels: &[i64]) -> f64 {
    let column = LabelColumn::encode(labels);
    let n_clusters = column.n_classes();
    if n_clusters < 2 {
        warn!(
            clusters = n_clusters,
            "silhouette needs at least two clusters, reporting 0"
        );
        return 0.0;
    }
    let n = data.nrows();
    let total: f64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let mut sums = vec![0.0; n_clusters];
            let row = data.row(i);
            for (j, other) in data.rows().into_iter().enumerate() {
                if i != j {
                    let d = row
                        .iter()
                        .zip(other.iter())
                        .map(|(x, y)| (x - y).powi(2))
                        .sum::<f64>()
                        .sqrt();
                    sums[column.ids[j]] += d;
                }
            }
            let own = column.ids[i];
            let own_size = column.counts[own];
            if own_size <= 1 {
                return 0.0;
            }
            let a = sums[own] / (own_size - 1) as f64;
            let b = sums
                .iter()
                .zip(&column.counts)
                .enumerate()
                .filter(|(c, _)| *c != own)
                .map(|(_, (sum, &size))| sum / size as f64)
                .fold(f64::INFINITY, f64::min);
            let scale = a.max(b);
            if scale > 0.0 {
                (b - a) / scale
            } else {
                0.0
            }
        })
        .sum();
    total / n as f64
}

/// Adjusted Rand index (Hubert & Arabie).
pub fn adjusted_rand_index(truth: &[i64], predicted: &[i64]) -> f64 {
    let a = LabelColumn::encode(truth);
    let b = LabelColumn::encode(predicted);
    let n = a.len();
    if n <= 1
        || (a.n_classes() == b.n_classes() && (a.n_classes() == 1 || a.n_classes() == n))
    {
        return 1.0;
    }
    let table = contingency(&a, &b);
    let index: f64 = table.iter().map(|&c| pairs(c)).sum();
    let sum_a: f64 = a.counts.iter().map(|&c| pairs(c as f64)).sum();
    let sum_b: f64 = b.counts.iter().map(|&c| pairs(c as f64)).sum();
    let expected = sum_a * sum_b / pairs(n as f64);
    let maximum = (sum_a + sum_b) / 2.0;
    if maximum == expected {
        return 1.0;
    }
    (index - expected) / (maximum - expected)
}

/// Mutual information normalised by the arithmetic mean of both entropies.
pub fn normalized_mutual_info(truth: &[i64], predicted: &[i64]) -> f64 {
    let a = LabelColumn::encode(truth);
    let b = LabelColumn::encode(predicted);
    if a.n_classes() == b.n_classes() && a.n_classes() <= 1 {
        return 1.0;
    }
    let mi = a.mutual_info(&b);
    if mi <= 0.0 {
        return 0.0;
    }
    let normalizer = ((a.entropy() + b.entropy()) / 2.0).max(f64::EPSILON);
    mi / normalizer
}

/// Accuracy under the best one-to-one mapping of clusters onto labels.
pub fn clustering_accuracy(truth: &[i64], predicted: &[i64]) -> f64 {
    let a = LabelColumn::encode(truth);
    let b = LabelColumn::encode(predicted);
    if a.len() == 0 {
        return 0.0;
    }
    let size = a.n_classes().max(b.n_classes());
    let mut hits = Array2::<f64>::zeros((size, size));
    for (&t, &p) in a.ids.iter().zip(b.ids.iter()) {
        hits[[p, t]] += 1.0;
    }
    let most = hits.iter().copied().fold(0.0, f64::max);
    let cost = hits.mapv(|h| most - h);
    let matched: f64 = min_cost_assignment(&cost)
        .into_iter()
        .enumerate()
        .map(|(p, t)| hits[[p, t]])
        .sum();
    matched / a.len() as f64
}
