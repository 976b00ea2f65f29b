// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Lloyd's k-means with k-means++ seeding.

use crate::matrix::ensure_non_empty;
use crate::{MetricsError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

#[derive(Clone, Debug)]
pub(crate) struct KMeans {
    pub n_clusters: usize,
    pub n_init: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct KMeansFit {
    pub labels: Vec<usize>,
    pub inertia: f64,
}

pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

impl KMeans {
    pub fn new(n_clusters: usize, seed: u64) -> Self {
        Self {
            n_clusters,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed,
        }
    }

    /// Best of `n_init` restarts by inertia.
    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<KMeansFit> {
        ensure_non_empty(data, "clustering input")?;
        if self.n_clusters == 0 || self.n_clusters > data.nrows() {
            return Err(MetricsError::InvalidArgument(format!(
                "cannot form {} clusters from {} samples",
                self.n_clusters,
                data.nrows()
            )));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(MetricsError::InvalidArgument(
                "clustering input contains non-finite values".to_string(),
            ));
        }
        let tol = self.tol * data.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;
        for run in 0..self.n_init.max(1) {
            let centers = plus_plus_centers(data, self.n_clusters, &mut rng);
            let fit = self.lloyd(data, centers, tol);
            trace!(run, inertia = fit.inertia, "k-means restart");
            if best.as_ref().map_or(true, |b| fit.inertia < b.inertia) {
                best = Some(fit);
            }
        }
        best.ok_or_else(|| MetricsError::InvalidArgument("k-means produced no fit".to_string()))
    }

    fn lloyd(&self, data: ArrayView2<'_, f64>, mut centers: Array2<f64>, tol: f64) -> KMeansFit {
        let mut labels = assign(data, &centers).0;
        for _ in 0..self.max_iter {
            let mut updated = Array2::<f64>::zeros(centers.dim());
            let mut counts = vec![0usize; self.n_clusters];
            for (row, &label) in data.rows().into_iter().zip(&labels) {
                let mut center = updated.row_mut(label);
                center += &row;
                counts[label] += 1;
            }
            for (c, &count) in counts.iter().enumerate() {
                if count > 0 {
                    updated.row_mut(c).mapv_inplace(|v| v / count as f64);
                } else {
                    // Empty cluster: reseed on the sample farthest from its center.
                    let far = farthest_sample(data, &centers, &labels);
                    updated.row_mut(c).assign(&data.row(far));
                }
            }
            let shift: f64 = centers
                .rows()
                .into_iter()
                .zip(updated.rows())
                .map(|(a, b)| squared_distance(a, b))
                .sum();
            centers = updated;
            labels = assign(data, &centers).0;
            if shift <= tol {
                break;
            }
        }
        let (labels, inertia) = assign(data, &centers);
        KMeansFit {
            labels,
            inertia,
        }
    }
}

/// Nearest-center labels and total squared distance.
pub(crate) fn assign(data: ArrayView2<'_, f64>, centers: &Array2<f64>) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = data
        .rows()
        .into_iter()
        .map(|row| {
            let (label, dist) = centers
                .rows()
                .into_iter()
                .map(|c| squared_distance(row, c))
                .enumerate()
                .fold((0, f64::INFINITY), |best, (k, d)| {
                    if d < best.1 {
                        (k, d)
                    } else {
                        best
                    }
                });
            inertia += dist;
            label
        })
        .collect();
    (labels, inertia)
}

fn farthest_sample(data: ArrayView2<'_, f64>, centers: &Array2<f64>, labels: &[usize]) -> usize {
    data.rows()
        .into_iter()
        .zip(labels)
        .map(|(row, &label)| squared_distance(row, centers.row(label)))
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (s, d)| {
            if d > best.1 {
                (s, d)
            } else {
                best
            }
        })
        .0
}

fn plus_plus_centers(data: ArrayView2<'_, f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centers = Array2::<f64>::zeros((k, data.ncols()));
    centers.row_mut(0).assign(&data.row(rng.gen_range(0..n)));
    let mut closest: Vec<f64> = data
        .rows()
        .into_iter()
        .map(|row| squared_distance(row, centers.row(0)))
        .collect();
    for c in 1..k {
        let pick = match WeightedIndex::new(&closest) {
            Ok(dist) => dist.sample(rng),
            // Every sample already coincides with a center.
            Err(_) => rng.gen_range(0..n),
        };
        centers.row_mut(c).assign(&data.row(pick));
        for (slot, row) in closest.iter_mut().zip(data.rows()) {
            *slot = slot.min(squared_distance(row, centers.row(c)));
        }
    }
    centers
}
