// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Full-covariance Gaussian mixture fitted by expectation maximisation.

use super::kmeans::KMeans;
use crate::{MetricsError, Result};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView2};
use std::f64::consts::PI;
use tracing::{debug, warn};

#[derive(Clone, Debug)]
pub(crate) struct GaussianMixture {
    pub n_components: usize,
    pub max_iter: usize,
    pub tol: f64,
    pub reg_covar: f64,
    pub seed: u64,
}

#[derive(Clone, Debug)]
pub(crate) struct GaussianMixtureFit {
    pub labels: Vec<usize>,
    pub lower_bound: f64,
    pub converged: bool,
}

/// Mixture parameters with each covariance kept as its Cholesky factor.
struct Components {
    log_weights: Vec<f64>,
    means: Vec<DVector<f64>>,
    factors: Vec<DMatrix<f64>>,
    log_dets: Vec<f64>,
}

impl GaussianMixture {
    pub fn new(n_components: usize, seed: u64) -> Self {
        Self {
            n_components,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed,
        }
    }

    pub fn fit(&self, data: ArrayView2<'_, f64>) -> Result<GaussianMixtureFit> {
        let init = KMeans {
            n_init: 1,
            ..KMeans::new(self.n_components, self.seed)
        }
        .fit(data)?;
        let mut resp = Array2::<f64>::zeros((data.nrows(), self.n_components));
        for (s, &label) in init.labels.iter().enumerate() {
            resp[[s, label]] = 1.0;
        }

        let mut components = self.m_step(data, &resp)?;
        let mut lower_bound = f64::NEG_INFINITY;
        let mut converged = false;
        let mut iterations = 0;
        for _ in 0..self.max_iter {
            iterations += 1;
            let (log_resp, mean_log_likelihood) = e_step(data, &components);
            resp = log_resp.mapv(f64::exp);
            components = self.m_step(data, &resp)?;
            let change = mean_log_likelihood - lower_bound;
            lower_bound = mean_log_likelihood;
            if change.abs() < self.tol {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                iterations,
                "gaussian mixture did not converge, using the last parameters"
            );
        }

        let (log_resp, _) = e_step(data, &components);
        let labels = log_resp
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (k, &v)| {
                        if v > best.1 {
                            (k, v)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect();
        debug!(
            components = self.n_components,
            iterations,
            lower_bound,
            "gaussian mixture fitted"
        );
        Ok(GaussianMixtureFit {
            labels,
            lower_bound,
            converged,
        })
    }

    fn m_step(&self, data: ArrayView2<'_, f64>, resp: &Array2<f64>) -> Result<Components> {
        let (n, d) = data.dim();
        let mass: Array1<f64> = resp.sum_axis(ndarray::Axis(0)) + 10.0 * f64::EPSILON;
        let centers = resp.t().dot(&data);
        let mut components = Components {
            log_weights: Vec::with_capacity(self.n_components),
            means: Vec::with_capacity(self.n_components),
            factors: Vec::with_capacity(self.n_components),
            log_dets: Vec::with_capacity(self.n_components),
        };
        for k in 0..self.n_components {
            let nk = mass[k];
            let mean = DVector::from_iterator(d, centers.row(k).iter().map(|v| v / nk));
            let mut covariance = DMatrix::<f64>::zeros(d, d);
            for (s, row) in data.rows().into_iter().enumerate() {
                let r = resp[[s, k]];
                if r == 0.0 {
                    continue;
                }
                let diff =
                    DVector::from_iterator(d, row.iter().zip(mean.iter()).map(|(x, m)| x - m));
                covariance.ger(r, &diff, &diff, 1.0);
            }
            covariance /= nk;
            for i in 0..d {
                covariance[(i, i)] += self.reg_covar;
            }
            let cholesky = covariance.cholesky().ok_or_else(|| {
                MetricsError::InvalidArgument(format!(
                    "covariance of mixture component {k} is not positive definite"
                ))
            })?;
            let lower = cholesky.l();
            let log_det = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
            components.log_weights.push((nk / n as f64).ln());
            components.means.push(mean);
            components.factors.push(lower);
            components.log_dets.push(log_det);
        }
        Ok(components)
    }
}

/// Log responsibilities and the mean per-sample log likelihood.
fn e_step(data: ArrayView2<'_, f64>, components: &Components) -> (Array2<f64>, f64) {
    let (n, d) = data.dim();
    let k = components.means.len();
    let log_norm = d as f64 * (2.0 * PI).ln();
    let mut log_resp = Array2::<f64>::zeros((n, k));
    let mut total = 0.0;
    for (s, row) in data.rows().into_iter().enumerate() {
        for c in 0..k {
            let diff = DVector::from_iterator(
                d,
                row.iter().zip(components.means[c].iter()).map(|(x, m)| x - m),
            );
            let mahalanobis = components.factors[c]
                .solve_lower_triangular(&diff)
                .map(|y| y.norm_squared())
                .unwrap_or(f64::INFINITY);
            log_resp[[s, c]] = components.log_weights[c]
                - 0.5 * (log_norm + components.log_dets[c] + mahalanobis);
        }
        let max = log_resp.row(s).iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let lse = max + log_resp.row(s).iter().map(|v| (v - max).exp()).sum::<f64>().ln();
        log_resp.row_mut(s).mapv_inplace(|v| v - lse);
        total += lse;
    }
    (log_resp, total / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn blobs(seed: u64) -> (Array2<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 0.3).unwrap();
        let centers = [[0.0, 0.0], [6.0, 0.0], [0.0, 6.0]];
        let n = 90;
        let truth: Vec<usize> = (0..n).map(|i| i % 3).collect();
        let data = Array2::from_shape_fn((n, 2), |(i, j)| {
            centers[truth[i]][j] + noise.sample(&mut rng)
        });
        (data, truth)
    }

    #[test]
    fn recovers_well_separated_components() {
        let (data, truth) = blobs(3);
        let fit = GaussianMixture::new(3, 0).fit(data.view()).unwrap();
        assert!(fit.converged);
        for i in 0..truth.len() {
            for j in 0..truth.len() {
                assert_eq!(truth[i] == truth[j], fit.labels[i] == fit.labels[j]);
            }
        }
        assert!(fit.lower_bound.is_finite());
    }

    #[test]
    fn regularisation_handles_a_flat_dimension() {
        let (mut data, _) = blobs(4);
        data.column_mut(1).fill(2.0);
        let fit = GaussianMixture::new(2, 0).fit(data.view()).unwrap();
        assert_eq!(fit.labels.len(), data.nrows());
        assert!(fit.labels.iter().all(|&l| l < 2));
    }
}
