// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Unsupervised clustering scores of representations against factor labels.
//!
//! Clusters are predicted with k-means or a Gaussian mixture (one cluster
//! per distinct true label) and compared with the truth through silhouette,
//! adjusted Rand index, normalised mutual information and clustering
//! accuracy.

mod assignment;
mod gmm;
mod kmeans;
pub mod scores;

use crate::matrix::{ensure_same_rows, labels_from_floats};
use crate::{MetricsError, Result};
use gmm::GaussianMixture;
use kmeans::KMeans;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Algorithm used to predict cluster assignments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionAlgorithm {
    KMeans,
    GaussianMixture,
    /// Elementwise mean of the two algorithms' scores.
    #[default]
    Both,
}

impl PredictionAlgorithm {
    pub const NAMES: &'static str = "knn, kmeans, gmm, both";

    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionAlgorithm::KMeans => "kmeans",
            PredictionAlgorithm::GaussianMixture => "gmm",
            PredictionAlgorithm::Both => "both",
        }
    }
}

impl fmt::Display for PredictionAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredictionAlgorithm {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "knn" | "kmeans" | "k-means" => Ok(PredictionAlgorithm::KMeans),
            "gmm" | "gaussian_mixture" => Ok(PredictionAlgorithm::GaussianMixture),
            "both" => Ok(PredictionAlgorithm::Both),
            _ => Err(MetricsError::UnsupportedAlgorithm {
                name: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

/// Silhouette, ARI, NMI and clustering accuracy of one prediction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusteringScores {
    pub asw: f64,
    pub ari: f64,
    pub nmi: f64,
    pub uca: f64,
}

impl ClusteringScores {
    fn mean(&self, other: &ClusteringScores) -> ClusteringScores {
        ClusteringScores {
            asw: (self.asw + other.asw) / 2.0,
            ari: (self.ari + other.ari) / 2.0,
            nmi: (self.nmi + other.nmi) / 2.0,
            uca: (self.uca + other.uca) / 2.0,
        }
    }
}

/// Collapses a factor matrix into one categorical label per sample.
///
/// A single column is rounded to integer labels; several columns (one-hot
/// or multi-factor) are min-max normalised per column and arg-maxed.
pub fn factor_labels(factors: &Array2<f64>) -> Result<Array1<i64>> {
    crate::matrix::ensure_non_empty(factors.view(), "factors")?;
    if factors.ncols() == 1 {
        return labels_from_floats(factors.column(0))
            .map(Array1::from)
            .map_err(MetricsError::InvalidArgument);
    }
    if factors.iter().any(|v| !v.is_finite()) {
        return Err(MetricsError::InvalidArgument(
            "factors contain non-finite values".to_string(),
        ));
    }
    let lo = factors.fold_axis(Axis(0), f64::INFINITY, |acc, &v| acc.min(v));
    let hi = factors.fold_axis(Axis(0), f64::NEG_INFINITY, |acc, &v| acc.max(v));
    Ok(factors
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .zip(lo.iter().zip(hi.iter()))
                .map(|(&v, (&l, &h))| if h > l { (v - l) / (h - l) } else { 0.0 })
                .enumerate()
                .fold((0usize, f64::NEG_INFINITY), |best, (k, v)| {
                    if v > best.1 {
                        (k, v)
                    } else {
                        best
                    }
                })
                .0 as i64
        })
        .collect())
}

fn score_prediction(
    representations: &Array2<f64>,
    truth: &[i64],
    predicted: &[usize],
) -> ClusteringScores {
    let predicted: Vec<i64> = predicted.iter().map(|&p| p as i64).collect();
    ClusteringScores {
        asw: scores::silhouette_score(representations.view(), &predicted),
        ari: scores::adjusted_rand_index(truth, &predicted),
        nmi: scores::normalized_mutual_info(truth, &predicted),
        uca: scores::clustering_accuracy(truth, &predicted),
    }
}

/// Clusters `representations` and scores the prediction against the labels
/// derived from `factors` by [`factor_labels`].
pub fn unsupervised_clustering_scores(
    representations: &Array2<f64>,
    factors: &Array2<f64>,
    algorithm: PredictionAlgorithm,
    seed: u64,
) -> Result<ClusteringScores> {
    ensure_same_rows(
        representations.view(),
        "representations",
        factors.view(),
        "factors",
    )?;
    let truth = factor_labels(factors)?.to_vec();
    let n_clusters = truth.iter().collect::<HashSet<_>>().len();

    let kmeans = || -> Result<ClusteringScores> {
        let fit = KMeans::new(n_clusters, seed).fit(representations.view())?;
        Ok(score_prediction(representations, &truth, &fit.labels))
    };
    let mixture = || -> Result<ClusteringScores> {
        let fit = GaussianMixture::new(n_clusters, seed).fit(representations.view())?;
        debug!(
            converged = fit.converged,
            lower_bound = fit.lower_bound,
            "mixture prediction"
        );
        Ok(score_prediction(representations, &truth, &fit.labels))
    };

    let scores = match algorithm {
        PredictionAlgorithm::KMeans => kmeans()?,
        PredictionAlgorithm::GaussianMixture => mixture()?,
        PredictionAlgorithm::Both => kmeans()?.mean(&mixture()?),
    };
    debug!(
        %algorithm,
        clusters = n_clusters,
        asw = scores.asw,
        ari = scores.ari,
        nmi = scores.nmi,
        uca = scores.uca,
        "clustering scores"
    );
    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn algorithm_names_parse() {
        assert_eq!(
            "knn".parse::<PredictionAlgorithm>().unwrap(),
            PredictionAlgorithm::KMeans
        );
        assert_eq!(
            "GMM".parse::<PredictionAlgorithm>().unwrap(),
            PredictionAlgorithm::GaussianMixture
        );
        let err = "dbscan".parse::<PredictionAlgorithm>().unwrap_err();
        assert!(err.to_string().contains("dbscan"));
    }

    #[test]
    fn one_hot_factors_collapse_to_their_argmax() {
        let factors = array![[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]];
        assert_eq!(factor_labels(&factors).unwrap().to_vec(), vec![0, 2, 1]);
    }

    #[test]
    fn single_column_factors_are_rounded() {
        let factors = array![[0.2], [1.9], [3.0]];
        assert_eq!(factor_labels(&factors).unwrap().to_vec(), vec![0, 2, 3]);
    }

    #[test]
    fn row_mismatch_is_a_shape_error() {
        let reps = Array2::<f64>::zeros((3, 2));
        let factors = Array2::<f64>::zeros((4, 1));
        let err =
            unsupervised_clustering_scores(&reps, &factors, PredictionAlgorithm::KMeans, 0)
                .unwrap_err();
        assert!(matches!(err, MetricsError::Shape(_)));
    }
}
