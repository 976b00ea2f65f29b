// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Disentanglement metrics for learned representations.
//!
//! Every metric compares a representation matrix `[n_samples, n_codes]`
//! against a matrix of ground-truth factors `[n_samples, n_factors]`.
//! Information estimates are reported in nats. Work that is independent per
//! factor (k-NN mutual information, classifier fits, SAP columns) is fanned
//! out over a [`pool::FactorPool`] and reassembled by factor index, and every
//! stochastic routine takes its seed explicitly.

pub mod classifier;
pub mod clustering;
pub mod dci;
pub mod downstream;
pub mod importance;
pub mod information;
pub mod matrix;
pub mod mig;
pub mod pool;
pub mod strength;

pub use classifier::{ClassifierKind, FeatureImportanceClassifier, LogisticRegression};
pub use clustering::{
    factor_labels, unsupervised_clustering_scores, ClusteringScores, PredictionAlgorithm,
};
pub use dci::{
    completeness_score, dci_scores, dci_scores_with, dcmi_scores, disentanglement_score,
    DciScores,
};
pub use downstream::{
    beta_vae_score, factor_vae_score, separated_attr_predictability, DownstreamOptions,
    DownstreamScore,
};
pub use importance::{representative_importance_matrix, ImportanceMatrix};
pub use information::discrete::{
    discrete_entropy, discrete_mutual_info, discretize, entropy, mutual_info_score,
};
pub use information::knn::{mutual_info_estimate, MutualInfoOptions};
pub use mig::{mutual_info_gap, mutual_info_gap_per_factor};
pub use pool::FactorPool;
pub use strength::{
    correlation_matrix, relative_disentanglement_strength, relative_strength,
    CorrelationMethod,
};

use thiserror::Error;

/// Seed used by option structs when the caller does not pick one: the
/// configured base seed (`SPIRAL_METRICS_SEED`, 1234 when unset).
pub fn default_seed() -> u64 {
    spiral_config::config().base_seed
}

/// Errors surfaced by the metrics crate.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    /// Inputs have mismatched row counts, widths, or are empty.
    #[error("shape mismatch: {0}")]
    Shape(String),
    /// An algorithm name did not match any known variant.
    #[error("unsupported algorithm '{name}' (expected one of: {expected})")]
    UnsupportedAlgorithm {
        name: String,
        expected: &'static str,
    },
    /// A per-factor job failed; other factors' results were discarded.
    #[error("computation for factor {factor} failed: {reason}")]
    Factor { factor: usize, reason: String },
    /// A parameter is outside its valid range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The worker pool could not be created.
    #[error("worker pool unavailable: {0}")]
    Pool(String),
}

impl MetricsError {
    /// Index of the factor whose job failed, if any.
    pub fn factor_index(&self) -> Option<usize> {
        match self {
            MetricsError::Factor { factor, .. } => Some(*factor),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
