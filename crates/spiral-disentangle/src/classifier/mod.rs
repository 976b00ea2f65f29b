// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Classifiers that expose per-feature importances.
//!
//! The importance estimator only needs three capabilities (fit, predict,
//! feature importances), so every model sits behind
//! [`FeatureImportanceClassifier`] and is picked through [`ClassifierKind`].

mod boosting;
mod forest;
mod logistic;
pub(crate) mod tree;

pub use boosting::GradientBoostingClassifier;
pub use forest::RandomForestClassifier;
pub use logistic::LogisticRegression;

use crate::{MetricsError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capability interface for models that report feature importances.
pub trait FeatureImportanceClassifier: Send {
    /// Fits the model on `[n_samples, n_features]` inputs and integer labels.
    fn fit(&mut self, features: ArrayView2<'_, f64>, labels: ArrayView1<'_, i64>) -> Result<()>;

    /// Predicts labels using the label values seen during `fit`.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Result<Array1<i64>>;

    /// Non-negative importances, one per feature, summing to 1 unless the
    /// model found no signal (then all zeros).
    fn feature_importances(&self) -> Result<Array1<f64>>;
}

/// Registered classifier variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    #[default]
    GradientBoosting,
    RandomForest,
    Logistic,
}

impl ClassifierKind {
    pub const NAMES: &'static str = "gradient_boosting, random_forest, logistic";

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassifierKind::GradientBoosting => "gradient_boosting",
            ClassifierKind::RandomForest => "random_forest",
            ClassifierKind::Logistic => "logistic",
        }
    }

    /// Instantiates the classifier with default hyper-parameters.
    pub fn build(self, seed: u64) -> Box<dyn FeatureImportanceClassifier> {
        match self {
            ClassifierKind::GradientBoosting => Box::new(GradientBoostingClassifier::new(seed)),
            ClassifierKind::RandomForest => Box::new(RandomForestClassifier::new(seed)),
            ClassifierKind::Logistic => Box::new(LogisticRegression::default()),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassifierKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "gradient_boosting" | "gbt" | "gbm" => Ok(ClassifierKind::GradientBoosting),
            "random_forest" | "rf" | "forest" => Ok(ClassifierKind::RandomForest),
            "logistic" | "logistic_regression" => Ok(ClassifierKind::Logistic),
            _ => Err(MetricsError::UnsupportedAlgorithm {
                name: s.to_string(),
                expected: Self::NAMES,
            }),
        }
    }
}

/// Sorted label values observed during fitting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ClassEncoding {
    classes: Vec<i64>,
}

impl ClassEncoding {
    pub fn fit(labels: ArrayView1<'_, i64>) -> Self {
        let mut classes: Vec<i64> = labels.to_vec();
        classes.sort_unstable();
        classes.dedup();
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Dense class ids for labels known to be in the encoding.
    pub fn encode(&self, labels: ArrayView1<'_, i64>) -> Vec<usize> {
        labels
            .iter()
            .map(|label| self.classes.binary_search(label).unwrap_or(0))
            .collect()
    }

    pub fn decode(&self, class: usize) -> i64 {
        self.classes[class]
    }
}

pub(crate) fn ensure_fit_inputs(
    features: ArrayView2<'_, f64>,
    labels: ArrayView1<'_, i64>,
) -> Result<()> {
    if features.nrows() == 0 || features.ncols() == 0 {
        return Err(MetricsError::Shape(format!(
            "training features must be non-empty, got {}x{}",
            features.nrows(),
            features.ncols()
        )));
    }
    if features.nrows() != labels.len() {
        return Err(MetricsError::Shape(format!(
            "{} training rows but {} labels",
            features.nrows(),
            labels.len()
        )));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(MetricsError::InvalidArgument(
            "training features contain non-finite values".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_predict_width(features: ArrayView2<'_, f64>, expected: usize) -> Result<()> {
    if features.ncols() != expected {
        return Err(MetricsError::Shape(format!(
            "model was fitted on {expected} features, got {}",
            features.ncols()
        )));
    }
    Ok(())
}

pub(crate) fn not_fitted() -> MetricsError {
    MetricsError::InvalidArgument("classifier has not been fitted".to_string())
}

/// Rescales non-negative importances to sum to 1, keeping all-zero vectors.
pub(crate) fn normalize_importances(mut values: Vec<f64>) -> Array1<f64> {
    let total: f64 = values.iter().sum();
    if total > 0.0 {
        for v in values.iter_mut() {
            *v /= total;
        }
    }
    Array1::from(values)
}
