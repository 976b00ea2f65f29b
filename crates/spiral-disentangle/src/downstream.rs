// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Predictor-based scores: SAP, the beta-VAE score and the factor-VAE score.
//!
//! The beta-VAE and factor-VAE scores are usually computed by re-sampling a
//! simulator. Here the groups of observations that share one factor value
//! are drawn from the evaluation dataset itself.

use crate::classifier::{FeatureImportanceClassifier, LogisticRegression};
use crate::matrix::{accuracy, ensure_same_rows, ensure_split, labels_from_floats, mean_std};
use crate::pool::FactorPool;
use crate::{default_seed, MetricsError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Codes whose global standard deviation falls below this are ignored by the
/// factor-VAE vote.
const ACTIVE_STD: f64 = 0.05;

/// Sampling budget for [`beta_vae_score`] and [`factor_vae_score`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownstreamOptions {
    /// Points (or votes) used to train the predictor.
    pub n_train: usize,
    /// Points (or votes) used to evaluate it.
    pub n_eval: usize,
    /// Observations averaged into one point.
    pub batch_size: usize,
    pub seed: u64,
}

impl Default for DownstreamOptions {
    fn default() -> Self {
        Self {
            n_train: 10_000,
            n_eval: 5_000,
            batch_size: 64,
            seed: default_seed(),
        }
    }
}

impl DownstreamOptions {
    fn validate(&self, min_batch: usize) -> Result<()> {
        if self.n_train == 0 || self.n_eval == 0 {
            return Err(MetricsError::InvalidArgument(format!(
                "n_train and n_eval must be > 0, got {} and {}",
                self.n_train, self.n_eval
            )));
        }
        if self.batch_size < min_batch {
            return Err(MetricsError::InvalidArgument(format!(
                "batch_size must be >= {min_batch}, got {}",
                self.batch_size
            )));
        }
        Ok(())
    }
}

/// Accuracy of a predictor on its own training points and on fresh points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DownstreamScore {
    pub train_accuracy: f64,
    pub eval_accuracy: f64,
}

/// Rows grouped by value, one map per factor.
struct FactorGroups {
    groups: Vec<HashMap<i64, Vec<usize>>>,
}

impl FactorGroups {
    fn new(factors: &Array2<i64>) -> Self {
        let groups = factors
            .axis_iter(Axis(1))
            .map(|column| {
                let mut map: HashMap<i64, Vec<usize>> = HashMap::new();
                for (row, &value) in column.iter().enumerate() {
                    map.entry(value).or_default().push(row);
                }
                map
            })
            .collect();
        Self { groups }
    }

    fn n_factors(&self) -> usize {
        self.groups.len()
    }

    /// Rows sharing the value of `factor` at a uniformly drawn row.
    fn draw<'a>(&'a self, factors: &Array2<i64>, factor: usize, rng: &mut StdRng) -> &'a [usize] {
        let anchor = rng.gen_range(0..factors.nrows());
        self.groups[factor]
            .get(&factors[[anchor, factor]])
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn beta_vae_points(
    representations: &Array2<f64>,
    factors: &Array2<i64>,
    groups: &FactorGroups,
    n_points: usize,
    batch_size: usize,
    rng: &mut StdRng,
) -> (Array2<f64>, Array1<i64>) {
    let n_codes = representations.ncols();
    let mut points = Array2::<f64>::zeros((n_points, n_codes));
    let mut labels = Array1::<i64>::zeros(n_points);
    for p in 0..n_points {
        let factor = rng.gen_range(0..groups.n_factors());
        let rows = groups.draw(factors, factor, rng);
        let mut point = points.row_mut(p);
        for _ in 0..batch_size {
            let a = rows[rng.gen_range(0..rows.len())];
            let b = rows[rng.gen_range(0..rows.len())];
            for ((slot, za), zb) in point
                .iter_mut()
                .zip(representations.row(a))
                .zip(representations.row(b))
            {
                *slot += (za - zb).abs();
            }
        }
        point.mapv_inplace(|v| v / batch_size as f64);
        labels[p] = factor as i64;
    }
    (points, labels)
}

/// Beta-VAE score: a linear classifier predicts which factor was held fixed
/// from the mean absolute code difference of pairs sharing that factor.
pub fn beta_vae_score(
    representations: &Array2<f64>,
    factors: &Array2<i64>,
    options: &DownstreamOptions,
) -> Result<DownstreamScore> {
    ensure_same_rows(
        representations.view(),
        "representations",
        factors.view(),
        "factors",
    )?;
    options.validate(1)?;
    let groups = FactorGroups::new(factors);
    let mut train_rng = spiral_config::rng_for(options.seed, "beta_vae/train");
    let mut eval_rng = spiral_config::rng_for(options.seed, "beta_vae/eval");
    let (train_x, train_y) = beta_vae_points(
        representations,
        factors,
        &groups,
        options.n_train,
        options.batch_size,
        &mut train_rng,
    );
    let (eval_x, eval_y) = beta_vae_points(
        representations,
        factors,
        &groups,
        options.n_eval,
        options.batch_size,
        &mut eval_rng,
    );

    let mut model = LogisticRegression::default();
    model.fit(train_x.view(), train_y.view())?;
    let score = DownstreamScore {
        train_accuracy: accuracy(train_y.view(), model.predict(train_x.view())?.view()),
        eval_accuracy: accuracy(eval_y.view(), model.predict(eval_x.view())?.view()),
    };
    debug!(
        train = score.train_accuracy,
        eval = score.eval_accuracy,
        "beta-vae score"
    );
    Ok(score)
}

/// `[n_codes, n_factors]` counts of which code varied least while a factor
/// was held fixed.
fn factor_vae_votes(
    scaled: &Array2<f64>,
    active: &[usize],
    factors: &Array2<i64>,
    groups: &FactorGroups,
    n_votes: usize,
    batch_size: usize,
    rng: &mut StdRng,
) -> Array2<f64> {
    let mut votes = Array2::<f64>::zeros((scaled.ncols(), groups.n_factors()));
    let mut batch = Array2::<f64>::zeros((batch_size, active.len()));
    for _ in 0..n_votes {
        let factor = rng.gen_range(0..groups.n_factors());
        let rows = groups.draw(factors, factor, rng);
        for mut slot in batch.rows_mut() {
            let row = rows[rng.gen_range(0..rows.len())];
            for (value, &code) in slot.iter_mut().zip(active) {
                *value = scaled[[row, code]];
            }
        }
        let variances = batch.var_axis(Axis(0), 1.0);
        let quietest = variances
            .iter()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (i, &v)| {
                if v < best.1 {
                    (i, v)
                } else {
                    best
                }
            })
            .0;
        votes[[active[quietest], factor]] += 1.0;
    }
    votes
}

/// Factor-VAE score: a majority-vote classifier maps the least varying
/// active code to the factor held fixed.
pub fn factor_vae_score(
    representations: &Array2<f64>,
    factors: &Array2<i64>,
    options: &DownstreamOptions,
) -> Result<DownstreamScore> {
    ensure_same_rows(
        representations.view(),
        "representations",
        factors.view(),
        "factors",
    )?;
    options.validate(2)?;

    let stds: Vec<f64> = representations
        .axis_iter(Axis(1))
        .map(|column| mean_std(column).1)
        .collect();
    let active: Vec<usize> = stds
        .iter()
        .enumerate()
        .filter(|(_, &s)| s >= ACTIVE_STD)
        .map(|(i, _)| i)
        .collect();
    if active.is_empty() {
        warn!("no active codes, factor-vae score is 0");
        return Ok(DownstreamScore {
            train_accuracy: 0.0,
            eval_accuracy: 0.0,
        });
    }
    let mut scaled = representations.clone();
    for (mut column, &std) in scaled.axis_iter_mut(Axis(1)).zip(&stds) {
        if std > 0.0 {
            column.mapv_inplace(|v| v / std);
        }
    }

    let groups = FactorGroups::new(factors);
    let mut train_rng = spiral_config::rng_for(options.seed, "factor_vae/train");
    let mut eval_rng = spiral_config::rng_for(options.seed, "factor_vae/eval");
    let train_votes = factor_vae_votes(
        &scaled,
        &active,
        factors,
        &groups,
        options.n_train,
        options.batch_size,
        &mut train_rng,
    );
    let eval_votes = factor_vae_votes(
        &scaled,
        &active,
        factors,
        &groups,
        options.n_eval,
        options.batch_size,
        &mut eval_rng,
    );

    // Each code predicts the factor it voted for most often during training.
    let classifier: Vec<usize> = train_votes
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (j, &v)| {
                    if v > best.1 {
                        (j, v)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect();
    let hits = |votes: &Array2<f64>| -> f64 {
        let correct: f64 = classifier
            .iter()
            .enumerate()
            .map(|(code, &factor)| votes[[code, factor]])
            .sum();
        correct / votes.sum()
    };
    let score = DownstreamScore {
        train_accuracy: hits(&train_votes),
        eval_accuracy: hits(&eval_votes),
    };
    debug!(
        active = active.len(),
        train = score.train_accuracy,
        eval = score.eval_accuracy,
        "factor-vae score"
    );
    Ok(score)
}

fn squared_correlation(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    let (mx, sx) = mean_std(x);
    let (my, sy) = mean_std(y);
    if sx <= 0.0 || sy <= 0.0 {
        return 0.0;
    }
    let cov = x
        .iter()
        .zip(y.iter())
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / x.len() as f64;
    cov * cov / (sx * sx * sy * sy)
}

/// Separated attribute predictability.
///
/// Scores every code against every factor (squared correlation on the
/// training split for continuous factors, test accuracy of a one-code
/// logistic regression otherwise) and averages the per-factor gap between
/// the two best codes.
pub fn separated_attr_predictability(
    repr_train: &Array2<f64>,
    factor_train: &Array2<f64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<f64>,
    continuous_factors: bool,
) -> Result<f64> {
    separated_attr_predictability_on(
        FactorPool::shared()?,
        repr_train,
        factor_train,
        repr_test,
        factor_test,
        continuous_factors,
    )
}

/// [`separated_attr_predictability`] on an explicit pool.
pub fn separated_attr_predictability_on(
    pool: &FactorPool,
    repr_train: &Array2<f64>,
    factor_train: &Array2<f64>,
    repr_test: &Array2<f64>,
    factor_test: &Array2<f64>,
    continuous_factors: bool,
) -> Result<f64> {
    ensure_split(repr_train, factor_train, repr_test, factor_test)?;
    let n_codes = repr_train.ncols();
    if n_codes < 2 {
        return Err(MetricsError::InvalidArgument(format!(
            "SAP needs at least two codes, got {n_codes}"
        )));
    }

    let columns = pool.run(factor_train.ncols(), |j| {
        if continuous_factors {
            return Ok((0..n_codes)
                .map(|i| squared_correlation(repr_train.column(i), factor_train.column(j)))
                .collect::<Vec<f64>>());
        }
        let to_labels = |column: ArrayView1<'_, f64>| {
            labels_from_floats(column)
                .map(Array1::from)
                .map_err(|reason| MetricsError::Factor { factor: j, reason })
        };
        let y_train = to_labels(factor_train.column(j))?;
        let y_test = to_labels(factor_test.column(j))?;
        (0..n_codes)
            .map(|i| {
                let x_train = repr_train.column(i).insert_axis(Axis(1));
                let x_test = repr_test.column(i).insert_axis(Axis(1));
                let mut model = LogisticRegression::default();
                model.fit(x_train, y_train.view())?;
                Ok(accuracy(y_test.view(), model.predict(x_test)?.view()))
            })
            .collect::<Result<Vec<f64>>>()
    })?;

    let gaps: Vec<f64> = columns
        .into_iter()
        .map(|mut column| {
            column.sort_by(|a, b| b.total_cmp(a));
            column[0] - column[1]
        })
        .collect();
    let sap = gaps.iter().sum::<f64>() / gaps.len() as f64;
    debug!(
        sap,
        factors = gaps.len(),
        continuous_factors,
        "separated attribute predictability"
    );
    Ok(sap)
}
