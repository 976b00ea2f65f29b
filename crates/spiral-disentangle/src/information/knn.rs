// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Nearest-neighbour mutual information between single code columns and
//! factor columns.
//!
//! Continuous/continuous pairs use the Kraskov–Stögbauer–Grassberger
//! estimator with the Chebyshev metric; mixed pairs use Ross' estimator
//! (PLoS ONE 9(2), 2014); discrete/discrete pairs fall back to the
//! contingency table. Continuous columns are scaled to unit standard
//! deviation and receive a tiny seeded jitter to break ties.

use super::discrete::LabelColumn;
use super::special::digamma;
use crate::matrix::{ensure_same_rows, labels_from_floats, mean_std};
use crate::pool::FactorPool;
use crate::{default_seed, MetricsError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tracing::debug;

const JITTER: f64 = 1e-10;

/// Parameters for [`mutual_info_estimate`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutualInfoOptions {
    /// Treat representation columns as continuous (otherwise as labels).
    pub continuous_representations: bool,
    /// Treat factor columns as continuous (otherwise as labels).
    pub continuous_factors: bool,
    pub n_neighbors: usize,
    pub seed: u64,
}

impl Default for MutualInfoOptions {
    fn default() -> Self {
        Self {
            continuous_representations: true,
            continuous_factors: false,
            n_neighbors: 3,
            seed: default_seed(),
        }
    }
}

#[derive(Clone, Debug)]
enum Column {
    Continuous(Vec<f64>),
    Discrete(LabelColumn),
}

/// Estimates MI (nats) for every `(code, factor)` pair, shape
/// `[n_codes, n_factors]`.
///
/// Factor columns are independent jobs on the shared [`FactorPool`]; a
/// factor that cannot be processed is reported with its index.
pub fn mutual_info_estimate(
    representations: &Array2<f64>,
    factors: &Array2<f64>,
    options: &MutualInfoOptions,
) -> Result<Array2<f64>> {
    mutual_info_estimate_on(FactorPool::shared()?, representations, factors, options)
}

/// [`mutual_info_estimate`] on an explicit pool.
pub fn mutual_info_estimate_on(
    pool: &FactorPool,
    representations: &Array2<f64>,
    factors: &Array2<f64>,
    options: &MutualInfoOptions,
) -> Result<Array2<f64>> {
    ensure_same_rows(
        representations.view(),
        "representations",
        factors.view(),
        "factors",
    )?;
    if options.n_neighbors == 0 {
        return Err(MetricsError::InvalidArgument(
            "n_neighbors must be > 0".to_string(),
        ));
    }
    let n_samples = representations.nrows();
    let needs_cc = options.continuous_representations && options.continuous_factors;
    if needs_cc && options.n_neighbors >= n_samples {
        return Err(MetricsError::InvalidArgument(format!(
            "n_neighbors ({}) must be smaller than the number of samples ({n_samples})",
            options.n_neighbors
        )));
    }

    let mut rng = StdRng::seed_from_u64(options.seed);
    let codes: Vec<Column> = representations
        .axis_iter(Axis(1))
        .map(|col| {
            if options.continuous_representations {
                Ok(Column::Continuous(scaled_with_jitter(col, &mut rng)))
            } else {
                labels_from_floats(col)
                    .map(|labels| Column::Discrete(LabelColumn::encode(labels.iter())))
                    .map_err(MetricsError::InvalidArgument)
            }
        })
        .collect::<Result<_>>()?;

    let n_factors = factors.ncols();
    let columns = pool.run(n_factors, |j| {
        let factor = factors.column(j);
        let target = if options.continuous_factors {
            // Every factor draws its jitter from the stream state left after
            // the representation columns.
            let mut factor_rng = rng.clone();
            Column::Continuous(scaled_with_jitter(factor, &mut factor_rng))
        } else {
            let labels = labels_from_floats(factor)
                .map_err(|reason| MetricsError::Factor { factor: j, reason })?;
            Column::Discrete(LabelColumn::encode(labels.iter()))
        };
        Ok(codes
            .iter()
            .map(|code| pair_mutual_info(code, &target, options.n_neighbors))
            .collect::<Vec<f64>>())
    })?;

    let mut mi = Array2::<f64>::zeros((codes.len(), n_factors));
    for (j, column) in columns.into_iter().enumerate() {
        for (i, value) in column.into_iter().enumerate() {
            mi[[i, j]] = value;
        }
    }
    debug!(
        codes = codes.len(),
        factors = n_factors,
        n_neighbors = options.n_neighbors,
        "estimated k-NN mutual information"
    );
    Ok(mi)
}

fn pair_mutual_info(code: &Column, factor: &Column, k: usize) -> f64 {
    match (code, factor) {
        (Column::Continuous(x), Column::Continuous(y)) => mi_continuous_continuous(x, y, k),
        (Column::Continuous(x), Column::Discrete(labels)) => {
            mi_continuous_discrete(x, labels, k)
        }
        (Column::Discrete(labels), Column::Continuous(y)) => {
            mi_continuous_discrete(y, labels, k)
        }
        (Column::Discrete(a), Column::Discrete(b)) => b.mutual_info(a),
    }
}

fn scaled_with_jitter(column: ArrayView1<'_, f64>, rng: &mut StdRng) -> Vec<f64> {
    let (_, std) = mean_std(column);
    let scale = if std > 0.0 { std } else { 1.0 };
    let mut values: Vec<f64> = column.iter().map(|v| v / scale).collect();
    let mean_abs = values.iter().map(|v| v.abs()).sum::<f64>() / values.len().max(1) as f64;
    let amplitude = JITTER * mean_abs.max(1.0);
    for value in values.iter_mut() {
        let noise: f64 = rng.sample(StandardNormal);
        *value += amplitude * noise;
    }
    values
}

/// Largest representable value strictly below a positive radius.
fn shrink_radius(radius: f64) -> f64 {
    if radius > 0.0 && radius.is_finite() {
        f64::from_bits(radius.to_bits() - 1)
    } else {
        radius
    }
}

/// Number of entries of ascending `sorted` within `radius` of `center`.
fn count_within(sorted: &[f64], center: f64, radius: f64) -> usize {
    let lo = sorted.partition_point(|&v| center - v > radius);
    let hi = sorted.partition_point(|&v| v - center <= radius);
    hi.saturating_sub(lo)
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Distance(f64);

impl Eq for Distance {}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Chebyshev distance from every point to its `k`-th nearest neighbour in
/// the plane spanned by `x` and `y`, excluding the point itself.
fn chebyshev_kth_distances(x: &[f64], y: &[f64], k: usize) -> Vec<f64> {
    let n = x.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| x[a].total_cmp(&x[b]));
    let xs: Vec<f64> = order.iter().map(|&i| x[i]).collect();
    let ys: Vec<f64> = order.iter().map(|&i| y[i]).collect();

    let mut out = vec![0.0; n];
    let mut heap: BinaryHeap<Distance> = BinaryHeap::with_capacity(k + 1);
    for p in 0..n {
        heap.clear();
        let mut left = p;
        let mut right = p + 1;
        loop {
            let left_dx = (left > 0).then(|| xs[p] - xs[left - 1]);
            let right_dx = (right < n).then(|| xs[right] - xs[p]);
            let (q, dx) = match (left_dx, right_dx) {
                (Some(l), Some(r)) if l <= r => (left - 1, l),
                (Some(_), Some(r)) => (right, r),
                (Some(l), None) => (left - 1, l),
                (None, Some(r)) => (right, r),
                (None, None) => break,
            };
            if heap.len() == k && heap.peek().map_or(false, |top| dx > top.0) {
                break;
            }
            if q < p {
                left -= 1;
            } else {
                right += 1;
            }
            let d = dx.max((ys[q] - ys[p]).abs());
            if heap.len() < k {
                heap.push(Distance(d));
            } else if heap.peek().map_or(false, |top| d < top.0) {
                heap.pop();
                heap.push(Distance(d));
            }
        }
        out[order[p]] = heap.peek().map_or(0.0, |top| top.0);
    }
    out
}

/// Distance from the point at `pos` of ascending `sorted` to its `k`-th
/// nearest neighbour on the line.
fn kth_gap_on_line(sorted: &[f64], pos: usize, k: usize) -> f64 {
    let mut left = pos;
    let mut right = pos + 1;
    let mut last = 0.0;
    for _ in 0..k {
        let left_gap = (left > 0).then(|| sorted[pos] - sorted[left - 1]);
        let right_gap = (right < sorted.len()).then(|| sorted[right] - sorted[pos]);
        match (left_gap, right_gap) {
            (Some(l), Some(r)) if l <= r => {
                last = l;
                left -= 1;
            }
            (Some(_), Some(r)) => {
                last = r;
                right += 1;
            }
            (Some(l), None) => {
                last = l;
                left -= 1;
            }
            (None, Some(r)) => {
                last = r;
                right += 1;
            }
            (None, None) => break,
        }
    }
    last
}

/// KSG estimator for two continuous columns.
pub(crate) fn mi_continuous_continuous(x: &[f64], y: &[f64], k: usize) -> f64 {
    let n = x.len();
    if n <= k {
        return 0.0;
    }
    let radii = chebyshev_kth_distances(x, y, k);
    let xs = sorted_copy(x);
    let ys = sorted_copy(y);

    let mut marginal = 0.0;
    for i in 0..n {
        let r = shrink_radius(radii[i]);
        let nx = count_within(&xs, x[i], r).saturating_sub(1);
        let ny = count_within(&ys, y[i], r).saturating_sub(1);
        marginal += digamma(nx as f64 + 1.0) + digamma(ny as f64 + 1.0);
    }
    let mi = digamma(n as f64) + digamma(k as f64) - marginal / n as f64;
    mi.max(0.0)
}

/// Ross estimator for a continuous column against discrete labels.
pub(crate) fn mi_continuous_discrete(c: &[f64], labels: &LabelColumn, k: usize) -> f64 {
    let n = c.len();
    let mut radius = vec![0.0; n];
    let mut k_used = vec![0usize; n];

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); labels.n_classes()];
    for (idx, &class) in labels.ids.iter().enumerate() {
        members[class].push(idx);
    }
    for group in members.iter_mut().filter(|g| g.len() > 1) {
        let kk = k.min(group.len() - 1);
        group.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
        let values: Vec<f64> = group.iter().map(|&i| c[i]).collect();
        for (pos, &idx) in group.iter().enumerate() {
            radius[idx] = shrink_radius(kth_gap_on_line(&values, pos, kk));
            k_used[idx] = kk;
        }
    }

    let kept: Vec<usize> = (0..n)
        .filter(|&i| labels.counts[labels.ids[i]] > 1)
        .collect();
    if kept.is_empty() {
        return 0.0;
    }
    let kept_values: Vec<f64> = sorted_copy(&kept.iter().map(|&i| c[i]).collect::<Vec<_>>());

    let m = kept.len() as f64;
    let mut mean_k = 0.0;
    let mut mean_label = 0.0;
    let mut mean_m = 0.0;
    for &i in &kept {
        mean_k += digamma(k_used[i] as f64);
        mean_label += digamma(labels.counts[labels.ids[i]] as f64);
        mean_m += digamma(count_within(&kept_values, c[i], radius[i]) as f64);
    }
    let mi = digamma(m) + (mean_k - mean_label - mean_m) / m;
    mi.max(0.0)
}
