// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Mutual Information Gap over discretised codes.

use crate::information::discrete::{discrete_entropy, discrete_mutual_info};
use crate::{MetricsError, Result};
use ndarray::{Array1, Array2, Axis};
use tracing::{debug, warn};

/// Entropy-normalised gap between the two most informative codes, one value
/// per factor.
pub fn mutual_info_gap_per_factor(
    representations: &Array2<i64>,
    factors: &Array2<i64>,
) -> Result<Array1<f64>> {
    let mi = discrete_mutual_info(representations, factors)?;
    if mi.nrows() < 2 {
        return Err(MetricsError::InvalidArgument(format!(
            "mutual information gap needs at least two codes, got {}",
            mi.nrows()
        )));
    }
    let entropy = discrete_entropy(factors);
    let gaps = mi
        .axis_iter(Axis(1))
        .zip(entropy.iter())
        .enumerate()
        .map(|(j, (column, &h))| {
            if h <= 0.0 {
                warn!(factor = j, "factor has zero entropy, gap set to 0");
                return 0.0;
            }
            let mut sorted = column.to_vec();
            sorted.sort_by(|a, b| b.total_cmp(a));
            (sorted[0] - sorted[1]) / h
        })
        .collect();
    Ok(gaps)
}

/// Mean of [`mutual_info_gap_per_factor`].
pub fn mutual_info_gap(representations: &Array2<i64>, factors: &Array2<i64>) -> Result<f64> {
    let gaps = mutual_info_gap_per_factor(representations, factors)?;
    let mig = gaps.mean().unwrap_or(0.0);
    debug!(mig, factors = gaps.len(), "mutual information gap");
    Ok(mig)
}
