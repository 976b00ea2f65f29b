// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! CART trees shared by the ensembles.
//!
//! Regression trees (squared error) back gradient boosting, gini trees back
//! the random forest. Feature importances accumulate the weighted impurity
//! decrease of every split.

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Values closer than this are treated as equal when placing thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;
const MIN_IMPURITY: f64 = 1e-12;

#[derive(Clone, Debug)]
pub(crate) struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of non-constant features examined per split (`None` = all).
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum Target<'a> {
    Regression(&'a [f64]),
    Classification {
        classes: &'a [usize],
        n_classes: usize,
    },
}

impl Target<'_> {
    fn width(&self) -> usize {
        match self {
            Target::Regression(_) => 2,
            Target::Classification { n_classes, .. } => *n_classes,
        }
    }
}

/// Weighted sufficient statistics of a set of samples.
///
/// Regression keeps `[Σw·y, Σw·y²]`, classification keeps per-class weight.
#[derive(Clone, Debug)]
struct Stats {
    weight: f64,
    count: usize,
    sums: Vec<f64>,
}

impl Stats {
    fn empty(width: usize) -> Self {
        Self {
            weight: 0.0,
            count: 0,
            sums: vec![0.0; width],
        }
    }

    fn add(&mut self, target: &Target<'_>, sample: usize, w: f64) {
        self.weight += w;
        self.count += 1;
        match target {
            Target::Regression(y) => {
                self.sums[0] += w * y[sample];
                self.sums[1] += w * y[sample] * y[sample];
            }
            Target::Classification { classes, .. } => self.sums[classes[sample]] += w,
        }
    }

    fn impurity(&self, target: &Target<'_>) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        match target {
            Target::Regression(_) => {
                let mean = self.sums[0] / self.weight;
                (self.sums[1] / self.weight - mean * mean).max(0.0)
            }
            Target::Classification { .. } => {
                1.0 - self
                    .sums
                    .iter()
                    .map(|c| (c / self.weight).powi(2))
                    .sum::<f64>()
            }
        }
    }

    /// Monotone proxy of the negated child impurity used to rank splits.
    fn proxy(&self, target: &Target<'_>) -> f64 {
        if self.weight <= 0.0 {
            return 0.0;
        }
        match target {
            Target::Regression(_) => self.sums[0] * self.sums[0] / self.weight,
            Target::Classification { .. } => {
                self.sums.iter().map(|c| c * c).sum::<f64>() / self.weight
            }
        }
    }

    fn leaf_value(&self, target: &Target<'_>) -> Vec<f64> {
        match target {
            Target::Regression(_) => {
                vec![if self.weight > 0.0 {
                    self.sums[0] / self.weight
                } else {
                    0.0
                }]
            }
            Target::Classification { .. } => self
                .sums
                .iter()
                .map(|c| if self.weight > 0.0 { c / self.weight } else { 0.0 })
                .collect(),
        }
    }

    fn difference(&self, other: &Stats) -> Stats {
        Stats {
            weight: self.weight - other.weight,
            count: self.count - other.count,
            sums: self
                .sums
                .iter()
                .zip(other.sums.iter())
                .map(|(a, b)| a - b)
                .collect(),
        }
    }
}

#[derive(Clone, Debug)]
enum Node {
    Leaf {
        value: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// Per-feature sample orderings computed once per ensemble fit.
#[derive(Clone, Debug)]
pub(crate) struct Presorted {
    orders: Vec<Vec<usize>>,
}

impl Presorted {
    pub fn new(features: ArrayView2<'_, f64>) -> Self {
        let orders = (0..features.ncols())
            .map(|f| {
                let column = features.column(f);
                let mut order: Vec<usize> = (0..features.nrows()).collect();
                order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
                order
            })
            .collect();
        Self { orders }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    proxy: f64,
}

struct Builder<'a> {
    features: ArrayView2<'a, f64>,
    target: Target<'a>,
    weights: &'a [f64],
    presorted: &'a Presorted,
    config: &'a TreeConfig,
    in_node: Vec<bool>,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl<'a> Builder<'a> {
    fn stats_of(&self, samples: &[usize]) -> Stats {
        let mut stats = Stats::empty(self.target.width());
        for &s in samples {
            stats.add(&self.target, s, self.weights[s]);
        }
        stats
    }

    fn sorted_samples(&mut self, samples: &[usize], feature: usize) -> Vec<usize> {
        let n_total = self.features.nrows();
        if samples.len() * 16 < n_total {
            let column = self.features.column(feature);
            let mut sorted = samples.to_vec();
            sorted.sort_by(|&a, &b| column[a].total_cmp(&column[b]));
            sorted
        } else {
            for &s in samples {
                self.in_node[s] = true;
            }
            let sorted = self.presorted.orders[feature]
                .iter()
                .copied()
                .filter(|&s| self.in_node[s])
                .collect();
            for &s in samples {
                self.in_node[s] = false;
            }
            sorted
        }
    }

    fn best_split_on(
        &mut self,
        samples: &[usize],
        feature: usize,
        total: &Stats,
    ) -> Option<SplitCandidate> {
        let sorted = self.sorted_samples(samples, feature);
        let column = self.features.column(feature);
        let min_leaf = self.config.min_samples_leaf.max(1);
        let mut left = Stats::empty(self.target.width());
        let mut best: Option<SplitCandidate> = None;
        for pos in 0..sorted.len() - 1 {
            let s = sorted[pos];
            left.add(&self.target, s, self.weights[s]);
            let here = column[s];
            let next = column[sorted[pos + 1]];
            if next <= here + FEATURE_THRESHOLD {
                continue;
            }
            if left.count < min_leaf || total.count - left.count < min_leaf {
                continue;
            }
            let right = total.difference(&left);
            if left.weight <= 0.0 || right.weight <= 0.0 {
                continue;
            }
            let proxy = left.proxy(&self.target) + right.proxy(&self.target);
            if best.as_ref().map_or(true, |b| proxy > b.proxy) {
                let mut threshold = here + (next - here) / 2.0;
                if threshold >= next {
                    threshold = here;
                }
                best = Some(SplitCandidate {
                    feature,
                    threshold,
                    proxy,
                });
            }
        }
        best
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize, rng: &mut StdRng) -> usize {
        let stats = self.stats_of(&samples);
        let impurity = stats.impurity(&self.target);
        let depth_exhausted = self.config.max_depth.map_or(false, |max| depth >= max);
        if depth_exhausted
            || samples.len() < self.config.min_samples_split.max(2)
            || samples.len() < 2 * self.config.min_samples_leaf.max(1)
            || impurity <= MIN_IMPURITY
        {
            return self.push_leaf(stats.leaf_value(&self.target));
        }

        let mut candidates: Vec<usize> = (0..self.features.ncols()).collect();
        if self.config.max_features.is_some() {
            candidates.shuffle(rng);
        }
        let budget = self
            .config
            .max_features
            .unwrap_or(candidates.len())
            .max(1);

        let mut visited = 0;
        let mut best: Option<SplitCandidate> = None;
        for feature in candidates {
            if visited >= budget {
                break;
            }
            let column = self.features.column(feature);
            let (lo, hi) = samples.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |acc, &s| {
                (acc.0.min(column[s]), acc.1.max(column[s]))
            });
            if hi <= lo + FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;
            if let Some(candidate) = self.best_split_on(&samples, feature, &stats) {
                if best.as_ref().map_or(true, |b| candidate.proxy > b.proxy) {
                    best = Some(candidate);
                }
            }
        }

        let Some(split) = best else {
            return self.push_leaf(stats.leaf_value(&self.target));
        };

        let column = self.features.column(split.feature);
        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&s| column[s] <= split.threshold);
        let left_stats = self.stats_of(&left_samples);
        let right_stats = stats.difference(&left_stats);
        let decrease = stats.weight * impurity
            - left_stats.weight * left_stats.impurity(&self.target)
            - right_stats.weight * right_stats.impurity(&self.target);
        self.importances[split.feature] += decrease.max(0.0);

        let index = self.nodes.len();
        self.nodes.push(Node::Leaf { value: Vec::new() });
        let left = self.build(left_samples, depth + 1, rng);
        let right = self.build(right_samples, depth + 1, rng);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    fn push_leaf(&mut self, value: Vec<f64>) -> usize {
        self.nodes.push(Node::Leaf { value });
        self.nodes.len() - 1
    }
}

/// Fitted CART tree.
#[derive(Clone, Debug)]
pub(crate) struct DecisionTree {
    nodes: Vec<Node>,
    importances: Vec<f64>,
    root_weight: f64,
}

impl DecisionTree {
    /// Grows a tree on the samples with positive weight.
    pub fn fit(
        features: ArrayView2<'_, f64>,
        target: Target<'_>,
        weights: &[f64],
        presorted: &Presorted,
        config: &TreeConfig,
        rng: &mut StdRng,
    ) -> Self {
        let n = features.nrows();
        let samples: Vec<usize> = (0..n).filter(|&s| weights[s] > 0.0).collect();
        let mut builder = Builder {
            features: features.view(),
            target,
            weights,
            presorted,
            config,
            in_node: vec![false; n],
            nodes: Vec::new(),
            importances: vec![0.0; features.ncols()],
        };
        let root_weight = samples.iter().map(|&s| weights[s]).sum::<f64>();
        builder.build(samples, 0, rng);
        Self {
            nodes: builder.nodes,
            importances: builder.importances,
            root_weight,
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Index of the leaf reached by `row`.
    pub fn apply(&self, row: ArrayView1<'_, f64>) -> usize {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { .. } => return index,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> &[f64] {
        match &self.nodes[self.apply(row)] {
            Node::Leaf { value } => value.as_slice(),
            Node::Split { .. } => &[],
        }
    }

    pub fn set_leaf_value(&mut self, leaf: usize, value: Vec<f64>) {
        if let Some(Node::Leaf { value: slot }) = self.nodes.get_mut(leaf) {
            *slot = value;
        }
    }

    /// Impurity decrease per feature divided by the root weight.
    pub fn raw_importances(&self) -> Vec<f64> {
        if self.root_weight <= 0.0 {
            return vec![0.0; self.importances.len()];
        }
        self.importances
            .iter()
            .map(|v| v / self.root_weight)
            .collect()
    }

    /// [`Self::raw_importances`] rescaled to sum to 1 (zeros for a stump).
    pub fn normalized_importances(&self) -> Vec<f64> {
        let raw = self.raw_importances();
        let total: f64 = raw.iter().sum();
        if total > 0.0 {
            raw.into_iter().map(|v| v / total).collect()
        } else {
            raw
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::SeedableRng;

    #[test]
    fn regression_tree_splits_on_the_informative_feature() {
        let x = array![[0.0, 5.0], [1.0, 3.0], [2.0, 5.0], [3.0, 3.0]];
        let y = [0.0, 0.0, 10.0, 10.0];
        let presorted = Presorted::new(x.view());
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(
            x.view(),
            Target::Regression(&y),
            &[1.0; 4],
            &presorted,
            &TreeConfig {
                max_depth: Some(1),
                ..TreeConfig::default()
            },
            &mut rng,
        );
        assert_eq!(tree.node_count(), 3);
        assert_eq!(tree.predict_row(x.row(0)), &[0.0]);
        assert_eq!(tree.predict_row(x.row(3)), &[10.0]);
        let imp = tree.normalized_importances();
        assert_eq!(imp, vec![1.0, 0.0]);
    }

    #[test]
    fn gini_tree_separates_classes_and_reports_probabilities() {
        let x = Array2::from_shape_fn((9, 1), |(r, _)| r as f64);
        let classes: Vec<usize> = (0..9).map(|r| r / 3).collect();
        let presorted = Presorted::new(x.view());
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(
            x.view(),
            Target::Classification {
                classes: &classes,
                n_classes: 3,
            },
            &[1.0; 9],
            &presorted,
            &TreeConfig::default(),
            &mut rng,
        );
        for r in 0..9 {
            let proba = tree.predict_row(x.row(r));
            assert_eq!(proba[classes[r]], 1.0);
        }
    }

    #[test]
    fn zero_weight_samples_are_ignored() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [1.0, 1.0, 100.0, 1.0];
        let presorted = Presorted::new(x.view());
        let mut rng = StdRng::seed_from_u64(2);
        let tree = DecisionTree::fit(
            x.view(),
            Target::Regression(&y),
            &[1.0, 1.0, 0.0, 2.0],
            &presorted,
            &TreeConfig::default(),
            &mut rng,
        );
        assert_eq!(tree.node_count(), 1);
        assert_eq!(tree.normalized_importances(), vec![0.0]);
    }
}
