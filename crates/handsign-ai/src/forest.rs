//! Random forest of CART trees with Gini impurity and bootstrap sampling.
//!
//! Trees are stored as flat node arenas. Each tree draws its bootstrap sample
//! and candidate features from its own RNG, seeded from the forest seed, so a
//! given table and seed always produce the same forest.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use handsign_core::{DEFAULT_SEED, DEFAULT_TEST_FRACTION};

use crate::network::argmax;

/// Hyperparameters of the ensemble harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestConfig {
    pub n_trees: usize,
    /// Candidate features per split; `None` means `floor(sqrt(n_features))`.
    pub max_features: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub bootstrap: bool,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_features: None,
            max_depth: None,
            min_samples_split: 2,
            bootstrap: true,
            test_fraction: DEFAULT_TEST_FRACTION,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestConfig {
    fn features_per_split(&self, n_features: usize) -> usize {
        self.max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize)
            .clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    /// Class distribution of the training rows that reached this leaf.
    Leaf { distribution: Vec<f32> },
    /// Rows with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Leaf distribution reached by `features`.
    pub fn distribution(&self, features: &[f32]) -> &[f32] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], index: usize) -> usize {
            match &nodes[index] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        if self.nodes.is_empty() { 0 } else { walk(&self.nodes, 0) }
    }

    /// Indices in range and children after their parents.
    fn is_well_formed(&self, n_features: usize, n_classes: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { distribution } => distribution.len() == n_classes,
                Node::Split {
                    feature,
                    left,
                    right,
                    ..
                } => {
                    *feature < n_features
                        && *left > i
                        && *right > i
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

struct TreeBuilder<'a> {
    x: ArrayView2<'a, f32>,
    y: &'a [usize],
    n_classes: usize,
    max_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    rng: StdRng,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    impurity: f32,
}

impl TreeBuilder<'_> {
    fn class_counts(&self, samples: &[usize]) -> Vec<usize> {
        let mut counts = vec![0usize; self.n_classes];
        for &s in samples {
            counts[self.y[s]] += 1;
        }
        counts
    }

    fn leaf(&self, counts: &[usize]) -> Node {
        let total: usize = counts.iter().sum();
        let distribution = counts
            .iter()
            .map(|&c| if total == 0 { 0.0 } else { c as f32 / total as f32 })
            .collect();
        Node::Leaf { distribution }
    }

    /// Grow the subtree for `samples` and return its root index.
    fn grow(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let index = self.nodes.len();
        let counts = self.class_counts(samples);
        let leaf = self.leaf(&counts);
        self.nodes.push(leaf);

        let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if pure || depth_reached || samples.len() < self.min_samples_split {
            return index;
        }

        let Some(split) = self.best_split(samples, &counts) else {
            return index;
        };

        let mid = partition(samples, |s| self.x[[s, split.feature]] <= split.threshold);
        if mid == 0 || mid == samples.len() {
            return index;
        }
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.grow(left_samples, depth + 1);
        let right = self.grow(right_samples, depth + 1);
        self.nodes[index] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        index
    }

    /// Best Gini split over a random subset of features.
    ///
    /// Constant features are skipped without counting toward `max_features`,
    /// so more features are examined when the sampled ones cannot separate
    /// the node. Candidates with a non-finite threshold are never chosen.
    fn best_split(&mut self, samples: &[usize], counts: &[usize]) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(&mut self.rng);

        let n = samples.len() as f32;
        let mut best: Option<BestSplit> = None;
        let mut examined = 0;
        let mut column: Vec<(f32, usize)> = Vec::with_capacity(samples.len());

        for feature in features {
            if examined >= self.max_features {
                break;
            }
            column.clear();
            column.extend(samples.iter().map(|&s| (self.x[[s, feature]], self.y[s])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));
            if column[0].0 >= column[column.len() - 1].0 {
                continue;
            }
            examined += 1;

            let mut left = vec![0usize; self.n_classes];
            let mut right = counts.to_vec();
            for i in 0..column.len() - 1 {
                let (value, class) = column[i];
                left[class] += 1;
                right[class] -= 1;
                let next = column[i + 1].0;
                if value >= next {
                    continue;
                }
                let mut threshold = value + (next - value) / 2.0;
                if threshold >= next {
                    threshold = value;
                }
                if !threshold.is_finite() {
                    continue;
                }
                let n_left = (i + 1) as f32;
                let impurity =
                    (n_left * gini(&left) + (n - n_left) * gini(&right)) / n;
                if best.as_ref().is_none_or(|b| impurity < b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        impurity,
                    });
                }
            }
        }
        best
    }
}

fn gini(counts: &[usize]) -> f32 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f32;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f32 / total;
            p * p
        })
        .sum::<f32>()
}

/// Reorder `items` so those matching `pred` come first; returns their count.
fn partition(items: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for i in 0..items.len() {
        if pred(items[i]) {
            items.swap(i, mid);
            mid += 1;
        }
    }
    mid
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit a forest on rows of `x` labeled with codes `y` in `0..n_classes`.
    pub fn fit<'a>(
        x: ArrayView2<'a, f32>,
        y: &'a [usize],
        n_classes: usize,
        config: &ForestConfig,
    ) -> Self {
        let n_rows = x.nrows();
        let n_features = x.ncols();
        let max_features = config.features_per_split(n_features);
        let mut seeder = StdRng::seed_from_u64(config.seed);

        let trees = (0..config.n_trees)
            .map(|t| {
                let mut rng = StdRng::seed_from_u64(seeder.r#gen());
                let mut samples: Vec<usize> = if config.bootstrap {
                    (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect()
                } else {
                    (0..n_rows).collect()
                };

                let mut builder = TreeBuilder {
                    x,
                    y,
                    n_classes,
                    max_features,
                    max_depth: config.max_depth,
                    min_samples_split: config.min_samples_split.max(2),
                    rng,
                    nodes: Vec::new(),
                };
                builder.grow(&mut samples, 0);
                let tree = DecisionTree {
                    nodes: builder.nodes,
                };
                debug!(tree = t, nodes = tree.node_count(), depth = tree.depth(), "grew tree");
                tree
            })
            .collect();

        Self {
            n_features,
            n_classes,
            trees,
        }
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn num_classes(&self) -> usize {
        self.n_classes
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean of the per-tree leaf distributions.
    pub fn predict_proba(&self, features: &[f32]) -> Vec<f32> {
        let mut total = vec![0.0f32; self.n_classes];
        for tree in &self.trees {
            for (t, &p) in total.iter_mut().zip(tree.distribution(features)) {
                *t += p;
            }
        }
        if !self.trees.is_empty() {
            let n = self.trees.len() as f32;
            total.iter_mut().for_each(|t| *t /= n);
        }
        total
    }

    /// Most probable class; ties go to the lower code.
    pub fn predict(&self, features: &[f32]) -> usize {
        argmax(self.predict_proba(features))
    }

    /// Fraction of rows whose predicted class matches `y`.
    pub fn score(&self, x: ArrayView2<f32>, y: &[usize]) -> f32 {
        if y.is_empty() {
            return 0.0;
        }
        let correct = x
            .rows()
            .into_iter()
            .zip(y)
            .filter(|(row, label)| self.predict(&row.to_vec()) == **label)
            .count();
        correct as f32 / y.len() as f32
    }

    /// Structural check after deserialization.
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.trees.is_empty()
            && self
                .trees
                .iter()
                .all(|t| t.is_well_formed(self.n_features, self.n_classes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn table(rows: &[(f32, f32, usize)]) -> (Array2<f32>, Vec<usize>) {
        let x = Array2::from_shape_fn((rows.len(), 2), |(i, j)| {
            if j == 0 { rows[i].0 } else { rows[i].1 }
        });
        (x, rows.iter().map(|r| r.2).collect())
    }

    /// Two tight clusters, separable on either feature.
    fn clusters() -> (Array2<f32>, Vec<usize>) {
        table(&[
            (-1.0, -0.95, 0),
            (-0.95, -1.0, 0),
            (-0.9, -0.9, 0),
            (-0.92, -0.97, 0),
            (0.9, 0.95, 1),
            (0.95, 0.9, 1),
            (1.0, 1.0, 1),
            (0.97, 0.92, 1),
        ])
    }

    fn noisy_first_feature() -> (Array2<f32>, Vec<usize>) {
        // Class depends on the sign of feature 1 only; feature 0 is noise.
        table(&[
            (0.3, -1.0, 0),
            (0.9, -0.8, 0),
            (0.1, -0.5, 0),
            (0.5, -0.2, 0),
            (0.2, 0.2, 1),
            (0.8, 0.4, 1),
            (0.4, 0.7, 1),
            (0.6, 1.0, 1),
        ])
    }

    fn small() -> ForestConfig {
        ForestConfig {
            n_trees: 10,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn default_matches_harness_constants() {
        let config = ForestConfig::default();
        assert_eq!(config.n_trees, 100);
        assert_eq!(config.seed, 42);
        assert_eq!(config.features_per_split(63), 7);
        assert_eq!(config.features_per_split(1), 1);
    }

    #[test]
    fn gini_of_pure_and_even_nodes() {
        assert_eq!(gini(&[5, 0]), 0.0);
        assert!((gini(&[5, 5]) - 0.5).abs() < 1e-6);
        assert_eq!(gini(&[]), 0.0);
    }

    #[test]
    fn partition_moves_matches_first() {
        let mut items = vec![5, 2, 8, 1, 9];
        let mid = partition(&mut items, |v| v < 5);
        assert_eq!(mid, 2);
        assert!(items[..mid].iter().all(|&v| v < 5));
        assert!(items[mid..].iter().all(|&v| v >= 5));
    }

    #[test]
    fn single_tree_separates_on_midpoint() {
        let (x, y) = noisy_first_feature();
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            max_features: Some(2),
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(x.view(), &y, 2, &config);
        let tree = &forest.trees()[0];
        assert_eq!(tree.node_count(), 3);
        match &tree.nodes[0] {
            Node::Split {
                feature, threshold, ..
            } => {
                assert_eq!(*feature, 1);
                assert!((threshold - 0.0).abs() < 1e-6);
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn forest_fits_training_data() {
        let (x, y) = clusters();
        let forest = RandomForest::fit(x.view(), &y, 2, &small());
        assert_eq!(forest.trees().len(), 10);
        assert_eq!(forest.score(x.view(), &y), 1.0);
        assert!(forest.is_well_formed());
    }

    #[test]
    fn probabilities_are_averaged_distributions() {
        let (x, y) = clusters();
        let forest = RandomForest::fit(x.view(), &y, 2, &small());
        let probs = forest.predict_proba(&[0.95, 0.95]);
        assert_eq!(probs.len(), 2);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn constant_features_yield_single_leaf() {
        let x = Array2::from_elem((4, 3), 1.0f32);
        let y = vec![0, 1, 0, 1];
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(x.view(), &y, 2, &config);
        assert_eq!(forest.trees()[0].node_count(), 1);
        // Even split: the lower code wins.
        assert_eq!(forest.predict(&[1.0, 1.0, 1.0]), 0);
    }

    #[test]
    fn same_seed_same_forest() {
        let (x, y) = clusters();
        let a = RandomForest::fit(x.view(), &y, 2, &small());
        let b = RandomForest::fit(x.view(), &y, 2, &small());
        assert_eq!(a, b);

        let other = ForestConfig {
            seed: 7,
            ..small()
        };
        let c = RandomForest::fit(x.view(), &y, 2, &other);
        assert_eq!(c.trees().len(), 10);
    }

    #[test]
    fn max_depth_limits_growth() {
        let (x, y) = clusters();
        let config = ForestConfig {
            max_depth: Some(0),
            ..small()
        };
        let forest = RandomForest::fit(x.view(), &y, 2, &config);
        assert!(forest.trees().iter().all(|t| t.node_count() == 1));
    }

    #[test]
    fn rejects_out_of_range_children() {
        let forest = RandomForest {
            n_features: 2,
            n_classes: 2,
            trees: vec![DecisionTree {
                nodes: vec![Node::Split {
                    feature: 0,
                    threshold: 0.5,
                    left: 1,
                    right: 9,
                }],
            }],
        };
        assert!(!forest.is_well_formed());
    }

    #[test]
    fn non_finite_values_never_become_thresholds() {
        let (x, y) = table(&[
            (0.1, 0.0, 0),
            (0.2, 0.0, 0),
            (0.3, 0.0, 0),
            (f32::NAN, 0.0, 1),
            (f32::NAN, 0.0, 1),
            (f32::INFINITY, 0.0, 1),
        ]);
        let config = ForestConfig {
            n_trees: 1,
            bootstrap: false,
            max_features: Some(2),
            ..ForestConfig::default()
        };
        let forest = RandomForest::fit(x.view(), &y, 2, &config);
        let tree = &forest.trees()[0];
        assert!(forest.is_well_formed());
        for node in &tree.nodes {
            if let Node::Split { threshold, .. } = node {
                assert!(threshold.is_finite(), "threshold {threshold}");
            }
        }
        assert_eq!(forest.predict(&[0.1, 0.0]), 0);
    }
}
