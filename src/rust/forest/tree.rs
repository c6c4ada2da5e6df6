//! CART decision tree over dense `f64` features with weighted Gini impurity.
//!
//! Nodes are stored flat; children are referenced by index. Samples with
//! `feature value <= threshold` go left.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::MaxFeatures;

/// Values closer than this are treated as equal when searching thresholds.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Allowed deviation of a leaf distribution's sum from 1.
const LEAF_SUM_TOLERANCE: f64 = 1e-6;

/// Stopping and sampling rules for a single tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Class probabilities at this leaf (weighted class frequencies)
        distribution: Vec<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    n_classes: usize,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Grows a tree on the rows of `x` whose weight is positive.
    ///
    /// `y` holds class indices in `0..n_classes`; `weights` is the per-row
    /// sample weight (bootstrap multiplicity times class weight).
    pub fn fit<R: Rng>(
        x: ArrayView2<f64>,
        y: &[usize],
        weights: &[f64],
        n_classes: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let samples: Vec<usize> = (0..x.nrows()).filter(|&i| weights[i] > 0.0).collect();
        let mut builder = TreeBuilder {
            x,
            y,
            weights,
            n_classes,
            params,
            max_features: params.max_features.resolve(x.ncols()),
            nodes: Vec::new(),
        };
        builder.grow(samples, 0, rng);
        Self {
            n_classes,
            nodes: builder.nodes,
        }
    }

    /// Builds a tree from explicit nodes; node 0 is the root.
    pub fn from_nodes(n_classes: usize, nodes: Vec<Node>) -> Result<Self, String> {
        let tree = Self { n_classes, nodes };
        tree.validate()?;
        Ok(tree)
    }

    /// Checks that children point forward inside the node list and that every
    /// leaf is a probability distribution over all classes.
    pub fn validate(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        let len = self.nodes.len();
        for (idx, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    threshold, left, right, ..
                } => {
                    if *left >= len || *right >= len || *left <= idx || *right <= idx {
                        return Err(format!("node {} has invalid children ({}, {})", idx, left, right));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {} has a NaN threshold", idx));
                    }
                }
                Node::Leaf { distribution } => {
                    if distribution.len() != self.n_classes {
                        return Err(format!(
                            "leaf {} has {} classes, expected {}",
                            idx,
                            distribution.len(),
                            self.n_classes
                        ));
                    }
                    if distribution.iter().any(|p| !(0.0..=1.0).contains(p)) {
                        return Err(format!("leaf {} has a probability outside [0, 1]", idx));
                    }
                    let sum: f64 = distribution.iter().sum();
                    if (sum - 1.0).abs() > LEAF_SUM_TOLERANCE {
                        return Err(format!("leaf {} sums to {}", idx, sum));
                    }
                }
            }
        }
        Ok(())
    }

    /// Checks that every split reads a column of a `n_features`-wide row.
    pub fn validate_features(&self, n_features: usize) -> Result<(), String> {
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split { feature, .. } = node {
                if *feature >= n_features {
                    return Err(format!(
                        "node {} splits on feature {} but rows have {} features",
                        idx, feature, n_features
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf { .. })).count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    /// Class distribution of the leaf reached by `row`.
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut idx = 0usize;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { distribution } => return distribution,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(0.0);
                    idx = if value <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

struct TreeBuilder<'a, 'x> {
    x: ArrayView2<'x, f64>,
    y: &'a [usize],
    weights: &'a [f64],
    n_classes: usize,
    params: &'a TreeParams,
    max_features: usize,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    proxy: f64,
}

impl<'a, 'x> TreeBuilder<'a, 'x> {
    fn class_totals(&self, samples: &[usize]) -> Vec<f64> {
        let mut totals = vec![0.0; self.n_classes];
        for &i in samples {
            totals[self.y[i]] += self.weights[i];
        }
        totals
    }

    fn leaf(&mut self, totals: Vec<f64>) -> usize {
        let sum: f64 = totals.iter().sum();
        let distribution = if sum > 0.0 {
            totals.iter().map(|t| t / sum).collect()
        } else {
            vec![1.0 / self.n_classes as f64; self.n_classes]
        };
        self.nodes.push(Node::Leaf { distribution });
        self.nodes.len() - 1
    }

    fn grow<R: Rng>(&mut self, samples: Vec<usize>, depth: usize, rng: &mut R) -> usize {
        let totals = self.class_totals(&samples);
        let n = samples.len();
        let at_max_depth = self.params.max_depth.map_or(false, |d| depth >= d);
        let pure = totals.iter().filter(|&&t| t > 0.0).count() <= 1;

        if at_max_depth
            || pure
            || n < self.params.min_samples_split
            || n < 2 * self.params.min_samples_leaf.max(1)
        {
            return self.leaf(totals);
        }

        let Some(split) = self.best_split(&samples, rng) else {
            return self.leaf(totals);
        };

        let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[[i, split.feature]] <= split.threshold);

        let idx = self.nodes.len();
        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: 0,
            right: 0,
        });
        let left = self.grow(left_samples, depth + 1, rng);
        let right = self.grow(right_samples, depth + 1, rng);
        if let Node::Split {
            left: l, right: r, ..
        } = &mut self.nodes[idx]
        {
            *l = left;
            *r = right;
        }
        idx
    }

    /// Searches a random subset of features for the split maximising the
    /// Gini proxy `sum(left^2)/w_left + sum(right^2)/w_right`.
    ///
    /// Constant features do not count towards `max_features`.
    fn best_split<R: Rng>(&self, samples: &[usize], rng: &mut R) -> Option<SplitCandidate> {
        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let min_leaf = self.params.min_samples_leaf.max(1);
        let n = samples.len();
        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0usize;
        let mut column: Vec<(f64, usize)> = Vec::with_capacity(n);

        for feature in features {
            if visited >= self.max_features {
                break;
            }
            column.clear();
            column.extend(samples.iter().map(|&i| (self.x[[i, feature]], i)));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            if column[n - 1].0 <= column[0].0 + FEATURE_THRESHOLD {
                continue;
            }
            visited += 1;

            let mut left = vec![0.0; self.n_classes];
            let mut right = self.class_totals(samples);
            let mut w_left = 0.0;
            let mut w_right: f64 = right.iter().sum();

            for pos in 0..n - 1 {
                let (value, i) = column[pos];
                let w = self.weights[i];
                left[self.y[i]] += w;
                right[self.y[i]] -= w;
                w_left += w;
                w_right -= w;

                let next = column[pos + 1].0;
                if next <= value + FEATURE_THRESHOLD {
                    continue;
                }
                if pos + 1 < min_leaf || n - pos - 1 < min_leaf {
                    continue;
                }
                if w_left <= 0.0 || w_right <= 0.0 {
                    continue;
                }

                let proxy = left.iter().map(|c| c * c).sum::<f64>() / w_left
                    + right.iter().map(|c| c * c).sum::<f64>() / w_right;
                if best.as_ref().map_or(true, |b| proxy > b.proxy) {
                    let mut threshold = value / 2.0 + next / 2.0;
                    if threshold >= next || !threshold.is_finite() {
                        threshold = value;
                    }
                    best = Some(SplitCandidate {
                        feature,
                        threshold,
                        proxy,
                    });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_separable_data_is_split_once() {
        let x = array![[0.0], [1.0], [2.0], [10.0], [11.0], [12.0]];
        let y = [0, 0, 0, 1, 1, 1];
        let w = [1.0; 6];
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let tree = DecisionTree::fit(x.view(), &y, &w, 2, &TreeParams::default(), &mut rng);

        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.n_leaves(), 2);
        match &tree.nodes()[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert!((threshold - 6.0).abs() < 1e-12);
            }
            other => panic!("expected split, got {:?}", other),
        }
        assert_eq!(tree.predict_proba(array![1.5].view()), &[1.0, 0.0]);
        assert_eq!(tree.predict_proba(array![9.0].view()), &[0.0, 1.0]);
    }

    fn fit_owned(values: Vec<f64>, y: &[usize]) -> DecisionTree {
        let x = Array2::from_shape_vec((values.len(), 1), values).unwrap();
        let weights = vec![1.0; y.len()];
        let params = TreeParams::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        DecisionTree::fit(x.view(), y, &weights, 2, &params, &mut rng)
    }

    #[test]
    fn test_tree_outlives_training_buffers() {
        let tree = fit_owned(vec![0.0, 1.0, 5.0, 6.0], &[0, 0, 1, 1]);
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_proba(array![5.5].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_min_samples_leaf_is_respected() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = [0, 1, 1, 1];
        let w = [1.0; 4];
        let params = TreeParams {
            min_samples_leaf: 2,
            ..TreeParams::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &y, &w, 2, &params, &mut rng);
        // the only admissible split is 2 | 2
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_proba(array![0.0].view()), &[0.5, 0.5]);
        assert_eq!(tree.predict_proba(array![3.0].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_zero_weight_rows_are_ignored() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = [0, 1, 1];
        let w = [0.0, 1.0, 1.0];
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let tree = DecisionTree::fit(x.view(), &y, &w, 2, &TreeParams::default(), &mut rng);
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.predict_proba(array![0.0].view()), &[0.0, 1.0]);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = [0, 1, 0, 1, 0, 1];
        let w = [1.0; 6];
        let params = TreeParams {
            max_depth: Some(1),
            ..TreeParams::default()
        };
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let tree = DecisionTree::fit(x.view(), &y, &w, 2, &params, &mut rng);
        assert!(tree.depth() <= 1);
    }

    #[test]
    fn test_from_nodes_validates_structure() {
        let bad_child = vec![
            Node::Split { feature: 0, threshold: 0.5, left: 1, right: 5 },
            Node::Leaf { distribution: vec![1.0, 0.0] },
        ];
        assert!(DecisionTree::from_nodes(2, bad_child).is_err());

        let bad_leaf = vec![Node::Leaf { distribution: vec![1.0] }];
        assert!(DecisionTree::from_nodes(2, bad_leaf).is_err());
    }

    #[test]
    fn test_leaves_must_be_distributions() {
        let unnormalised = vec![Node::Leaf { distribution: vec![0.7, 0.7] }];
        assert!(DecisionTree::from_nodes(2, unnormalised).is_err());

        let negative = vec![Node::Leaf { distribution: vec![1.5, -0.5] }];
        assert!(DecisionTree::from_nodes(2, negative).is_err());

        let nan_threshold = vec![
            Node::Split { feature: 0, threshold: f64::NAN, left: 1, right: 2 },
            Node::Leaf { distribution: vec![1.0, 0.0] },
            Node::Leaf { distribution: vec![0.0, 1.0] },
        ];
        assert!(DecisionTree::from_nodes(2, nan_threshold).is_err());
    }

    #[test]
    fn test_split_features_must_fit_the_row() {
        let tree = DecisionTree::from_nodes(
            2,
            vec![
                Node::Split { feature: 3, threshold: 0.5, left: 1, right: 2 },
                Node::Leaf { distribution: vec![1.0, 0.0] },
                Node::Leaf { distribution: vec![0.0, 1.0] },
            ],
        )
        .unwrap();
        assert!(tree.validate_features(4).is_ok());
        assert!(tree.validate_features(3).is_err());
    }
}
