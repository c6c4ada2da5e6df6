//! Random forest classifier: bootstrap-aggregated CART trees with per-split
//! feature subsampling and optional balanced class weighting.

mod tree;

pub use tree::{DecisionTree, Node, TreeParams};

use log::debug;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ForestError {
    #[error("cannot fit a forest on an empty training set")]
    EmptyTrainingSet,
    #[error("feature matrix has {rows} rows but {labels} labels were given")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("label index {label} is out of range for {n_classes} classes")]
    LabelOutOfRange { label: usize, n_classes: usize },
    #[error("invalid forest parameters: {0}")]
    InvalidParams(String),
}

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            Self::Sqrt => (n_features as f64).sqrt() as usize,
            Self::Log2 => (n_features as f64).log2() as usize,
            Self::All => n_features,
            Self::Fixed(k) => *k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Per-class sample weighting applied before bootstrap multiplicities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassWeight {
    /// Every sample weighs 1
    Uniform,
    /// Class `c` weighs `n_samples / (n_present_classes * count_c)`
    Balanced,
}

impl ClassWeight {
    pub fn weights(&self, y: &[usize], n_classes: usize) -> Vec<f64> {
        match self {
            Self::Uniform => vec![1.0; n_classes],
            Self::Balanced => {
                let mut counts = vec![0usize; n_classes];
                for &label in y {
                    counts[label] += 1;
                }
                let present = counts.iter().filter(|&&c| c > 0).count().max(1);
                counts
                    .iter()
                    .map(|&c| {
                        if c == 0 {
                            0.0
                        } else {
                            y.len() as f64 / (present as f64 * c as f64)
                        }
                    })
                    .collect()
            }
        }
    }
}

/// Forest hyperparameters. Defaults are those the CARF models are trained with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub class_weight: ClassWeight,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(20),
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            class_weight: ClassWeight::Balanced,
            seed: 42,
        }
    }
}

impl ForestParams {
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.n_estimators == 0 {
            return Err(ForestError::InvalidParams("n_estimators must be positive".into()));
        }
        if self.min_samples_split < 2 {
            return Err(ForestError::InvalidParams("min_samples_split must be at least 2".into()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForestError::InvalidParams("min_samples_leaf must be positive".into()));
        }
        if let MaxFeatures::Fixed(0) = self.max_features {
            return Err(ForestError::InvalidParams("max_features must be positive".into()));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    n_features: usize,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fits `params.n_estimators` trees on `x` against class indices `y`.
    ///
    /// Tree `t` draws its bootstrap sample and split features from a ChaCha8
    /// stream seeded with `params.seed + t`, so fitting is reproducible.
    pub fn fit(
        x: ArrayView2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &ForestParams,
    ) -> Result<Self, ForestError> {
        params.validate()?;
        if x.nrows() == 0 {
            return Err(ForestError::EmptyTrainingSet);
        }
        if x.nrows() != y.len() {
            return Err(ForestError::LengthMismatch {
                rows: x.nrows(),
                labels: y.len(),
            });
        }
        if let Some(&label) = y.iter().find(|&&label| label >= n_classes) {
            return Err(ForestError::LabelOutOfRange { label, n_classes });
        }

        let class_weights = params.class_weight.weights(y, n_classes);
        let tree_params = params.tree_params();
        let n = y.len();

        let trees = (0..params.n_estimators)
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(params.seed.wrapping_add(t as u64));
                let mut multiplicity = vec![0.0; n];
                if params.bootstrap {
                    for _ in 0..n {
                        multiplicity[rng.gen_range(0..n)] += 1.0;
                    }
                } else {
                    multiplicity.fill(1.0);
                }
                let weights: Vec<f64> = multiplicity
                    .iter()
                    .zip(y)
                    .map(|(m, &label)| m * class_weights[label])
                    .collect();
                DecisionTree::fit(x, y, &weights, n_classes, &tree_params, &mut rng)
            })
            .collect::<Vec<_>>();

        debug!(
            "Fitted forest: {} trees, {} samples, {} features, mean depth {:.1}",
            trees.len(),
            n,
            x.ncols(),
            trees.iter().map(|t| t.depth() as f64).sum::<f64>() / trees.len() as f64
        );

        Ok(Self {
            n_features: x.ncols(),
            n_classes,
            trees,
        })
    }

    /// Assembles a forest from already-built trees.
    pub fn from_trees(n_features: usize, n_classes: usize, trees: Vec<DecisionTree>) -> Result<Self, ForestError> {
        let forest = Self {
            n_features,
            n_classes,
            trees,
        };
        forest.validate()?;
        Ok(forest)
    }

    /// Structural check used after deserialization.
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.trees.is_empty() {
            return Err(ForestError::InvalidParams("forest has no trees".into()));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            if tree.n_classes() != self.n_classes {
                return Err(ForestError::InvalidParams(format!(
                    "tree {} has {} classes, forest has {}",
                    idx,
                    tree.n_classes(),
                    self.n_classes
                )));
            }
            tree.validate()
                .and_then(|_| tree.validate_features(self.n_features))
                .map_err(|e| ForestError::InvalidParams(format!("tree {}: {}", idx, e)))?;
        }
        Ok(())
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean of the per-tree leaf distributions.
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> Array1<f64> {
        let mut proba = Array1::<f64>::zeros(self.n_classes);
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.predict_proba(row)) {
                *acc += p;
            }
        }
        proba / self.trees.len() as f64
    }
}
