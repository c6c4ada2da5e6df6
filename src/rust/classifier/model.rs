use std::collections::BTreeSet;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::error::PredictionError;
use crate::forest::{ForestError, ForestParams, RandomForest};

/// Tolerance on the sum of a probability distribution.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// A probability distribution over a classifier's labels, in label order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    entries: Vec<(String, f64)>,
}

impl Distribution {
    pub fn new(entries: Vec<(String, f64)>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[(String, f64)] {
        &self.entries
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    /// Most probable label; the first label wins ties.
    pub fn top(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (label, p) in &self.entries {
            if best.map_or(true, |(_, bp)| *p > bp) {
                best = Some((label.as_str(), *p));
            }
        }
        best
    }

    /// Entries sorted by descending probability.
    pub fn sorted(&self) -> Vec<(&str, f64)> {
        let mut sorted: Vec<(&str, f64)> = self.entries.iter().map(|(l, p)| (l.as_str(), *p)).collect();
        sorted.sort_by(|a, b| b.1.total_cmp(&a.1));
        sorted
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, p)| p).sum()
    }

    /// True when every entry lies in [0, 1] and the entries sum to 1.
    pub fn is_valid(&self) -> bool {
        self.entries.iter().all(|(_, p)| (0.0..=1.0).contains(p))
            && (self.total() - 1.0).abs() <= PROBABILITY_TOLERANCE
    }
}

/// A trained probabilistic classifier bound to a fixed label set and input width.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeClassifier {
    /// Name used in logs and error messages ("disposition", "voting")
    name: String,
    /// Class labels, sorted; forest class `i` is `labels[i]`
    labels: Vec<String>,
    n_features: usize,
    forest: RandomForest,
}

impl OutcomeClassifier {
    /// Fits a classifier; labels are the sorted distinct values of `targets`.
    pub fn fit(
        name: impl Into<String>,
        x: ArrayView2<f64>,
        targets: &[&str],
        params: &ForestParams,
    ) -> Result<Self, ForestError> {
        let labels: Vec<String> = targets
            .iter()
            .map(|t| t.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let y: Vec<usize> = targets
            .iter()
            .map(|t| labels.iter().position(|l| l == t).unwrap_or_default())
            .collect();
        let forest = RandomForest::fit(x, &y, labels.len(), params)?;
        Ok(Self {
            name: name.into(),
            labels,
            n_features: x.ncols(),
            forest,
        })
    }

    pub fn from_forest(name: impl Into<String>, labels: Vec<String>, forest: RandomForest) -> Result<Self, ForestError> {
        if labels.len() != forest.n_classes() {
            return Err(ForestError::InvalidParams(format!(
                "{} labels for a forest with {} classes",
                labels.len(),
                forest.n_classes()
            )));
        }
        Ok(Self {
            name: name.into(),
            labels,
            n_features: forest.n_features(),
            forest,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Exact row width this classifier accepts.
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }

    /// Class probabilities for one assembled feature row.
    ///
    /// A row of the wrong width is a [`PredictionError::SchemaMismatch`].
    pub fn predict_proba(&self, row: ArrayView1<f64>) -> Result<Distribution, PredictionError> {
        if row.len() != self.n_features {
            return Err(PredictionError::SchemaMismatch {
                context: format!("{} classifier", self.name),
                expected: self.n_features,
                actual: row.len(),
            });
        }
        let proba = self.forest.predict_proba(row);
        Ok(Distribution::new(
            self.labels.iter().cloned().zip(proba.iter().copied()).collect(),
        ))
    }

    /// Most probable label for each row of `x`.
    pub fn predict_batch(&self, x: ArrayView2<f64>) -> Result<Vec<String>, PredictionError> {
        x.rows()
            .into_iter()
            .map(|row| {
                let dist = self.predict_proba(row)?;
                Ok(dist.top().map(|(label, _)| label.to_string()).unwrap_or_default())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn small_classifier() -> OutcomeClassifier {
        let x = Array2::from_shape_vec(
            (8, 2),
            vec![0.0, 0.0, 0.1, 0.0, 0.2, 0.1, 0.0, 0.2, 1.0, 1.0, 1.1, 0.9, 0.9, 1.2, 1.0, 0.8],
        )
        .unwrap();
        let targets = ["Negado", "Negado", "Negado", "Negado", "Provido Total", "Provido Total", "Provido Total", "Provido Total"];
        let params = ForestParams {
            n_estimators: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            ..ForestParams::default()
        };
        OutcomeClassifier::fit("disposition", x.view(), &targets, &params).unwrap()
    }

    #[test]
    fn test_labels_are_sorted() {
        let classifier = small_classifier();
        assert_eq!(classifier.labels(), &["Negado", "Provido Total"]);
        assert_eq!(classifier.n_features(), 2);
    }

    #[test]
    fn test_distribution_sums_to_one() {
        let classifier = small_classifier();
        for row in [array![0.0, 0.0], array![1.0, 1.0], array![0.5, 0.5], array![-3.0, 9.0]] {
            let dist = classifier.predict_proba(row.view()).unwrap();
            assert!(dist.is_valid(), "invalid distribution {:?}", dist);
        }
        let dist = classifier.predict_proba(array![1.0, 1.0].view()).unwrap();
        assert_eq!(dist.top().unwrap().0, "Provido Total");
    }

    #[test]
    fn test_wrong_width_is_schema_mismatch() {
        let classifier = small_classifier();
        let err = classifier.predict_proba(array![1.0, 1.0, 0.0].view()).unwrap_err();
        assert!(matches!(err, PredictionError::SchemaMismatch { expected: 2, actual: 3, .. }));
    }

    #[test]
    fn test_distribution_helpers() {
        let dist = Distribution::new(vec![
            ("Empate".into(), 0.1),
            ("Maioria".into(), 0.3),
            ("Qualidade".into(), 0.3),
            ("Unânime".into(), 0.3),
        ]);
        assert!(dist.is_valid());
        // first label wins ties
        assert_eq!(dist.top(), Some(("Maioria", 0.3)));
        assert_eq!(dist.get("Empate"), Some(0.1));
        assert_eq!(dist.sorted().last().unwrap().0, "Empate");
        assert!(!Distribution::new(vec![("a".into(), 0.7), ("b".into(), 0.7)]).is_valid());
    }
}
