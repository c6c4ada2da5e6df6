//! Multi-class evaluation metrics for held-out predictions.
//!
//! Labels are the sorted union of true and predicted labels. A ratio with a
//! zero denominator is reported as 0.

use std::collections::BTreeSet;

use log::info;
use serde::{Deserialize, Serialize};

/// Precision, recall and F1 of a single class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of true instances of the class
    pub support: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    /// `confusion[i][j]`: true class `i` predicted as class `j`, in class order
    pub confusion: Vec<Vec<usize>>,
}

impl ClassificationReport {
    pub fn compute<S: AsRef<str>>(y_true: &[S], y_pred: &[S]) -> Self {
        let n = y_true.len().min(y_pred.len());
        if n == 0 {
            return Self::default();
        }

        let labels: Vec<&str> = y_true
            .iter()
            .chain(y_pred)
            .map(|s| s.as_ref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index = |label: &str| labels.iter().position(|l| *l == label).unwrap_or_default();

        let mut confusion = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in y_true.iter().zip(y_pred).take(n) {
            confusion[index(t.as_ref())][index(p.as_ref())] += 1;
        }

        let classes: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = confusion[i][i];
                let support: usize = confusion[i].iter().sum();
                let predicted: usize = confusion.iter().map(|row| row[i]).sum();
                let precision = ratio(tp, predicted);
                let recall = ratio(tp, support);
                ClassMetrics {
                    label: label.to_string(),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support,
                }
            })
            .collect();

        let correct: usize = (0..labels.len()).map(|i| confusion[i][i]).sum();
        let k = classes.len() as f64;
        let macro_avg = ClassMetrics {
            label: "macro avg".into(),
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
            support: n,
        };
        let weighted = |f: fn(&ClassMetrics) -> f64| -> f64 {
            classes.iter().map(|c| f(c) * c.support as f64).sum::<f64>() / n as f64
        };
        let weighted_avg = ClassMetrics {
            label: "weighted avg".into(),
            precision: weighted(|c| c.precision),
            recall: weighted(|c| c.recall),
            f1: weighted(|c| c.f1),
            support: n,
        };

        Self {
            classes,
            accuracy: correct as f64 / n as f64,
            macro_avg,
            weighted_avg,
            confusion,
        }
    }

    pub fn labels(&self) -> Vec<&str> {
        self.classes.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn log(&self, title: &str) {
        info!("{}", title);
        info!("  {:<18} {:>9} {:>9} {:>9} {:>9}", "", "precision", "recall", "f1-score", "support");
        for c in self.classes.iter().chain([&self.macro_avg, &self.weighted_avg]) {
            info!(
                "  {:<18} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            );
        }
        info!("  accuracy {:.3}", self.accuracy);
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_values() {
        let y_true = ["Negado", "Negado", "Negado", "Provido Total", "Provido Total", "Provido Parcial"];
        let y_pred = ["Negado", "Negado", "Provido Total", "Provido Total", "Negado", "Provido Total"];
        let report = ClassificationReport::compute(&y_true[..], &y_pred[..]);

        assert_eq!(report.labels(), vec!["Negado", "Provido Parcial", "Provido Total"]);
        assert!((report.accuracy - 0.5).abs() < 1e-12);
        assert_eq!(report.confusion, vec![vec![2, 0, 1], vec![0, 0, 1], vec![1, 0, 1]]);

        let negado = &report.classes[0];
        assert!((negado.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((negado.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(negado.support, 3);

        // never predicted: zero precision, no division error
        let parcial = &report.classes[1];
        assert_eq!((parcial.precision, parcial.recall, parcial.f1), (0.0, 0.0, 0.0));

        let expected_macro = (2.0 / 3.0 + 0.0 + 1.0 / 3.0) / 3.0;
        assert!((report.macro_avg.precision - expected_macro).abs() < 1e-12);
        assert_eq!(report.weighted_avg.support, 6);
    }

    #[test]
    fn test_empty_report() {
        let empty: [&str; 0] = [];
        let report = ClassificationReport::compute(&empty[..], &empty[..]);
        assert!(report.classes.is_empty());
        assert_eq!(report.accuracy, 0.0);
    }
}
