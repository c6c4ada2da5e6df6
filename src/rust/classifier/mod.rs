mod bundle;
mod error;
mod model;
mod predictor;

pub use bundle::{ArtifactBundle, BUNDLE_FORMAT_VERSION};
pub use error::PredictionError;
pub use model::{Distribution, OutcomeClassifier, PROBABILITY_TOLERANCE};
pub use predictor::{CasePrediction, EncodedCase, InputWarning, Predictor, VotingOutcome};

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::features::{CategoryEncoder, FeatureSchema, TfidfVectorizer, VectorizerParams};
    use crate::forest::{DecisionTree, Node, RandomForest};

    fn split(feature: usize, threshold: f64, left: usize, right: usize) -> Node {
        Node::Split {
            feature,
            threshold,
            left,
            right,
        }
    }

    fn leaf(distribution: &[f64]) -> Node {
        Node::Leaf {
            distribution: distribution.to_vec(),
        }
    }

    fn labels(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    /// Hand-built bundle with a three-term vocabulary and small trees whose
    /// outputs can be worked out by hand.
    pub(crate) fn tiny_bundle() -> ArtifactBundle {
        let vectorizer = TfidfVectorizer::from_parts(
            VectorizerParams::default(),
            labels(&["compensação", "crédito", "multa"]),
            vec![1.5, 1.0, 2.0],
            10,
        );

        let tree_a = DecisionTree::from_nodes(
            3,
            vec![
                split(0, 0.5, 1, 2),
                leaf(&[0.2, 0.2, 0.6]),
                split(3, 0.0, 3, 4),
                leaf(&[0.8, 0.1, 0.1]),
                leaf(&[0.4, 0.4, 0.2]),
            ],
        )
        .unwrap();
        let tree_b = DecisionTree::from_nodes(
            3,
            vec![split(1, 1.5, 1, 2), leaf(&[0.5, 0.25, 0.25]), leaf(&[1.0, 0.0, 0.0])],
        )
        .unwrap();
        let disposition = OutcomeClassifier::from_forest(
            "disposition",
            labels(&["Negado", "Provido Parcial", "Provido Total"]),
            RandomForest::from_trees(5, 3, vec![tree_a, tree_b]).unwrap(),
        )
        .unwrap();

        let voting_tree =
            DecisionTree::from_nodes(2, vec![split(4, 0.0, 1, 2), leaf(&[0.25, 0.75]), leaf(&[0.5, 0.5])]).unwrap();
        let voting = OutcomeClassifier::from_forest(
            "voting",
            labels(&["Maioria", "Unânime"]),
            RandomForest::from_trees(5, 2, vec![voting_tree]).unwrap(),
        )
        .unwrap();

        ArtifactBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            profile: "cross_year".into(),
            denylist_version: "carf-2023.1".into(),
            tax_type_encoder: CategoryEncoder::from_classes("tributo", 30, labels(&["COFINS", "IRPJ", "OUTROS"])),
            panel_encoder: CategoryEncoder::from_classes("turma", 1, labels(&["1ª", "3ª", "OUTROS"])),
            vectorizer,
            feature_schema: FeatureSchema::new(3),
            disposition,
            voting: Some(voting),
        }
    }
}
