use serde::{Deserialize, Serialize};

use super::error::PredictionError;
use super::model::OutcomeClassifier;
use crate::features::{CategoryEncoder, FeatureSchema, TfidfVectorizer};

/// Version of the encoding recipe; bumped whenever the feature layout or any
/// component's serialized form changes incompatibly.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Everything inference needs, produced once by a training run.
///
/// A bundle is immutable once built; it is shared read-only behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub format_version: u32,
    /// Training profile the bundle was fitted with
    pub profile: String,
    /// Version of the leakage denylist applied to the training data
    pub denylist_version: String,
    pub tax_type_encoder: CategoryEncoder,
    pub panel_encoder: CategoryEncoder,
    pub vectorizer: TfidfVectorizer,
    pub feature_schema: FeatureSchema,
    pub disposition: OutcomeClassifier,
    pub voting: Option<OutcomeClassifier>,
}

impl ArtifactBundle {
    pub fn feature_names(&self) -> &[String] {
        self.feature_schema.names()
    }

    /// Checks that all components agree on the feature layout.
    pub fn validate(&self) -> Result<(), PredictionError> {
        if self.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PredictionError::MissingArtifact(format!(
                "bundle format version {} is not supported (expected {})",
                self.format_version, BUNDLE_FORMAT_VERSION
            )));
        }
        self.tax_type_encoder.other_code()?;
        self.panel_encoder.other_code()?;
        self.feature_schema.check_layout(self.vectorizer.dimension())?;

        let width = self.feature_schema.width();
        for classifier in std::iter::once(&self.disposition).chain(self.voting.as_ref()) {
            classifier.forest().validate().map_err(|e| {
                PredictionError::MissingArtifact(format!("{} classifier is corrupt: {}", classifier.name(), e))
            })?;
            if classifier.labels().len() != classifier.forest().n_classes() {
                return Err(PredictionError::MissingArtifact(format!(
                    "{} classifier has {} labels for {} classes",
                    classifier.name(),
                    classifier.labels().len(),
                    classifier.forest().n_classes()
                )));
            }
            if classifier.n_features() != classifier.forest().n_features() {
                return Err(PredictionError::SchemaMismatch {
                    context: format!("{} classifier forest", classifier.name()),
                    expected: classifier.n_features(),
                    actual: classifier.forest().n_features(),
                });
            }
            if classifier.n_features() != width {
                return Err(PredictionError::SchemaMismatch {
                    context: format!("{} classifier", classifier.name()),
                    expected: width,
                    actual: classifier.n_features(),
                });
            }
        }
        Ok(())
    }
}
