use std::sync::Arc;

use log::{debug, warn};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::bundle::ArtifactBundle;
use super::error::PredictionError;
use super::model::Distribution;
use crate::features::{FeatureAssembler, CATEGORICAL_FEATURES};
use crate::record::{CaseRecord, Disposition};

/// Recoverable input problems; prediction proceeds with a fallback encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputWarning {
    /// No summary text: the text segment is all zeros
    EmptySummary,
    /// No value for a categorical field: encoded as OTHER
    EmptyCategory(String),
}

/// Voting-type result for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VotingOutcome {
    Predicted(Distribution),
    /// The predicted disposition is a denial; voting type is undefined
    NotApplicable,
    /// The bundle carries no voting classifier
    Unavailable,
}

impl VotingOutcome {
    pub fn distribution(&self) -> Option<&Distribution> {
        match self {
            Self::Predicted(dist) => Some(dist),
            _ => None,
        }
    }
}

/// A case encoded against a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedCase {
    pub tax_code: usize,
    pub panel_code: usize,
    pub features: Array1<f64>,
    pub warnings: Vec<InputWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CasePrediction {
    pub disposition: Distribution,
    pub voting: VotingOutcome,
    pub warnings: Vec<InputWarning>,
}

impl CasePrediction {
    pub fn predicted_disposition(&self) -> Option<Disposition> {
        self.disposition.top().and_then(|(label, _)| Disposition::from_label(label))
    }
}

/// Inference over a shared, read-only artifact bundle.
#[derive(Debug, Clone)]
pub struct Predictor {
    bundle: Arc<ArtifactBundle>,
    assembler: FeatureAssembler,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Predictor>();
    }
};

impl Predictor {
    /// Wraps a bundle after checking that its components agree on the feature layout.
    pub fn new(bundle: Arc<ArtifactBundle>) -> Result<Self, PredictionError> {
        bundle.validate()?;
        let assembler = FeatureAssembler::new(bundle.feature_schema.clone());
        Ok(Self { bundle, assembler })
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    /// Encodes the predictive fields of a record into one feature row.
    ///
    /// Missing fields are not errors: an empty category encodes as OTHER and
    /// an empty summary yields a zero text segment. Both are reported as
    /// warnings on the result.
    pub fn encode(&self, record: &CaseRecord) -> Result<EncodedCase, PredictionError> {
        let mut warnings = Vec::new();

        let tax_code = match record.tax_type() {
            Some(tax_type) => self.bundle.tax_type_encoder.encode(tax_type)?,
            None => {
                warnings.push(InputWarning::EmptyCategory(CATEGORICAL_FEATURES[0].to_string()));
                self.bundle.tax_type_encoder.other_code()?
            }
        };
        let panel_code = match record.panel() {
            Some(panel) => self.bundle.panel_encoder.encode_panel(panel)?,
            None => {
                warnings.push(InputWarning::EmptyCategory(CATEGORICAL_FEATURES[1].to_string()));
                self.bundle.panel_encoder.other_code()?
            }
        };
        let text = match record.summary_text() {
            Some(text) => self.bundle.vectorizer.transform(text),
            None => {
                warnings.push(InputWarning::EmptySummary);
                Array1::zeros(self.bundle.vectorizer.dimension())
            }
        };

        let features = self.assembler.assemble(tax_code, panel_code, text.view())?;
        Ok(EncodedCase {
            tax_code,
            panel_code,
            features,
            warnings,
        })
    }

    pub fn predict_disposition(&self, encoded: &EncodedCase) -> Result<Distribution, PredictionError> {
        self.bundle.disposition.predict_proba(encoded.features.view())
    }

    /// Voting-type distribution, gated on the disposition.
    ///
    /// The voting classifier is not run for denied cases.
    pub fn predict_voting(
        &self,
        encoded: &EncodedCase,
        disposition: Disposition,
    ) -> Result<VotingOutcome, PredictionError> {
        if disposition.is_denied() {
            return Ok(VotingOutcome::NotApplicable);
        }
        match &self.bundle.voting {
            Some(classifier) => Ok(VotingOutcome::Predicted(
                classifier.predict_proba(encoded.features.view())?,
            )),
            None => Ok(VotingOutcome::Unavailable),
        }
    }

    /// Full prediction for one case: disposition, then voting when the
    /// predicted disposition is not a denial.
    pub fn predict(&self, record: &CaseRecord) -> Result<CasePrediction, PredictionError> {
        let encoded = self.encode(record)?;
        for warning in &encoded.warnings {
            warn!("Incomplete input, using fallback encoding: {:?}", warning);
        }

        let disposition = self.predict_disposition(&encoded)?;
        let predicted = disposition
            .top()
            .and_then(|(label, _)| Disposition::from_label(label))
            .ok_or_else(|| {
                PredictionError::ValidationError(format!(
                    "disposition classifier produced no recognised label: {:?}",
                    disposition.entries()
                ))
            })?;
        let voting = self.predict_voting(&encoded, predicted)?;

        debug!(
            "Predicted disposition {} (tax code {}, panel code {})",
            predicted, encoded.tax_code, encoded.panel_code
        );

        Ok(CasePrediction {
            disposition,
            voting,
            warnings: encoded.warnings,
        })
    }
}
