use thiserror::Error;

use crate::artifact_store::ArtifactError;

/// Represents the different types of errors that can occur on the inference path.
///
/// Each variant is a distinct failure kind; none of them is ever turned into a
/// default or low-confidence prediction.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// The artifact bundle or one of its components could not be located or loaded
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),
    /// The assembled feature vector does not have the shape a component expects
    #[error("Schema mismatch in {context}: expected {expected} features, got {actual}")]
    SchemaMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },
    /// A category encoder has no code for the value and no OTHER fallback
    #[error("Unknown category '{value}' for field '{field}'")]
    UnknownCategory { field: String, value: String },
    /// Error occurred due to invalid input parameters
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl From<ArtifactError> for PredictionError {
    fn from(err: ArtifactError) -> Self {
        PredictionError::MissingArtifact(err.to_string())
    }
}
