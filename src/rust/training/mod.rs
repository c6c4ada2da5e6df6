//! Offline training: dataset loading, leakage filtering, model fitting and
//! held-out evaluation.

mod dataset;
mod leakage;
mod metrics;
mod pipeline;

pub use dataset::{write_filtered, DatasetReader};
pub use leakage::{Denylist, LeakageReport, DEFAULT_DENYLIST_VERSION};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use pipeline::{Evaluation, TrainingPipeline, TrainingPipelineBuilder, TrainingReport};

use thiserror::Error;

use crate::classifier::PredictionError;
use crate::forest::ForestError;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// No usable records were left at some stage of the pipeline
    #[error("Empty dataset: {0}")]
    EmptyDataset(String),
    /// A target has fewer than two classes, so no classifier can be fitted
    #[error("Insufficient classes for {target}: found {found}, need at least 2")]
    InsufficientClasses { target: String, found: usize },
    /// The dataset could not be read or written
    #[error("Dataset error: {0}")]
    Dataset(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Model fitting failed: {0}")]
    Model(#[from] ForestError),
    #[error(transparent)]
    Prediction(#[from] PredictionError),
}

impl From<csv::Error> for TrainingError {
    fn from(err: csv::Error) -> Self {
        TrainingError::Dataset(err.to_string())
    }
}

impl From<std::io::Error> for TrainingError {
    fn from(err: std::io::Error) -> Self {
        TrainingError::Dataset(err.to_string())
    }
}
