use ndarray::{concatenate, Array1, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::classifier::PredictionError;

/// Names of the categorical feature columns, in assembly order.
pub const CATEGORICAL_FEATURES: [&str; 2] = ["tributo_encoded", "turma_encoded"];

/// Ordered feature names of an assembled row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Schema for the categorical codes followed by `text_width` text features.
    pub fn new(text_width: usize) -> Self {
        let names = CATEGORICAL_FEATURES
            .iter()
            .map(|name| name.to_string())
            .chain((0..text_width).map(|i| format!("tfidf_{}", i)))
            .collect();
        Self { names }
    }

    pub fn from_names(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn text_width(&self) -> usize {
        self.width().saturating_sub(CATEGORICAL_FEATURES.len())
    }

    /// Checks that the schema has the expected layout for a text vectorizer of
    /// width `text_width`.
    pub fn check_layout(&self, text_width: usize) -> Result<(), PredictionError> {
        let expected = Self::new(text_width);
        if self.width() != expected.width() {
            return Err(PredictionError::SchemaMismatch {
                context: "feature schema".into(),
                expected: expected.width(),
                actual: self.width(),
            });
        }
        if let Some(pos) = self.names.iter().zip(&expected.names).position(|(a, b)| a != b) {
            return Err(PredictionError::ValidationError(format!(
                "feature {} is '{}', expected '{}'",
                pos, self.names[pos], expected.names[pos]
            )));
        }
        Ok(())
    }
}

/// Builds model input rows: tax-type code, panel code, then the text vector.
#[derive(Debug, Clone)]
pub struct FeatureAssembler {
    schema: FeatureSchema,
}

impl FeatureAssembler {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Concatenates the codes and text features without any scaling.
    pub fn assemble(
        &self,
        tax_code: usize,
        panel_code: usize,
        text: ArrayView1<f64>,
    ) -> Result<Array1<f64>, PredictionError> {
        if text.len() != self.schema.text_width() {
            return Err(PredictionError::SchemaMismatch {
                context: "text features".into(),
                expected: self.schema.text_width(),
                actual: text.len(),
            });
        }
        let codes = Array1::from(vec![tax_code as f64, panel_code as f64]);
        concatenate(Axis(0), &[codes.view(), text.view()]).map_err(|e| PredictionError::SchemaMismatch {
            context: format!("feature assembly ({})", e),
            expected: self.schema.width(),
            actual: CATEGORICAL_FEATURES.len() + text.len(),
        })
    }
}
