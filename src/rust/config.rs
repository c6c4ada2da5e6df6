use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::features::VectorizerParams;
use crate::forest::ForestParams;
use crate::training::TrainingError;

/// How the training data relates to the evaluation data.
///
/// The profile fixes the support threshold of the tax-type encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingProfile {
    /// Train on one year, evaluate on the next
    CrossYear,
    /// Train and evaluate on splits of a single year
    SingleYear,
}

impl TrainingProfile {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CrossYear => "cross_year",
            Self::SingleYear => "single_year",
        }
    }

    /// Minimum number of training records for a tax type to get its own code.
    pub fn tax_min_support(&self) -> usize {
        match self {
            Self::CrossYear => 30,
            Self::SingleYear => 50,
        }
    }
}

impl fmt::Display for TrainingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrainingProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cross_year" => Ok(Self::CrossYear),
            "single_year" => Ok(Self::SingleYear),
            other => Err(format!("unknown training profile '{}' (expected cross_year or single_year)", other)),
        }
    }
}

/// Settings for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub profile: TrainingProfile,
    /// Overrides the profile's tax-type support threshold
    pub tax_min_support: Option<usize>,
    pub panel_min_support: usize,
    pub vectorizer: VectorizerParams,
    pub disposition_forest: ForestParams,
    pub voting_forest: ForestParams,
    /// Fraction of records held out for evaluation when no test set is given
    pub holdout_fraction: Option<f64>,
    /// Seed for the holdout split
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            profile: TrainingProfile::CrossYear,
            tax_min_support: None,
            panel_min_support: 1,
            vectorizer: VectorizerParams::default(),
            disposition_forest: ForestParams::default(),
            voting_forest: ForestParams::default(),
            holdout_fraction: None,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn for_profile(profile: TrainingProfile) -> Self {
        Self {
            profile,
            ..Self::default()
        }
    }

    /// Reads a JSON config; absent fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| TrainingError::Config(format!("cannot read {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| TrainingError::Config(format!("invalid config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn tax_min_support(&self) -> usize {
        self.tax_min_support.unwrap_or_else(|| self.profile.tax_min_support())
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.tax_min_support() == 0 || self.panel_min_support == 0 {
            return Err(TrainingError::Config("min support must be at least 1".into()));
        }
        if let Some(fraction) = self.holdout_fraction {
            if !(fraction > 0.0 && fraction < 1.0) {
                return Err(TrainingError::Config(format!(
                    "holdout_fraction must be in (0, 1), got {}",
                    fraction
                )));
            }
        }
        self.vectorizer.validate().map_err(TrainingError::Config)?;
        self.disposition_forest
            .validate()
            .map_err(|e| TrainingError::Config(format!("disposition forest: {}", e)))?;
        self.voting_forest
            .validate()
            .map_err(|e| TrainingError::Config(format!("voting forest: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_thresholds() {
        assert_eq!(TrainingProfile::CrossYear.tax_min_support(), 30);
        assert_eq!(TrainingProfile::SingleYear.tax_min_support(), 50);
        assert_eq!("single-year".parse::<TrainingProfile>().unwrap(), TrainingProfile::SingleYear);
        assert!("yearly".parse::<TrainingProfile>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tax_min_support(), 30);
        assert_eq!(config.panel_min_support, 1);
        assert_eq!(config.vectorizer.max_features, 1000);
        assert_eq!(config.disposition_forest.n_estimators, 100);
    }

    #[test]
    fn test_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.json");
        fs::write(
            &path,
            r#"{"profile": "single_year", "holdout_fraction": 0.2, "vectorizer": {"max_features": 500, "ngram_range": [1, 1], "min_df": 1, "max_df": 1.0, "max_chars": 1000}}"#,
        )
        .unwrap();

        let config = TrainingConfig::from_file(&path).unwrap();
        assert_eq!(config.profile, TrainingProfile::SingleYear);
        assert_eq!(config.tax_min_support(), 50);
        assert_eq!(config.holdout_fraction, Some(0.2));
        assert_eq!(config.vectorizer.max_features, 500);
        assert_eq!(config.voting_forest, ForestParams::default());
    }

    #[test]
    fn test_nested_sections_fill_missing_fields() {
        let config: TrainingConfig = serde_json::from_str(
            r#"{"vectorizer": {"max_features": 500}, "disposition_forest": {"n_estimators": 10, "bootstrap": false}}"#,
        )
        .unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.vectorizer.max_features, 500);
        assert_eq!(config.vectorizer.ngram_range, (1, 2));
        assert_eq!(config.vectorizer.min_df, 2);
        assert_eq!(config.disposition_forest.n_estimators, 10);
        assert!(!config.disposition_forest.bootstrap);
        assert_eq!(config.disposition_forest.max_depth, Some(20));
        assert_eq!(config.disposition_forest.seed, 42);
        assert_eq!(config.voting_forest, ForestParams::default());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TrainingConfig {
            holdout_fraction: Some(1.5),
            ..TrainingConfig::default()
        };
        assert!(matches!(config.validate(), Err(TrainingError::Config(_))));

        let config = TrainingConfig {
            tax_min_support: Some(0),
            ..TrainingConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
