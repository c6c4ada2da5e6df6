use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, info, warn};
use ndarray::{Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::leakage::Denylist;
use super::metrics::ClassificationReport;
use super::TrainingError;
use crate::classifier::{ArtifactBundle, OutcomeClassifier, PredictionError, Predictor, BUNDLE_FORMAT_VERSION};
use crate::config::{TrainingConfig, TrainingProfile};
use crate::features::{normalize_panel, CategoryEncoder, FeatureAssembler, FeatureSchema, TfidfVectorizer, OTHER_CATEGORY};
use crate::record::{CaseRecord, Disposition, VotingType};

/// A record that survived cleaning, with its derived targets.
#[derive(Debug, Clone)]
struct Example {
    record: CaseRecord,
    disposition: Disposition,
    voting: Option<VotingType>,
}

impl Example {
    fn summary(&self) -> &str {
        self.record.summary_text().unwrap_or_default()
    }

    fn tax_type(&self) -> &str {
        self.record.tax_type().unwrap_or(OTHER_CATEGORY)
    }

    fn panel_token(&self) -> String {
        self.record
            .panel()
            .map(normalize_panel)
            .unwrap_or_else(|| OTHER_CATEGORY.to_string())
    }
}

/// Held-out evaluation of a trained bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub records: usize,
    pub disposition: ClassificationReport,
    pub voting: Option<ClassificationReport>,
    /// Fraction of held-out records whose summary still contains a denylisted term
    pub residual_leakage_rate: f64,
}

/// Summary of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub profile: TrainingProfile,
    pub denylist_version: String,
    pub input_records: usize,
    pub leaking_dropped: usize,
    pub incomplete_dropped: usize,
    pub disposition_records: usize,
    pub voting_records: usize,
    pub disposition_counts: BTreeMap<String, usize>,
    pub voting_counts: BTreeMap<String, usize>,
    pub vocabulary_size: usize,
    pub voting_trained: bool,
    pub evaluation: Option<Evaluation>,
}

/// Fits an [`ArtifactBundle`] from historical case records.
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: TrainingConfig,
    denylist: Denylist,
}

/// A builder for constructing a TrainingPipeline with a fluent interface.
#[derive(Debug, Default)]
pub struct TrainingPipelineBuilder {
    config: TrainingConfig,
    denylist: Option<Denylist>,
}

impl TrainingPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration
    pub fn with_config(mut self, config: TrainingConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_profile(mut self, profile: TrainingProfile) -> Self {
        self.config.profile = profile;
        self
    }

    pub fn with_denylist(mut self, denylist: Denylist) -> Self {
        self.denylist = Some(denylist);
        self
    }

    /// Holds out a stratified fraction of the training records for evaluation
    ///
    /// Only used when `fit` is not given an explicit test set.
    pub fn with_holdout_fraction(mut self, fraction: f64) -> Result<Self, TrainingError> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(TrainingError::Config(format!(
                "holdout fraction must be in (0, 1), got {}",
                fraction
            )));
        }
        self.config.holdout_fraction = Some(fraction);
        Ok(self)
    }

    pub fn build(self) -> Result<TrainingPipeline, TrainingError> {
        self.config.validate()?;
        let denylist = self.denylist.unwrap_or_default();
        if denylist.terms.is_empty() {
            return Err(TrainingError::Config("denylist has no terms".into()));
        }
        Ok(TrainingPipeline {
            config: self.config,
            denylist,
        })
    }
}

impl TrainingPipeline {
    pub fn builder() -> TrainingPipelineBuilder {
        TrainingPipelineBuilder::new()
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Trains both classifiers and evaluates them.
    ///
    /// Evaluation uses `test_records` when given, otherwise a stratified
    /// holdout of the training records if one is configured, otherwise it is
    /// skipped. Leaking training records are dropped before anything is
    /// fitted; an explicit test set is evaluated as given.
    pub fn fit(
        &self,
        train_records: Vec<CaseRecord>,
        test_records: Option<Vec<CaseRecord>>,
    ) -> Result<(ArtifactBundle, TrainingReport), TrainingError> {
        let input_records = train_records.len();
        info!(
            "Training with profile {} on {} records (denylist {})",
            self.config.profile, input_records, self.denylist.version
        );

        let (clean, leaking) = self.denylist.partition(train_records);
        info!("Dropped {} records with outcome-revealing summaries", leaking.len());

        let clean_len = clean.len();
        let examples = prepare(clean);
        let incomplete_dropped = clean_len - examples.len();
        info!(
            "{} records usable for the disposition model ({} incomplete or unmodeled dropped)",
            examples.len(),
            incomplete_dropped
        );

        let (train, held_out) = match (test_records, self.config.holdout_fraction) {
            (Some(test), _) => (examples, Some(test)),
            (None, Some(fraction)) => {
                let (train, test) = stratified_split(examples, fraction, self.config.seed);
                info!("Stratified holdout: {} train / {} evaluation records", train.len(), test.len());
                let test: Vec<CaseRecord> = test.into_iter().map(|ex| ex.record).collect();
                (train, Some(test))
            }
            (None, None) => (examples, None),
        };

        if train.is_empty() {
            return Err(TrainingError::EmptyDataset(
                "no records left after leakage filtering and cleaning".into(),
            ));
        }

        let disposition_counts = count_labels(train.iter().map(|ex| ex.disposition.label()));
        if disposition_counts.len() < 2 {
            return Err(TrainingError::InsufficientClasses {
                target: "disposition".into(),
                found: disposition_counts.len(),
            });
        }
        for (label, count) in &disposition_counts {
            info!("  {:<16} {}", label, count);
        }

        let tax_type_encoder = CategoryEncoder::fit(
            "tributo",
            train.iter().map(Example::tax_type),
            self.config.tax_min_support(),
        );
        let panel_tokens: Vec<String> = train.iter().map(Example::panel_token).collect();
        let panel_encoder = CategoryEncoder::fit(
            "turma",
            panel_tokens.iter().map(String::as_str),
            self.config.panel_min_support,
        );
        info!(
            "Encoders: {} tax types, {} panels (OTHER included)",
            tax_type_encoder.len(),
            panel_encoder.len()
        );

        let summaries: Vec<&str> = train.iter().map(Example::summary).collect();
        let vectorizer = TfidfVectorizer::fit(self.config.vectorizer.clone(), &summaries);
        if vectorizer.dimension() == 0 {
            warn!("TF-IDF vocabulary is empty; the models will only see categorical features");
        }
        info!("TF-IDF vocabulary: {} terms", vectorizer.dimension());

        let feature_schema = FeatureSchema::new(vectorizer.dimension());
        let assembler = FeatureAssembler::new(feature_schema.clone());
        let x = build_matrix(&train, &tax_type_encoder, &panel_encoder, &vectorizer, &assembler)?;
        debug!("Training matrix: {} x {}", x.nrows(), x.ncols());

        info!("Fitting disposition classifier...");
        let targets: Vec<&str> = train.iter().map(|ex| ex.disposition.label()).collect();
        let disposition = OutcomeClassifier::fit("disposition", x.view(), &targets, &self.config.disposition_forest)?;

        let voting_rows: Vec<usize> = train
            .iter()
            .enumerate()
            .filter(|(_, ex)| ex.voting.is_some())
            .map(|(i, _)| i)
            .collect();
        let voting_targets: Vec<&str> = voting_rows
            .iter()
            .filter_map(|&i| train[i].voting.map(|v| v.label()))
            .collect();
        let voting_counts = count_labels(voting_targets.iter().copied());

        let voting = if voting_counts.len() < 2 {
            warn!(
                "Only {} voting class(es) in {} records; the bundle will have no voting classifier",
                voting_counts.len(),
                voting_rows.len()
            );
            None
        } else {
            info!("Fitting voting classifier on {} records...", voting_rows.len());
            let x_voting = x.select(Axis(0), &voting_rows);
            Some(OutcomeClassifier::fit(
                "voting",
                x_voting.view(),
                &voting_targets,
                &self.config.voting_forest,
            )?)
        };

        let bundle = ArtifactBundle {
            format_version: BUNDLE_FORMAT_VERSION,
            profile: self.config.profile.name().to_string(),
            denylist_version: self.denylist.version.clone(),
            tax_type_encoder,
            panel_encoder,
            vectorizer,
            feature_schema,
            disposition,
            voting,
        };
        bundle.validate()?;

        let evaluation = match held_out {
            Some(records) => self.evaluate(&bundle, records)?,
            None => None,
        };

        let report = TrainingReport {
            profile: self.config.profile,
            denylist_version: self.denylist.version.clone(),
            input_records,
            leaking_dropped: leaking.len(),
            incomplete_dropped,
            disposition_records: train.len(),
            voting_records: voting_rows.len(),
            disposition_counts,
            voting_counts,
            vocabulary_size: bundle.vectorizer.dimension(),
            voting_trained: bundle.voting.is_some(),
            evaluation,
        };
        Ok((bundle, report))
    }

    /// Scores the bundle on held-out records.
    ///
    /// Both classifiers are scored on every record that has the target, so
    /// the voting report is not gated on the predicted disposition.
    fn evaluate(&self, bundle: &ArtifactBundle, records: Vec<CaseRecord>) -> Result<Option<Evaluation>, TrainingError> {
        let residual_leakage_rate = self.denylist.leakage_rate(&records);
        if residual_leakage_rate > 0.0 {
            warn!(
                "{:.1}% of evaluation records contain denylisted terms",
                residual_leakage_rate * 100.0
            );
        }

        let examples = prepare(records);
        if examples.is_empty() {
            warn!("No usable evaluation records; skipping evaluation");
            return Ok(None);
        }

        let predictor = Predictor::new(Arc::new(bundle.clone()))?;
        let mut disposition_true = Vec::with_capacity(examples.len());
        let mut disposition_pred = Vec::with_capacity(examples.len());
        let mut voting_true = Vec::new();
        let mut voting_pred = Vec::new();

        for ex in &examples {
            let encoded = predictor.encode(&ex.record)?;
            let dist = predictor.predict_disposition(&encoded)?;
            disposition_true.push(ex.disposition.label().to_string());
            disposition_pred.push(top_label(&dist)?);

            if let (Some(target), Some(classifier)) = (ex.voting, bundle.voting.as_ref()) {
                let dist = classifier.predict_proba(encoded.features.view())?;
                voting_true.push(target.label().to_string());
                voting_pred.push(top_label(&dist)?);
            }
        }

        let disposition = ClassificationReport::compute(&disposition_true, &disposition_pred);
        disposition.log("Disposition classifier on held-out records:");
        let voting = if voting_true.is_empty() {
            None
        } else {
            let report = ClassificationReport::compute(&voting_true, &voting_pred);
            report.log("Voting classifier on held-out records:");
            Some(report)
        };

        Ok(Some(Evaluation {
            records: examples.len(),
            disposition,
            voting,
            residual_leakage_rate,
        }))
    }
}

/// Keeps complete records with a modeled disposition and derives their targets.
fn prepare(records: Vec<CaseRecord>) -> Vec<Example> {
    records
        .into_iter()
        .filter(CaseRecord::has_training_fields)
        .filter_map(|record| {
            let disposition = record.disposition().filter(Disposition::is_modeled)?;
            let voting = record.voting_type();
            Some(Example {
                record,
                disposition,
                voting,
            })
        })
        .collect()
}

/// Splits examples per disposition class, keeping the original order within
/// each side. Every class keeps at least one training example.
fn stratified_split(examples: Vec<Example>, fraction: f64, seed: u64) -> (Vec<Example>, Vec<Example>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut by_class: BTreeMap<Disposition, Vec<usize>> = BTreeMap::new();
    for (i, ex) in examples.iter().enumerate() {
        by_class.entry(ex.disposition).or_default().push(i);
    }

    let mut held_out = BTreeSet::new();
    for indices in by_class.values_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64 * fraction).round() as usize).min(indices.len().saturating_sub(1));
        held_out.extend(indices.iter().take(n_test).copied());
    }

    let mut train = Vec::with_capacity(examples.len() - held_out.len());
    let mut test = Vec::with_capacity(held_out.len());
    for (i, ex) in examples.into_iter().enumerate() {
        if held_out.contains(&i) {
            test.push(ex);
        } else {
            train.push(ex);
        }
    }
    (train, test)
}

fn build_matrix(
    examples: &[Example],
    tax_type_encoder: &CategoryEncoder,
    panel_encoder: &CategoryEncoder,
    vectorizer: &TfidfVectorizer,
    assembler: &FeatureAssembler,
) -> Result<Array2<f64>, PredictionError> {
    let width = assembler.schema().width();
    let mut x = Array2::<f64>::zeros((examples.len(), width));
    for (mut row, ex) in x.rows_mut().into_iter().zip(examples) {
        let tax_code = tax_type_encoder.encode(ex.tax_type())?;
        let panel_code = match ex.record.panel() {
            Some(panel) => panel_encoder.encode_panel(panel)?,
            None => panel_encoder.other_code()?,
        };
        let text = vectorizer.transform(ex.summary());
        row.assign(&assembler.assemble(tax_code, panel_code, text.view())?);
    }
    Ok(x)
}

fn count_labels<'a>(labels: impl Iterator<Item = &'a str>) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for label in labels {
        *counts.entry(label.to_string()).or_insert(0) += 1;
    }
    counts
}

fn top_label(dist: &crate::classifier::Distribution) -> Result<String, PredictionError> {
    dist.top()
        .map(|(label, _)| label.to_string())
        .ok_or_else(|| PredictionError::ValidationError("classifier returned an empty distribution".into()))
}
