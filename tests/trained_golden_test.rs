use std::path::PathBuf;
use std::sync::Arc;

use env_logger::Env;
use lexcarf::{
    ArtifactBundle, ArtifactStore, CaseRecord, DatasetReader, Distribution, Predictor, TrainingConfig,
    TrainingPipeline, TrainingReport, VotingOutcome,
};
use serde_json::Value;

const TOLERANCE: f64 = 1e-12;

fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

fn trained_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("trained")
}

fn expected() -> Value {
    let raw = std::fs::read_to_string(trained_dir().join("expected.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

fn train() -> (ArtifactBundle, TrainingReport) {
    init();
    let config = TrainingConfig::from_file(trained_dir().join("training.json")).unwrap();
    let pipeline = TrainingPipeline::builder().with_config(config).build().unwrap();
    let records = DatasetReader::new(trained_dir().join("carf_single_year.csv"))
        .read_records()
        .unwrap();
    pipeline.fit(records, None).unwrap()
}

fn case_of(query: &Value) -> CaseRecord {
    let case = &query["case"];
    CaseRecord::new(
        case["tributo"].as_str().unwrap(),
        case["turma"].as_str().unwrap(),
        case["texto_ementa"].as_str().unwrap(),
    )
}

fn assert_distribution(actual: &Distribution, expected: &Value, context: &str) {
    let expected = expected.as_array().unwrap();
    assert_eq!(actual.entries().len(), expected.len(), "{}", context);
    for ((label, got), entry) in actual.entries().iter().zip(expected) {
        assert_eq!(label, entry["label"].as_str().unwrap(), "{}", context);
        let p = entry["probability"].as_f64().unwrap();
        assert!((got - p).abs() < TOLERANCE, "{}: {} = {}, expected {}", context, label, got, p);
    }
}

#[test]
fn test_single_year_training_report() {
    let (bundle, report) = train();
    let expected = expected();
    let counts = &expected["report"];

    assert_eq!(bundle.profile, "single_year");
    assert_eq!(report.input_records as u64, counts["input_records"].as_u64().unwrap());
    assert_eq!(report.leaking_dropped as u64, counts["leaking_dropped"].as_u64().unwrap());
    assert_eq!(report.incomplete_dropped as u64, counts["incomplete_dropped"].as_u64().unwrap());
    assert_eq!(report.disposition_records as u64, counts["disposition_records"].as_u64().unwrap());
    assert_eq!(report.voting_records as u64, counts["voting_records"].as_u64().unwrap());
    assert_eq!(report.vocabulary_size as u64, counts["vocabulary_size"].as_u64().unwrap());
    assert!(report.voting_trained);

    let evaluation = report.evaluation.as_ref().unwrap();
    let records = counts["evaluation_records"].as_u64().unwrap() as f64;
    let correct = counts["evaluation_correct"].as_u64().unwrap() as f64;
    assert_eq!(evaluation.records as f64, records);
    assert!((evaluation.disposition.accuracy - correct / records).abs() < TOLERANCE);

    // only IRPJ clears the single-year support threshold
    let classes = |v: &Value| -> Vec<String> {
        v.as_array()
            .unwrap()
            .iter()
            .map(|c| c.as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(bundle.tax_type_encoder.classes(), classes(&expected["tax_classes"]).as_slice());
    assert_eq!(bundle.panel_encoder.classes(), classes(&expected["panel_classes"]).as_slice());
}

#[test]
fn test_single_year_predictions() {
    let (bundle, _) = train();
    let predictor = Predictor::new(Arc::new(bundle)).unwrap();

    for query in expected()["queries"].as_array().unwrap() {
        let record = case_of(query);
        let context = format!("{:?}", record);
        let prediction = predictor.predict(&record).unwrap();

        assert!(prediction.disposition.is_valid(), "{}", context);
        assert_distribution(&prediction.disposition, &query["disposition"], &context);

        match (&prediction.voting, &query["voting"]) {
            (VotingOutcome::NotApplicable, Value::Null) => {}
            (VotingOutcome::Predicted(dist), expected @ Value::Array(_)) => {
                assert!(dist.is_valid(), "{}", context);
                assert_distribution(dist, expected, &context);
            }
            (actual, expected) => panic!("{}: voting {:?}, expected {}", context, actual, expected),
        }
    }
}

#[test]
fn test_stored_bundle_predicts_the_same() {
    let (bundle, _) = train();
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    store.save("single-year", &bundle).unwrap();
    let loaded = store.load("single-year").unwrap();

    let original = Predictor::new(Arc::new(bundle)).unwrap();
    let restored = Predictor::new(Arc::new(loaded)).unwrap();
    for query in expected()["queries"].as_array().unwrap() {
        let record = case_of(query);
        assert_eq!(original.predict(&record).unwrap(), restored.predict(&record).unwrap());
    }
}
