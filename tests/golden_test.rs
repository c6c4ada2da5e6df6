use std::path::PathBuf;
use std::sync::Arc;

use lexcarf::{ArtifactStore, CaseRecord, Distribution, InputWarning, Predictor, VotingOutcome};
use serde_json::Value;

const TOLERANCE: f64 = 1e-12;

fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures")
}

fn golden_predictor() -> Predictor {
    let store = ArtifactStore::new(fixtures_dir()).unwrap();
    let bundle = store.load("golden").unwrap();
    Predictor::new(Arc::new(bundle)).unwrap()
}

fn assert_distribution(actual: &Distribution, expected: &Value, context: &str) {
    let expected = expected.as_object().unwrap();
    assert_eq!(actual.entries().len(), expected.len(), "{}", context);
    for (label, p) in expected {
        let p = p.as_f64().unwrap();
        let got = actual
            .get(label)
            .unwrap_or_else(|| panic!("{}: missing label {}", context, label));
        assert!((got - p).abs() < TOLERANCE, "{}: {} = {}, expected {}", context, label, got, p);
    }
}

#[test]
fn test_golden_predictions() {
    let predictor = golden_predictor();
    let raw = std::fs::read_to_string(fixtures_dir().join("golden").join("expected.json")).unwrap();
    let expected: Value = serde_json::from_str(&raw).unwrap();

    for case in expected["cases"].as_array().unwrap() {
        let record = CaseRecord {
            tax_type: case["tax_type"].as_str().map(String::from),
            panel: case["panel"].as_str().map(String::from),
            summary_text: case["summary"].as_str().map(String::from),
            ..CaseRecord::default()
        };
        let context = format!("{:?}", record);
        let prediction = predictor.predict(&record).unwrap();

        assert!(prediction.disposition.is_valid(), "{}", context);
        assert_distribution(&prediction.disposition, &case["disposition"], &context);

        match (&prediction.voting, &case["voting"]) {
            (VotingOutcome::NotApplicable, Value::String(s)) => assert_eq!(s, "not_applicable"),
            (VotingOutcome::Predicted(dist), expected @ Value::Object(_)) => {
                assert!(dist.is_valid(), "{}", context);
                assert_distribution(dist, expected, &context);
            }
            (actual, expected) => panic!("{}: voting {:?}, expected {}", context, actual, expected),
        }

        let warnings: Vec<&str> = case["warnings"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        let expect_empty_summary = warnings.contains(&"empty_summary");
        assert_eq!(
            prediction.warnings.contains(&InputWarning::EmptySummary),
            expect_empty_summary,
            "{}",
            context
        );
    }
}

#[test]
fn test_golden_bundle_checksum() {
    let store = ArtifactStore::new(fixtures_dir()).unwrap();
    assert!(store.verify("golden").unwrap());
}

#[test]
fn test_unseen_categories_fall_back_to_other() {
    let predictor = golden_predictor();
    let a = predictor
        .encode(&CaseRecord::new("ITR", "2ª TURMA", "multa"))
        .unwrap();
    let b = predictor
        .encode(&CaseRecord::new("IPI", "CSRF", "multa"))
        .unwrap();
    // both tax types and both panels land in the same OTHER code
    assert_eq!(a.tax_code, 2);
    assert_eq!(b.tax_code, 2);
    assert_eq!(a.panel_code, 2);
    assert_eq!(b.panel_code, 2);
    assert_eq!(a.features, b.features);
}

#[test]
fn test_predictor_is_shareable_across_threads() {
    let predictor = Arc::new(golden_predictor());
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let predictor = Arc::clone(&predictor);
            std::thread::spawn(move || {
                predictor
                    .predict(&CaseRecord::new("IRPJ", "3ª", "crédito"))
                    .unwrap()
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(results.windows(2).all(|w| w[0] == w[1]));
}
