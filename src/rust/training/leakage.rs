use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use super::TrainingError;
use crate::record::CaseRecord;

pub const DEFAULT_DENYLIST_VERSION: &str = "carf-2023.1";

/// Phrases that reveal the ruling or vote when they appear in a summary.
const DEFAULT_TERMS: [&str; 33] = [
    "provido",
    "negado",
    "mantém-se",
    "mantem-se",
    "improcedente",
    "procedente",
    "dar provimento",
    "nega-se",
    "recurso conhecido",
    "decide-se",
    "não se conhece",
    "voto de qualidade",
    "unânime",
    "maioria",
    "qualidade",
    "acordam os membros",
    "por unanimidade",
    "por maioria",
    "votaram",
    "conclusões",
    "julgamento",
    "decisão",
    "acórdão",
    "sentença",
    "resultado",
    "provimento",
    "negação",
    "acordam",
    "votação",
    "votou",
    "deliberou",
    "julgou",
    "decidiu",
];

/// Versioned list of outcome-revealing terms.
///
/// A summary leaks when its lowercase form contains any term as a substring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Denylist {
    pub version: String,
    pub terms: Vec<String>,
}

impl Default for Denylist {
    fn default() -> Self {
        Self {
            version: DEFAULT_DENYLIST_VERSION.to_string(),
            terms: DEFAULT_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Outcome of scanning a set of records against a denylist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeakageReport {
    pub total: usize,
    pub flagged: usize,
    /// `flagged / total`, 0 for an empty scan
    pub rate: f64,
    /// Number of flagged records each term occurs in
    pub matched_terms: BTreeMap<String, usize>,
}

impl LeakageReport {
    pub fn log_summary(&self, context: &str) {
        info!(
            "Leakage scan ({}): {} of {} records flagged ({:.1}%)",
            context,
            self.flagged,
            self.total,
            self.rate * 100.0
        );
        let mut terms: Vec<_> = self.matched_terms.iter().collect();
        terms.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (term, count) in terms.into_iter().take(10) {
            info!("  {:<24} {}", term, count);
        }
    }
}

impl Denylist {
    pub fn new(version: impl Into<String>, terms: Vec<String>) -> Self {
        Self {
            version: version.into(),
            terms: terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Loads a denylist from JSON: `{"version": "...", "terms": [...]}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TrainingError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| TrainingError::Config(format!("cannot read denylist {:?}: {}", path, e)))?;
        let list: Self = serde_json::from_str(&raw)
            .map_err(|e| TrainingError::Config(format!("invalid denylist {:?}: {}", path, e)))?;
        if list.terms.is_empty() {
            return Err(TrainingError::Config(format!("denylist {:?} has no terms", path)));
        }
        Ok(Self::new(list.version, list.terms))
    }

    /// Case-insensitive: terms are compared in lowercase however the list was built.
    pub fn is_leaking(&self, text: &str) -> bool {
        let lower = text.to_lowercase();
        self.terms.iter().any(|term| contains_term(&lower, term))
    }

    fn matches<'a>(&'a self, text: &str) -> Vec<&'a str> {
        let lower = text.to_lowercase();
        self.terms
            .iter()
            .filter(|term| contains_term(&lower, term))
            .map(String::as_str)
            .collect()
    }

    /// Scans record summaries; records without a summary never leak.
    pub fn scan(&self, records: &[CaseRecord]) -> LeakageReport {
        let mut report = LeakageReport {
            total: records.len(),
            ..LeakageReport::default()
        };
        for text in records.iter().filter_map(CaseRecord::summary_text) {
            let hits = self.matches(text);
            if !hits.is_empty() {
                report.flagged += 1;
                for term in hits {
                    *report.matched_terms.entry(term.to_string()).or_default() += 1;
                }
            }
        }
        if report.total > 0 {
            report.rate = report.flagged as f64 / report.total as f64;
        }
        report
    }

    /// Fraction of records whose summary still contains a denylisted term.
    pub fn leakage_rate(&self, records: &[CaseRecord]) -> f64 {
        if records.is_empty() {
            return 0.0;
        }
        let flagged = records
            .iter()
            .filter_map(CaseRecord::summary_text)
            .filter(|text| self.is_leaking(text))
            .count();
        flagged as f64 / records.len() as f64
    }

    /// Splits records into those that are safe to train on and the rest.
    pub fn partition(&self, records: Vec<CaseRecord>) -> (Vec<CaseRecord>, Vec<CaseRecord>) {
        records
            .into_iter()
            .partition(|record| record.summary_text().map_or(true, |text| !self.is_leaking(text)))
    }
}

/// Substring test of `term` against already-lowercased text.
fn contains_term(lower: &str, term: &str) -> bool {
    if term.chars().any(char::is_uppercase) {
        lower.contains(term.to_lowercase().as_str())
    } else {
        lower.contains(term)
    }
}
