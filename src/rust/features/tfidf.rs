//! TF-IDF vectorizer over word unigrams and bigrams.
//!
//! Text is truncated to a fixed number of characters, lowercased and split on
//! the token pattern `(?u)\b\w\w+\b`. The vocabulary is frozen at fit time;
//! unknown terms contribute nothing at transform time.

use std::collections::HashMap;

use lazy_static::lazy_static;
use log::debug;
use ndarray::{Array1, Array2};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::utils::{normalize_vector, truncate_chars};

lazy_static! {
    static ref TOKEN_PATTERN: Regex = Regex::new(r"(?u)\b\w\w+\b").expect("valid token pattern");
}

/// Parameters controlling vocabulary selection and text analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizerParams {
    /// Upper bound on the vocabulary size
    pub max_features: usize,
    /// Inclusive (min, max) n-gram lengths
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in
    pub max_df: f64,
    /// Characters kept from each document before analysis
    pub max_chars: usize,
}

impl Default for VectorizerParams {
    fn default() -> Self {
        Self {
            max_features: 1000,
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.95,
            max_chars: 1000,
        }
    }
}

impl VectorizerParams {
    pub fn validate(&self) -> Result<(), String> {
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi {
            return Err(format!("invalid n-gram range ({}, {})", lo, hi));
        }
        if self.max_features == 0 {
            return Err("max_features must be positive".into());
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return Err(format!("max_df must be in (0, 1], got {}", self.max_df));
        }
        if self.max_chars == 0 {
            return Err("max_chars must be positive".into());
        }
        Ok(())
    }
}

/// A fitted TF-IDF vectorizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "VectorizerState")]
pub struct TfidfVectorizer {
    params: VectorizerParams,
    /// Vocabulary terms in feature order (lexicographic)
    terms: Vec<String>,
    /// Smoothed inverse document frequency, aligned with `terms`
    idf: Vec<f64>,
    /// Number of documents seen at fit time
    n_documents: usize,
    #[serde(skip)]
    vocabulary: HashMap<String, usize>,
}

impl PartialEq for TfidfVectorizer {
    fn eq(&self, other: &Self) -> bool {
        self.params == other.params
            && self.terms == other.terms
            && self.idf == other.idf
            && self.n_documents == other.n_documents
    }
}

impl TfidfVectorizer {
    /// Splits text into the n-gram terms used as vocabulary candidates.
    pub fn analyze(params: &VectorizerParams, text: &str) -> Vec<String> {
        let text = truncate_chars(text, params.max_chars).to_lowercase();
        let tokens: Vec<&str> = TOKEN_PATTERN.find_iter(&text).map(|m| m.as_str()).collect();

        let (lo, hi) = params.ngram_range;
        let mut terms = Vec::new();
        for n in lo..=hi {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        terms
    }

    /// Learns the vocabulary and IDF weights from a corpus.
    ///
    /// Terms must appear in at least `min_df` documents and in no more than
    /// `max_df` of them. When more survive than `max_features`, the most
    /// frequent across the corpus are kept (ties broken by term order).
    pub fn fit<S: AsRef<str>>(params: VectorizerParams, documents: &[S]) -> Self {
        let n_documents = documents.len();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();
        let mut corpus_frequency: HashMap<String, usize> = HashMap::new();

        for doc in documents {
            let mut seen: HashMap<String, usize> = HashMap::new();
            for term in Self::analyze(&params, doc.as_ref()) {
                *seen.entry(term).or_insert(0) += 1;
            }
            for (term, count) in seen {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
                *corpus_frequency.entry(term).or_insert(0) += count;
            }
        }

        let max_doc_count = params.max_df * n_documents as f64;
        let mut candidates: Vec<(String, usize)> = document_frequency
            .iter()
            .filter(|(_, &df)| df >= params.min_df && (df as f64) <= max_doc_count)
            .map(|(term, _)| (term.clone(), corpus_frequency[term]))
            .collect();

        if candidates.len() > params.max_features {
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            candidates.truncate(params.max_features);
        }

        let mut terms: Vec<String> = candidates.into_iter().map(|(term, _)| term).collect();
        terms.sort();

        let idf = terms
            .iter()
            .map(|term| {
                let df = document_frequency[term] as f64;
                ((1.0 + n_documents as f64) / (1.0 + df)).ln() + 1.0
            })
            .collect();

        debug!(
            "Fitted TF-IDF vocabulary: {} terms from {} documents ({} candidate terms)",
            terms.len(),
            n_documents,
            document_frequency.len()
        );

        Self::from_parts(params, terms, idf, n_documents)
    }

    /// Builds a vectorizer from a known vocabulary; `terms` must be sorted and
    /// aligned with `idf`.
    pub fn from_parts(params: VectorizerParams, terms: Vec<String>, idf: Vec<f64>, n_documents: usize) -> Self {
        let vocabulary = terms
            .iter()
            .enumerate()
            .map(|(idx, term)| (term.clone(), idx))
            .collect();
        Self {
            params,
            terms,
            idf,
            n_documents,
            vocabulary,
        }
    }

    pub fn params(&self) -> &VectorizerParams {
        &self.params
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    pub fn n_documents(&self) -> usize {
        self.n_documents
    }

    /// Width of the vectors produced by [`transform`](Self::transform).
    pub fn dimension(&self) -> usize {
        self.terms.len()
    }

    pub fn term_index(&self, term: &str) -> Option<usize> {
        self.vocabulary.get(term).copied()
    }

    /// Converts a document into an L2-normalised TF-IDF vector.
    pub fn transform(&self, text: &str) -> Array1<f64> {
        let mut counts = Array1::<f64>::zeros(self.dimension());
        for term in Self::analyze(&self.params, text) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                counts[idx] += 1.0;
            }
        }
        for (value, idf) in counts.iter_mut().zip(&self.idf) {
            *value *= idf;
        }
        normalize_vector(&counts)
    }

    pub fn transform_batch<S: AsRef<str>>(&self, documents: &[S]) -> Array2<f64> {
        let mut matrix = Array2::<f64>::zeros((documents.len(), self.dimension()));
        for (mut row, doc) in matrix.rows_mut().into_iter().zip(documents) {
            row.assign(&self.transform(doc.as_ref()));
        }
        matrix
    }
}

#[derive(Deserialize)]
struct VectorizerState {
    params: VectorizerParams,
    terms: Vec<String>,
    idf: Vec<f64>,
    n_documents: usize,
}

impl From<VectorizerState> for TfidfVectorizer {
    fn from(state: VectorizerState) -> Self {
        Self::from_parts(state.params, state.terms, state.idf, state.n_documents)
    }
}
