use std::collections::{BTreeSet, HashMap};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classifier::PredictionError;

/// Label of the reserved fallback bucket.
pub const OTHER_CATEGORY: &str = "OUTROS";

lazy_static! {
    static ref PANEL_ORDINAL: Regex = Regex::new(r"(\d+ª)").expect("valid panel pattern");
}

/// Reduces a raw panel identifier to its ordinal token ("3ª TURMA" -> "3ª").
///
/// Identifiers without a `<digits>ª` token collapse to [`OTHER_CATEGORY`].
pub fn normalize_panel(raw: &str) -> String {
    PANEL_ORDINAL
        .find(raw)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| OTHER_CATEGORY.to_string())
}

/// Closed-vocabulary encoder from a raw category value to a stable integer code.
///
/// Classes are the frequent values plus [`OTHER_CATEGORY`], sorted, and a
/// value's code is its index in that list. Anything outside the frequent set
/// encodes as OTHER.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "EncoderState")]
pub struct CategoryEncoder {
    field: String,
    min_support: usize,
    classes: Vec<String>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl CategoryEncoder {
    /// Counts each distinct value and keeps those seen at least `min_support` times.
    pub fn fit<'a, I>(field: impl Into<String>, values: I, min_support: usize) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in values {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut classes: BTreeSet<String> = counts
            .into_iter()
            .filter(|(_, count)| *count >= min_support.max(1))
            .map(|(value, _)| value.to_string())
            .collect();
        classes.insert(OTHER_CATEGORY.to_string());

        Self::from_classes(field, min_support, classes.into_iter().collect())
    }

    /// Builds an encoder from an explicit class list, sorting it first.
    pub fn from_classes(field: impl Into<String>, min_support: usize, mut classes: Vec<String>) -> Self {
        classes.sort();
        classes.dedup();
        let mut encoder = Self {
            field: field.into(),
            min_support,
            classes,
            index: HashMap::new(),
        };
        encoder.rebuild_index();
        encoder
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .classes
            .iter()
            .enumerate()
            .map(|(code, class)| (class.clone(), code))
            .collect();
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn min_support(&self) -> usize {
        self.min_support
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// True when the value has its own code (not folded into OTHER).
    pub fn is_frequent(&self, value: &str) -> bool {
        value != OTHER_CATEGORY && self.index.contains_key(value)
    }

    /// Code reserved for the OTHER bucket.
    pub fn other_code(&self) -> Result<usize, PredictionError> {
        self.index
            .get(OTHER_CATEGORY)
            .copied()
            .ok_or_else(|| PredictionError::UnknownCategory {
                field: self.field.clone(),
                value: OTHER_CATEGORY.to_string(),
            })
    }

    /// Code for a raw value, falling back to OTHER for anything not frequent.
    pub fn encode(&self, value: &str) -> Result<usize, PredictionError> {
        match self.index.get(value) {
            Some(&code) => Ok(code),
            None => self.other_code().map_err(|_| PredictionError::UnknownCategory {
                field: self.field.clone(),
                value: value.to_string(),
            }),
        }
    }

    /// Code for a panel identifier.
    ///
    /// Identifiers without an ordinal token go straight to OTHER; the
    /// frequency set is only consulted for extracted tokens.
    pub fn encode_panel(&self, raw: &str) -> Result<usize, PredictionError> {
        let token = normalize_panel(raw);
        if token == OTHER_CATEGORY {
            return self.other_code();
        }
        self.encode(&token)
    }
}

/// Serialized form; the lookup table is rebuilt on load.
#[derive(Deserialize)]
struct EncoderState {
    field: String,
    min_support: usize,
    classes: Vec<String>,
}

impl From<EncoderState> for CategoryEncoder {
    fn from(state: EncoderState) -> Self {
        Self::from_classes(state.field, state.min_support, state.classes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tax_encoder() -> CategoryEncoder {
        let mut values = vec!["IRPJ"; 5];
        values.extend(vec!["COFINS"; 3]);
        values.push("ITR");
        CategoryEncoder::fit("tributo", values, 3)
    }

    #[test]
    fn test_frequent_values_get_sorted_codes() {
        let encoder = tax_encoder();
        assert_eq!(encoder.classes(), &["COFINS", "IRPJ", "OUTROS"]);
        assert_eq!(encoder.encode("COFINS").unwrap(), 0);
        assert_eq!(encoder.encode("IRPJ").unwrap(), 1);
        assert!(encoder.is_frequent("IRPJ"));
        assert!(!encoder.is_frequent("ITR"));
    }

    #[test]
    fn test_rare_and_unseen_values_map_to_other() {
        let encoder = tax_encoder();
        let other = encoder.other_code().unwrap();
        assert_eq!(other, 2);
        assert_eq!(encoder.encode("ITR").unwrap(), other);
        assert_eq!(encoder.encode("IPI").unwrap(), other);
        assert_eq!(encoder.encode("").unwrap(), other);
        // stable across repeated calls
        for _ in 0..10 {
            assert_eq!(encoder.encode("never seen").unwrap(), other);
        }
    }

    #[test]
    fn test_other_always_present() {
        let encoder = CategoryEncoder::fit("tributo", vec!["IRPJ"; 10], 1);
        assert_eq!(encoder.classes(), &["IRPJ", "OUTROS"]);
    }

    #[test]
    fn test_missing_other_is_unknown_category() {
        let encoder = CategoryEncoder::from_classes("tributo", 1, vec!["IRPJ".to_string()]);
        let err = encoder.encode("CSLL").unwrap_err();
        assert!(matches!(
            err,
            PredictionError::UnknownCategory { ref field, ref value } if field == "tributo" && value == "CSLL"
        ));
    }

    #[test]
    fn test_normalize_panel() {
        assert_eq!(normalize_panel("3ª TURMA/CÂMARA SUPERIOR REC. FISCAIS"), "3ª");
        assert_eq!(normalize_panel("1ª Turma Extraordinária da 2ª Seção"), "1ª");
        assert_eq!(normalize_panel("Turma Especial"), OTHER_CATEGORY);
        assert_eq!(normalize_panel(""), OTHER_CATEGORY);
    }

    #[test]
    fn test_panel_without_ordinal_bypasses_frequency_set() {
        // marker-less panels go straight to OTHER
        let panels = ["3ª", "3ª", "1ª", "Turma Especial"];
        let normalized: Vec<String> = panels.iter().map(|p| normalize_panel(p)).collect();
        let encoder = CategoryEncoder::fit("turma", normalized.iter().map(String::as_str), 1);
        let other = encoder.other_code().unwrap();
        assert_eq!(encoder.encode_panel("Câmara Superior").unwrap(), other);
        assert_eq!(encoder.encode_panel("3ª TURMA").unwrap(), encoder.encode("3ª").unwrap());
        assert_eq!(encoder.encode_panel("9ª TURMA").unwrap(), other);
    }

    #[test]
    fn test_serde_restores_index() {
        let encoder = tax_encoder();
        let json = serde_json::to_string(&encoder).unwrap();
        let restored: CategoryEncoder = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, encoder);
        assert_eq!(restored.encode("IRPJ").unwrap(), 1);
    }
}
