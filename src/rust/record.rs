//! Case records and the label rules derived from their raw ruling fields.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One appeal case, as read from the historical dataset or supplied by a caller.
///
/// Every textual field is optional: empty or whitespace-only strings are
/// treated the same as a missing value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Tax category (`tributo`)
    #[serde(rename = "tributo", default)]
    pub tax_type: Option<String>,
    /// Judging panel (`turma`), conventionally starting with e.g. "3ª"
    #[serde(rename = "turma", default)]
    pub panel: Option<String>,
    /// Case summary (`texto_ementa`)
    #[serde(rename = "texto_ementa", default)]
    pub summary_text: Option<String>,
    /// Raw ruling text (`resultado_julgamento`), training only
    #[serde(rename = "resultado_julgamento", default)]
    pub ruling: Option<String>,
    /// Raw voting description (`votacao`), training only
    #[serde(rename = "votacao", default)]
    pub voting: Option<String>,
}

impl CaseRecord {
    /// Creates an inference-time record from the three predictive fields.
    pub fn new(
        tax_type: impl Into<String>,
        panel: impl Into<String>,
        summary_text: impl Into<String>,
    ) -> Self {
        Self {
            tax_type: Some(tax_type.into()),
            panel: Some(panel.into()),
            summary_text: Some(summary_text.into()),
            ruling: None,
            voting: None,
        }
    }

    /// Attaches the ground-truth fields used for training.
    pub fn with_outcome(mut self, ruling: impl Into<String>, voting: impl Into<String>) -> Self {
        self.ruling = Some(ruling.into());
        self.voting = Some(voting.into());
        self
    }

    pub fn tax_type(&self) -> Option<&str> {
        present(&self.tax_type)
    }

    pub fn panel(&self) -> Option<&str> {
        present(&self.panel)
    }

    pub fn summary_text(&self) -> Option<&str> {
        present(&self.summary_text)
    }

    pub fn ruling(&self) -> Option<&str> {
        present(&self.ruling)
    }

    pub fn voting(&self) -> Option<&str> {
        present(&self.voting)
    }

    /// True when every field the training pipeline requires is present.
    pub fn has_training_fields(&self) -> bool {
        self.ruling().is_some()
            && self.voting().is_some()
            && self.summary_text().is_some()
            && self.tax_type().is_some()
    }

    /// Disposition derived from the raw ruling, if one is recorded.
    pub fn disposition(&self) -> Option<Disposition> {
        self.ruling().map(Disposition::from_ruling)
    }

    /// Voting target derived from the raw voting and ruling fields.
    pub fn voting_type(&self) -> Option<VotingType> {
        match (self.voting(), self.ruling()) {
            (Some(voting), Some(ruling)) => VotingType::from_raw(voting, ruling),
            _ => None,
        }
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

/// Case disposition (resultado do julgamento).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Disposition {
    ProvidoTotal,
    ProvidoParcial,
    Negado,
    NaoConhecido,
    Outros,
}

impl Disposition {
    /// Dispositions the disposition classifier is trained on.
    pub const MODELED: [Disposition; 3] = [
        Disposition::ProvidoTotal,
        Disposition::ProvidoParcial,
        Disposition::Negado,
    ];

    /// Classifies a raw ruling string.
    ///
    /// Rules are evaluated in order over the lowercased text; the first match
    /// wins: Total > Parcial > Negado > NaoConhecido > Outros.
    pub fn from_ruling(ruling: &str) -> Self {
        let ruling = ruling.to_lowercase();
        let provided = ruling.contains("provido");
        let partial = ruling.contains("parcial");
        let denied = ruling.contains("negado");

        if provided && !partial && !denied {
            Self::ProvidoTotal
        } else if provided && partial {
            Self::ProvidoParcial
        } else if denied {
            Self::Negado
        } else if ruling.contains("nao conhecido") || ruling.contains("não conhecido") {
            Self::NaoConhecido
        } else {
            Self::Outros
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::ProvidoTotal => "Provido Total",
            Self::ProvidoParcial => "Provido Parcial",
            Self::Negado => "Negado",
            Self::NaoConhecido => "Nao Conhecido",
            Self::Outros => "Outros",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [
            Self::ProvidoTotal,
            Self::ProvidoParcial,
            Self::Negado,
            Self::NaoConhecido,
            Self::Outros,
        ]
        .into_iter()
        .find(|d| d.label() == label)
    }

    pub fn is_modeled(&self) -> bool {
        Self::MODELED.contains(self)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Negado)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the panel reached its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VotingType {
    Unanime,
    Maioria,
    Qualidade,
    Empate,
}

impl VotingType {
    /// Voting target for a case, defined only for provided (non-denied) rulings.
    ///
    /// The voting string must match one of the recorded values exactly after
    /// trimming; anything else yields `None`.
    pub fn from_raw(voting: &str, ruling: &str) -> Option<Self> {
        let ruling = ruling.to_lowercase();
        if !ruling.contains("provido") || ruling.contains("negado") {
            return None;
        }
        match voting.trim() {
            "Unânime" => Some(Self::Unanime),
            "Maioria" => Some(Self::Maioria),
            "Qualidade" => Some(Self::Qualidade),
            "Empate - Lei 13.988/2020" => Some(Self::Empate),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Unanime => "Unânime",
            Self::Maioria => "Maioria",
            Self::Qualidade => "Qualidade",
            Self::Empate => "Empate",
        }
    }
}

impl fmt::Display for VotingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
