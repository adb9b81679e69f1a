//! The three coding systems the pipeline filters on.

use serde::{Deserialize, Serialize};

pub const DEFAULT_ICD_SYSTEM: &str = "http://fhir.de/CodeSystem/bfarm/icd-10-gm";
pub const DEFAULT_LOINC_SYSTEM: &str = "http://loinc.org";
pub const DEFAULT_ATC_SYSTEM: &str = "http://fhir.de/CodeSystem/bfarm/atc";

/// A named vocabulary qualifying a code's meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vocabulary {
    /// Diagnoses
    Icd,
    /// Lab tests
    Loinc,
    /// Medications
    Atc,
}

impl Vocabulary {
    /// Directory name used for result files of this vocabulary.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Icd => "ICD",
            Self::Loinc => "LOINC",
            Self::Atc => "ATC",
        }
    }
}

impl std::fmt::Display for Vocabulary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// System URIs for each vocabulary, resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularySystems {
    #[serde(default = "default_icd")]
    pub icd: String,
    #[serde(default = "default_loinc")]
    pub loinc: String,
    #[serde(default = "default_atc")]
    pub atc: String,
}

impl VocabularySystems {
    pub fn system(&self, vocabulary: Vocabulary) -> &str {
        match vocabulary {
            Vocabulary::Icd => &self.icd,
            Vocabulary::Loinc => &self.loinc,
            Vocabulary::Atc => &self.atc,
        }
    }
}

impl Default for VocabularySystems {
    fn default() -> Self {
        Self {
            icd: default_icd(),
            loinc: default_loinc(),
            atc: default_atc(),
        }
    }
}

fn default_icd() -> String {
    DEFAULT_ICD_SYSTEM.to_string()
}

fn default_loinc() -> String {
    DEFAULT_LOINC_SYSTEM.to_string()
}

fn default_atc() -> String {
    DEFAULT_ATC_SYSTEM.to_string()
}
