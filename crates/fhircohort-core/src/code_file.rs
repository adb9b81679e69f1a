//! Loading of the JSON code lists that drive each fetch.
//!
//! Three shapes are accepted:
//! - `{"codes": [{"code": "X", ...}]}` (main diagnoses, LOINC)
//! - `{"codes": [{"description": "...", "code": ["X", "Y"]}]}` (ICD groups)
//! - a bare array of either record form (ATC)

use std::fs;
use std::path::Path;

use indexmap::IndexSet;
use serde::Deserialize;

use crate::code_filter::CodeFilter;
use crate::error::{CoreError, Result};
use crate::vocabulary::{Vocabulary, VocabularySystems};

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeFileDocument {
    Wrapped { codes: Vec<CodeRecord> },
    Bare(Vec<CodeRecord>),
}

#[derive(Deserialize)]
struct CodeRecord {
    code: CodeValue,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CodeValue {
    One(String),
    Many(Vec<String>),
}

/// A group of codes sharing one description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeGroup {
    pub description: Option<String>,
    pub codes: Vec<String>,
}

/// A parsed code file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeList {
    pub groups: Vec<CodeGroup>,
}

impl CodeList {
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        let document: CodeFileDocument = serde_json::from_str(content)?;
        let records = match document {
            CodeFileDocument::Wrapped { codes } => codes,
            CodeFileDocument::Bare(codes) => codes,
        };
        let groups = records
            .into_iter()
            .map(|record| CodeGroup {
                description: record.description,
                codes: match record.code {
                    CodeValue::One(code) => vec![code],
                    CodeValue::Many(codes) => codes,
                },
            })
            .collect();
        Ok(Self { groups })
    }

    /// All codes in file order, without duplicates.
    pub fn codes(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| g.codes.iter().cloned())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn into_filter(self, vocabulary: Vocabulary, systems: &VocabularySystems) -> CodeFilter {
        CodeFilter::new(vocabulary, systems.system(vocabulary), self.codes())
    }
}

/// Read a code file from disk. A missing or malformed file is an error.
pub fn load_code_file(path: impl AsRef<Path>) -> Result<CodeList> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
    CodeList::from_json(&content).map_err(|e| CoreError::invalid_code_file(path, e.to_string()))
}

/// Read a code file and turn it into a filter for `vocabulary`.
pub fn load_code_filter(
    path: impl AsRef<Path>,
    vocabulary: Vocabulary,
    systems: &VocabularySystems,
) -> Result<CodeFilter> {
    Ok(load_code_file(path)?.into_filter(vocabulary, systems))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapped_single_codes() {
        let list = CodeList::from_json(
            r#"{"codes": [{"code": "718-7", "display": "Hemoglobin"}, {"code": "2345-7"}]}"#,
        )
        .unwrap();
        assert_eq!(list.codes(), vec!["718-7", "2345-7"]);
    }

    #[test]
    fn wrapped_groups_flatten_in_order() {
        let list = CodeList::from_json(
            r#"{"codes": [
                {"description": "Hypertension", "code": ["I10", "I11.0"]},
                {"description": "Diabetes", "code": ["E11.9", "I10"]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.groups.len(), 2);
        assert_eq!(list.groups[0].description.as_deref(), Some("Hypertension"));
        assert_eq!(list.codes(), vec!["I10", "I11.0", "E11.9"]);
    }

    #[test]
    fn bare_array() {
        let list = CodeList::from_json(r#"[{"code": "R03AC02"}, {"code": "R03BA01"}]"#).unwrap();
        let filter = list.into_filter(Vocabulary::Atc, &VocabularySystems::default());
        assert_eq!(filter.len(), 2);
        assert!(filter.contains("R03BA01"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loinc_codes.json");
        std::fs::write(&path, r#"{"codes": [{"no_code": 1}]}"#).unwrap();
        let err = load_code_file(&path).unwrap_err();
        assert!(matches!(err, CoreError::InvalidCodeFile { .. }));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = load_code_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }
}
