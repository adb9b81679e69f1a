//! The patient-to-diagnosis mapping produced by cohort extraction.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// A condition attached to a cohort patient: its id and its `code` element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisRef {
    pub id: String,
    #[serde(default)]
    pub code: Value,
}

impl DiagnosisRef {
    /// Code of the first coding, used to count main diagnoses.
    pub fn primary_code(&self) -> Option<&str> {
        self.code
            .get("coding")?
            .as_array()?
            .first()?
            .get("code")?
            .as_str()
    }
}

/// Patient reference -> diagnoses, in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cohort(pub IndexMap<String, Vec<DiagnosisRef>>);

impl Cohort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, patient: impl Into<String>, diagnosis: DiagnosisRef) {
        self.0.entry(patient.into()).or_default().push(diagnosis);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn patients(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    /// Ids of every condition in the cohort.
    pub fn diagnosis_ids(&self) -> HashSet<String> {
        self.0
            .values()
            .flat_map(|conditions| conditions.iter().map(|c| c.id.clone()))
            .collect()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| CoreError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CoreError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| CoreError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diagnosis(id: &str, code: &str) -> DiagnosisRef {
        DiagnosisRef {
            id: id.to_string(),
            code: json!({"coding": [{"system": "icd", "code": code}]}),
        }
    }

    #[test]
    fn push_groups_by_patient() {
        let mut cohort = Cohort::new();
        cohort.push("Patient/2", diagnosis("c1", "J45.0"));
        cohort.push("Patient/1", diagnosis("c2", "J44.9"));
        cohort.push("Patient/2", diagnosis("c3", "J45.1"));

        assert_eq!(cohort.patients(), vec!["Patient/2", "Patient/1"]);
        assert_eq!(cohort.0["Patient/2"].len(), 2);
        assert_eq!(cohort.diagnosis_ids().len(), 3);
        assert_eq!(cohort.0["Patient/1"][0].primary_code(), Some("J44.9"));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cohort.json");
        let mut cohort = Cohort::new();
        cohort.push("Patient/9", diagnosis("c9", "J45.9"));
        cohort.save(&path).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["Patient/9"][0]["id"], "c9");
        assert_eq!(Cohort::load(&path).unwrap(), cohort);
    }

    #[test]
    fn primary_code_missing() {
        let d = DiagnosisRef {
            id: "x".into(),
            code: Value::Null,
        };
        assert_eq!(d.primary_code(), None);
    }
}
