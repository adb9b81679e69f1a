//! Selecting the cohort: candidate patients by condition code, then the
//! conditions that are the chief complaint of an encounter.

use std::collections::HashSet;

use fhircohort_client::{FetchOptions, SharedSession, search_all};
use fhircohort_core::{CodeFilter, Cohort, DiagnosisRef, ResourceEntry, parse_reference};
use futures_util::{StreamExt, TryStreamExt, stream};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::Result;
use crate::metadata::FrequencyTable;

/// `Encounter.diagnosis.use` code marking the chief complaint.
pub const CHIEF_COMPLAINT: &str = "CC";

/// Result of the main-diagnosis filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MainDiagnoses {
    pub cohort: Cohort,
    /// First-coding code -> number of main-diagnosis conditions
    pub counts: FrequencyTable,
}

impl MainDiagnoses {
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

pub struct CohortExtractor {
    session: SharedSession,
    options: FetchOptions,
    encounter_page_size: u32,
    max_workers: usize,
}

impl CohortExtractor {
    pub fn new(
        session: SharedSession,
        options: FetchOptions,
        encounter_page_size: u32,
        max_workers: usize,
    ) -> Self {
        Self {
            session,
            options,
            encounter_page_size,
            max_workers: max_workers.max(1),
        }
    }

    /// Every patient with a condition coded by `main_filter`, with those
    /// conditions.
    pub async fn find_candidates(&self, main_filter: &CodeFilter) -> Result<Cohort> {
        let mut candidates = Cohort::new();
        for code in main_filter.codes() {
            let params = vec![
                ("_count".to_string(), self.options.page_size.to_string()),
                ("code".to_string(), main_filter.token_clause([code])),
            ];
            let conditions =
                search_all(&self.session, &self.options.retry, "Condition", params).await?;
            debug!(code, conditions = conditions.len(), "conditions for main diagnosis code");
            for entry in &conditions {
                let (Some(patient), Some(id)) = (entry.subject_reference(), entry.id()) else {
                    continue;
                };
                candidates.push(
                    patient,
                    DiagnosisRef {
                        id: id.to_string(),
                        code: entry.resource.get("code").cloned().unwrap_or(Value::Null),
                    },
                );
            }
        }
        info!(patients = candidates.len(), "candidate patients found");
        Ok(candidates)
    }

    /// Keep the candidate conditions that some encounter lists as chief
    /// complaint. Output order follows `candidates`.
    pub async fn filter_main_diagnoses(&self, candidates: &Cohort) -> Result<MainDiagnoses> {
        let checked: Vec<(String, Vec<DiagnosisRef>)> = stream::iter(candidates.0.iter())
            .map(|(patient, conditions)| self.main_diagnoses_of(patient, conditions))
            .buffered(self.max_workers)
            .try_collect()
            .await?;

        let mut result = MainDiagnoses::default();
        for (patient, conditions) in checked {
            for condition in conditions {
                if let Some(code) = condition.primary_code() {
                    *result.counts.entry(code.to_string()).or_insert(0) += 1;
                }
                result.cohort.push(patient.clone(), condition);
            }
        }
        info!(
            patients = result.cohort.len(),
            main_diagnoses = result.total(),
            "main diagnoses identified"
        );
        Ok(result)
    }

    async fn main_diagnoses_of(
        &self,
        patient: &str,
        conditions: &[DiagnosisRef],
    ) -> Result<(String, Vec<DiagnosisRef>)> {
        let mut kept = Vec::new();
        let mut seen = HashSet::new();
        for condition in conditions {
            if !seen.insert(condition.id.as_str()) {
                continue;
            }
            let condition_ref = format!("Condition/{}", condition.id);
            let params = vec![
                ("_count".to_string(), self.encounter_page_size.to_string()),
                ("subject".to_string(), patient.to_string()),
                ("diagnosis".to_string(), condition_ref.clone()),
            ];
            let encounters =
                search_all(&self.session, &self.options.retry, "Encounter", params).await?;
            if encounters
                .iter()
                .any(|encounter| is_chief_complaint(encounter, &condition_ref))
            {
                kept.push(condition.clone());
            }
        }
        debug!(patient, kept = kept.len(), "encounters checked");
        Ok((patient.to_string(), kept))
    }
}

/// Whether `encounter` lists `condition_ref` as a diagnosis used as chief
/// complaint.
pub fn is_chief_complaint(encounter: &ResourceEntry, condition_ref: &str) -> bool {
    let Some(diagnoses) = encounter.resource.get("diagnosis").and_then(Value::as_array) else {
        return false;
    };
    diagnoses.iter().any(|diagnosis| {
        let refers = diagnosis
            .get("condition")
            .and_then(|c| c.get("reference"))
            .and_then(Value::as_str)
            .is_some_and(|r| same_reference(r, condition_ref));
        let chief = diagnosis
            .get("use")
            .and_then(|u| u.get("coding"))
            .and_then(Value::as_array)
            .is_some_and(|codings| {
                codings
                    .iter()
                    .any(|c| c.get("code").and_then(Value::as_str) == Some(CHIEF_COMPLAINT))
            });
        refers && chief
    })
}

fn same_reference(reference: &str, relative: &str) -> bool {
    reference == relative
        || parse_reference(reference).is_ok_and(|parsed| parsed.to_relative() == relative)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn encounter(diagnosis: Value) -> ResourceEntry {
        ResourceEntry::new(json!({
            "resourceType": "Encounter",
            "id": "e1",
            "diagnosis": diagnosis
        }))
    }

    #[test]
    fn chief_complaint_must_match_condition_and_use() {
        let enc = encounter(json!([
            {
                "condition": {"reference": "Condition/c1"},
                "use": {"coding": [{"code": "CC"}]}
            },
            {
                "condition": {"reference": "Condition/c2"},
                "use": {"coding": [{"code": "AD"}]}
            }
        ]));
        assert!(is_chief_complaint(&enc, "Condition/c1"));
        assert!(!is_chief_complaint(&enc, "Condition/c2"));
        assert!(!is_chief_complaint(&enc, "Condition/c3"));
    }

    #[test]
    fn absolute_condition_reference_matches() {
        let enc = encounter(json!([{
            "condition": {"reference": "https://fhir.example.org/fhir/Condition/c1"},
            "use": {"coding": [{"system": "http://terminology.hl7.org/CodeSystem/diagnosis-role", "code": "CC"}]}
        }]));
        assert!(is_chief_complaint(&enc, "Condition/c1"));
    }

    #[test]
    fn encounter_without_diagnosis_is_not_chief_complaint() {
        let enc = ResourceEntry::new(json!({"resourceType": "Encounter", "id": "e2"}));
        assert!(!is_chief_complaint(&enc, "Condition/c1"));
    }
}
