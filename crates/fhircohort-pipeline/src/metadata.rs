//! The metadata document: named counters accumulated across runs.
//!
//! [`MetadataStore`] owns the document in memory and rewrites the file on
//! every update. Updating takes `&mut self`, so there is exactly one writer;
//! worker tasks never see the store.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fhircohort_core::MetricKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

use crate::error::{PipelineError, Result};

/// Code -> occurrence count.
pub type FrequencyTable = BTreeMap<String, u64>;

/// Resource type -> tally, as written for each medication sub-type.
pub type MedicationCounts = BTreeMap<String, MedicationTally>;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MedicationTally {
    pub counting: Counting,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counting {
    pub total_count: u64,
    /// One single-key object per code, e.g. `[{"R03AC02": 3}]`
    pub details_count: Vec<BTreeMap<String, u64>>,
}

/// A value that can be stored under a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(u64),
    Frequencies(FrequencyTable),
    Medications(MedicationCounts),
}

impl MetricValue {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Count(_) => "count",
            Self::Frequencies(_) => "frequency table",
            Self::Medications(_) => "medication breakdown",
        }
    }
}

impl From<u64> for MetricValue {
    fn from(v: u64) -> Self {
        Self::Count(v)
    }
}

impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        Self::Count(v as u64)
    }
}

impl From<FrequencyTable> for MetricValue {
    fn from(v: FrequencyTable) -> Self {
        Self::Frequencies(v)
    }
}

impl From<MedicationCounts> for MetricValue {
    fn from(v: MedicationCounts) -> Self {
        Self::Medications(v)
    }
}

/// The fixed-schema document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataDocument {
    #[serde(default)]
    pub execution_date: String,
    #[serde(default)]
    pub execution_time: String,
    #[serde(default)]
    pub cohort_patient_count: u64,
    #[serde(default)]
    pub cohort_patients_with_main_diagnosis: u64,
    #[serde(default)]
    pub patient_count_with_secondary_conditions: u64,
    #[serde(default)]
    pub patient_count_with_observations: u64,
    #[serde(default, rename = "patient_count_with_medicationRequests")]
    pub patient_count_with_medication_requests: u64,
    #[serde(default, rename = "patient_count_with_medicationAdministrations")]
    pub patient_count_with_medication_administrations: u64,
    #[serde(default, rename = "patient_count_with_medicationStatements")]
    pub patient_count_with_medication_statements: u64,
    #[serde(default)]
    pub main_diagnosis_count: u64,
    #[serde(default)]
    pub main_diagnosis_counts: FrequencyTable,
    #[serde(default)]
    pub secondary_conditions_counts: FrequencyTable,
    #[serde(default)]
    pub observations_counts: FrequencyTable,
    #[serde(default, rename = "medicationAdministrations_counts")]
    pub medication_administrations_counts: MedicationCounts,
    #[serde(default, rename = "medicationRequests_counts")]
    pub medication_requests_counts: MedicationCounts,
    #[serde(default, rename = "medicationStatements_counts")]
    pub medication_statements_counts: MedicationCounts,
    /// Members written by other tools are carried along untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for MetadataDocument {
    fn default() -> Self {
        Self {
            execution_date: String::new(),
            execution_time: String::new(),
            cohort_patient_count: 0,
            cohort_patients_with_main_diagnosis: 0,
            patient_count_with_secondary_conditions: 0,
            patient_count_with_observations: 0,
            patient_count_with_medication_requests: 0,
            patient_count_with_medication_administrations: 0,
            patient_count_with_medication_statements: 0,
            main_diagnosis_count: 0,
            main_diagnosis_counts: FrequencyTable::new(),
            secondary_conditions_counts: FrequencyTable::new(),
            observations_counts: FrequencyTable::new(),
            medication_administrations_counts: MedicationCounts::new(),
            medication_requests_counts: MedicationCounts::new(),
            medication_statements_counts: MedicationCounts::new(),
            extra: Map::new(),
        }
    }
}

impl MetadataDocument {
    fn set(&mut self, key: MetricKey, value: MetricValue) -> Result<()> {
        let mismatch = |value: &MetricValue| PipelineError::MetricType {
            key,
            given: value.kind_name(),
        };
        match (key, value) {
            (key, MetricValue::Count(n)) => match self.scalar_mut(key) {
                Some(slot) => *slot = n,
                None => return Err(mismatch(&MetricValue::Count(n))),
            },
            (MetricKey::MainDiagnosisCounts, MetricValue::Frequencies(t)) => {
                self.main_diagnosis_counts = t
            }
            (MetricKey::SecondaryConditionsCounts, MetricValue::Frequencies(t)) => {
                self.secondary_conditions_counts = t
            }
            (MetricKey::ObservationsCounts, MetricValue::Frequencies(t)) => {
                self.observations_counts = t
            }
            (MetricKey::MedicationAdministrationsCounts, MetricValue::Medications(m)) => {
                self.medication_administrations_counts = m
            }
            (MetricKey::MedicationRequestsCounts, MetricValue::Medications(m)) => {
                self.medication_requests_counts = m
            }
            (MetricKey::MedicationStatementsCounts, MetricValue::Medications(m)) => {
                self.medication_statements_counts = m
            }
            // An empty JSON object parses as a frequency table.
            (
                MetricKey::MedicationAdministrationsCounts
                | MetricKey::MedicationRequestsCounts
                | MetricKey::MedicationStatementsCounts,
                MetricValue::Frequencies(t),
            ) if t.is_empty() => {
                self.set(key, MetricValue::Medications(MedicationCounts::new()))?;
            }
            (_, value) => return Err(mismatch(&value)),
        }
        Ok(())
    }

    /// The counter field behind `key`; `None` for table-valued keys.
    fn scalar_mut(&mut self, key: MetricKey) -> Option<&mut u64> {
        let slot = match key {
            MetricKey::CohortPatientCount => &mut self.cohort_patient_count,
            MetricKey::CohortPatientsWithMainDiagnosis => {
                &mut self.cohort_patients_with_main_diagnosis
            }
            MetricKey::PatientCountWithSecondaryConditions => {
                &mut self.patient_count_with_secondary_conditions
            }
            MetricKey::PatientCountWithObservations => &mut self.patient_count_with_observations,
            MetricKey::PatientCountWithMedicationRequests => {
                &mut self.patient_count_with_medication_requests
            }
            MetricKey::PatientCountWithMedicationAdministrations => {
                &mut self.patient_count_with_medication_administrations
            }
            MetricKey::PatientCountWithMedicationStatements => {
                &mut self.patient_count_with_medication_statements
            }
            MetricKey::MainDiagnosisCount => &mut self.main_diagnosis_count,
            MetricKey::MainDiagnosisCounts
            | MetricKey::SecondaryConditionsCounts
            | MetricKey::ObservationsCounts
            | MetricKey::MedicationAdministrationsCounts
            | MetricKey::MedicationRequestsCounts
            | MetricKey::MedicationStatementsCounts => return None,
        };
        Some(slot)
    }
}

pub struct MetadataStore {
    path: PathBuf,
    document: MetadataDocument,
}

impl MetadataStore {
    /// Load the document at `path`, or start from the zeroed schema.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let document = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).map_err(|source| {
                PipelineError::MalformedMetadata {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MetadataDocument::default(),
            Err(e) => return Err(PipelineError::io(&path, e)),
        };
        Ok(Self { path, document })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &MetadataDocument {
        &self.document
    }

    pub fn update(&mut self, key: MetricKey, value: impl Into<MetricValue>) -> Result<()> {
        self.stamp()?;
        self.document.set(key, value.into())?;
        self.flush()?;
        debug!(metric = %key, "metadata saved");
        Ok(())
    }

    /// Update by name. Unknown names are logged and skipped; the timestamps
    /// are still refreshed. Returns whether the name was recognized.
    pub fn update_by_name(&mut self, name: &str, value: impl Into<MetricValue>) -> Result<bool> {
        match MetricKey::from_name(name) {
            Some(key) => {
                self.update(key, value)?;
                Ok(true)
            }
            None => {
                warn!(metric = name, "metric not defined in metadata schema, skipping");
                self.stamp()?;
                self.flush()?;
                Ok(false)
            }
        }
    }

    fn stamp(&mut self) -> Result<()> {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        self.document.execution_date = now.format(format_description!("[year]-[month]-[day]"))?;
        self.document.execution_time =
            now.format(format_description!("[hour]:[minute]:[second]"))?;
        Ok(())
    }

    /// Write to a sibling temp file, then rename over the document.
    fn flush(&self) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        let content = serde_json::to_string_pretty(&self.document)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| PipelineError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| PipelineError::io(&self.path, e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn without_timestamps(mut doc: MetadataDocument) -> MetadataDocument {
        doc.execution_date.clear();
        doc.execution_time.clear();
        doc
    }

    #[test]
    fn update_writes_schema_and_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fhir_results").join("metadata.json");
        let mut store = MetadataStore::open(&path).unwrap();
        store
            .update(MetricKey::PatientCountWithObservations, 12usize)
            .unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["patient_count_with_observations"], 12);
        assert_eq!(raw["patient_count_with_medicationRequests"], 0);
        assert!(raw["observations_counts"].as_object().unwrap().is_empty());
        assert_eq!(raw["execution_date"].as_str().unwrap().len(), 10);
        assert_eq!(raw["execution_time"].as_str().unwrap().len(), 8);
    }

    #[test]
    fn values_accumulate_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut first = MetadataStore::open(&path).unwrap();
        first
            .update(
                MetricKey::ObservationsCounts,
                FrequencyTable::from([("718-7".to_string(), 4)]),
            )
            .unwrap();

        let mut second = MetadataStore::open(&path).unwrap();
        second.update(MetricKey::CohortPatientCount, 7u64).unwrap();
        assert_eq!(second.document().observations_counts["718-7"], 4);
        assert_eq!(second.document().cohort_patient_count, 7);
    }

    #[test]
    fn unknown_metric_only_touches_timestamps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut store = MetadataStore::open(&path).unwrap();
        store.update(MetricKey::MainDiagnosisCount, 3u64).unwrap();
        let before = without_timestamps(store.document().clone());

        let recognized = store.update_by_name("bogus_metric", 99u64).unwrap();
        assert!(!recognized);

        let reloaded = MetadataStore::open(&path).unwrap();
        assert_eq!(without_timestamps(reloaded.document().clone()), before);
        assert!(!reloaded.document().extra.contains_key("bogus_metric"));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = MetadataStore::open(dir.path().join("m.json")).unwrap();
        let err = store
            .update(MetricKey::ObservationsCounts, 5u64)
            .unwrap_err();
        assert!(matches!(err, PipelineError::MetricType { .. }));
    }

    #[test]
    fn each_counter_lands_in_its_own_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut store = MetadataStore::open(&path).unwrap();

        let mut scalars = Vec::new();
        for (value, key) in (1u64..).zip(MetricKey::ALL) {
            match store.update(key, value) {
                Ok(()) => scalars.push((key, value)),
                Err(err) => assert!(matches!(err, PipelineError::MetricType { .. })),
            }
        }
        assert_eq!(scalars.len(), 8);

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for (key, value) in scalars {
            assert_eq!(raw[key.as_str()], value, "{key}");
        }
        assert!(raw["main_diagnosis_counts"].as_object().unwrap().is_empty());
    }

    #[test]
    fn medication_breakdown_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        let mut store = MetadataStore::open(&path).unwrap();
        let counts = MedicationCounts::from([(
            "MedicationRequest".to_string(),
            MedicationTally {
                counting: Counting {
                    total_count: 3,
                    details_count: vec![BTreeMap::from([("R03AC02".to_string(), 3)])],
                },
            },
        )]);
        store
            .update(MetricKey::MedicationRequestsCounts, counts.clone())
            .unwrap();

        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            raw["medicationRequests_counts"]["MedicationRequest"]["counting"]["total_count"],
            3
        );
        let reloaded = MetadataStore::open(&path).unwrap();
        assert_eq!(reloaded.document().medication_requests_counts, counts);
    }

    #[test]
    fn foreign_members_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.json");
        fs::write(&path, r#"{"notes": "manual", "cohort_patient_count": 2}"#).unwrap();
        let mut store = MetadataStore::open(&path).unwrap();
        store.update(MetricKey::MainDiagnosisCount, 1u64).unwrap();
        let raw: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["notes"], "manual");
        assert_eq!(raw["cohort_patient_count"], 2);
    }
}
