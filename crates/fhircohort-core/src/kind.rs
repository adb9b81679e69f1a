//! Resource kinds fetched per patient, with their output layout and metrics.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::metric::MetricKey;
use crate::vocabulary::Vocabulary;

/// The three medication resource sub-types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationKind {
    Administration,
    Request,
    Statement,
}

impl MedicationKind {
    pub const ALL: [MedicationKind; 3] = [Self::Administration, Self::Request, Self::Statement];

    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Administration => "MedicationAdministration",
            Self::Request => "MedicationRequest",
            Self::Statement => "MedicationStatement",
        }
    }

    fn folder(&self) -> &'static str {
        match self {
            Self::Administration => "Administrations",
            Self::Request => "Requests",
            Self::Statement => "Statements",
        }
    }
}

/// A resource category the orchestrator fetches for each patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Observation,
    Condition,
    Medication(MedicationKind),
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        Self::Observation,
        Self::Condition,
        Self::Medication(MedicationKind::Administration),
        Self::Medication(MedicationKind::Request),
        Self::Medication(MedicationKind::Statement),
    ];

    pub fn resource_type(&self) -> &'static str {
        match self {
            Self::Observation => "Observation",
            Self::Condition => "Condition",
            Self::Medication(kind) => kind.resource_type(),
        }
    }

    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            Self::Observation => Vocabulary::Loinc,
            Self::Condition => Vocabulary::Icd,
            Self::Medication(_) => Vocabulary::Atc,
        }
    }

    /// Directory of this kind's result files, relative to the output root.
    pub fn relative_dir(&self) -> PathBuf {
        let base = PathBuf::from(self.vocabulary().label());
        match self {
            Self::Medication(kind) => base.join(kind.folder()),
            _ => base,
        }
    }

    pub fn file_suffix(&self) -> &'static str {
        match self {
            Self::Observation => "observations",
            Self::Condition => "conditions",
            Self::Medication(MedicationKind::Administration) => "medicationAdministrations",
            Self::Medication(MedicationKind::Request) => "medicationRequests",
            Self::Medication(MedicationKind::Statement) => "medicationStatements",
        }
    }

    /// `{discriminator}_patient_{suffix}.json`
    pub fn file_name(&self, discriminator: &str) -> String {
        format!("{discriminator}_patient_{}.json", self.file_suffix())
    }

    /// Counter recording how many patients had at least one entry.
    ///
    /// Conditions have none; their coverage is computed by the secondary
    /// condition aggregator after main diagnoses are excluded.
    pub fn patient_count_metric(&self) -> Option<MetricKey> {
        match self {
            Self::Observation => Some(MetricKey::PatientCountWithObservations),
            Self::Condition => None,
            Self::Medication(MedicationKind::Administration) => {
                Some(MetricKey::PatientCountWithMedicationAdministrations)
            }
            Self::Medication(MedicationKind::Request) => {
                Some(MetricKey::PatientCountWithMedicationRequests)
            }
            Self::Medication(MedicationKind::Statement) => {
                Some(MetricKey::PatientCountWithMedicationStatements)
            }
        }
    }

    pub fn frequency_metric(&self) -> MetricKey {
        match self {
            Self::Observation => MetricKey::ObservationsCounts,
            Self::Condition => MetricKey::SecondaryConditionsCounts,
            Self::Medication(MedicationKind::Administration) => {
                MetricKey::MedicationAdministrationsCounts
            }
            Self::Medication(MedicationKind::Request) => MetricKey::MedicationRequestsCounts,
            Self::Medication(MedicationKind::Statement) => MetricKey::MedicationStatementsCounts,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.resource_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_per_kind() {
        assert_eq!(ResourceKind::Observation.relative_dir(), PathBuf::from("LOINC"));
        assert_eq!(ResourceKind::Condition.relative_dir(), PathBuf::from("ICD"));
        assert_eq!(
            ResourceKind::Medication(MedicationKind::Request).relative_dir(),
            PathBuf::from("ATC").join("Requests")
        );
        assert_eq!(
            ResourceKind::Medication(MedicationKind::Statement).file_name("3"),
            "3_patient_medicationStatements.json"
        );
    }

    #[test]
    fn metrics_per_kind() {
        assert_eq!(ResourceKind::Condition.patient_count_metric(), None);
        assert_eq!(
            ResourceKind::Observation.patient_count_metric(),
            Some(MetricKey::PatientCountWithObservations)
        );
        assert_eq!(
            ResourceKind::Medication(MedicationKind::Administration).frequency_metric(),
            MetricKey::MedicationAdministrationsCounts
        );
    }

    #[test]
    fn every_kind_has_distinct_directory() {
        let dirs: std::collections::HashSet<_> =
            ResourceKind::ALL.iter().map(|k| k.relative_dir()).collect();
        assert_eq!(dirs.len(), ResourceKind::ALL.len());
    }
}
