use std::fmt;

/// The fixed set of counters kept in the metadata document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKey {
    CohortPatientCount,
    CohortPatientsWithMainDiagnosis,
    PatientCountWithSecondaryConditions,
    PatientCountWithObservations,
    PatientCountWithMedicationRequests,
    PatientCountWithMedicationAdministrations,
    PatientCountWithMedicationStatements,
    /// Can exceed the patient count: one patient may be main-diagnosed in
    /// several encounters.
    MainDiagnosisCount,
    MainDiagnosisCounts,
    SecondaryConditionsCounts,
    ObservationsCounts,
    MedicationAdministrationsCounts,
    MedicationRequestsCounts,
    MedicationStatementsCounts,
}

impl MetricKey {
    pub const ALL: [MetricKey; 14] = [
        Self::CohortPatientCount,
        Self::CohortPatientsWithMainDiagnosis,
        Self::PatientCountWithSecondaryConditions,
        Self::PatientCountWithObservations,
        Self::PatientCountWithMedicationRequests,
        Self::PatientCountWithMedicationAdministrations,
        Self::PatientCountWithMedicationStatements,
        Self::MainDiagnosisCount,
        Self::MainDiagnosisCounts,
        Self::SecondaryConditionsCounts,
        Self::ObservationsCounts,
        Self::MedicationAdministrationsCounts,
        Self::MedicationRequestsCounts,
        Self::MedicationStatementsCounts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CohortPatientCount => "cohort_patient_count",
            Self::CohortPatientsWithMainDiagnosis => "cohort_patients_with_main_diagnosis",
            Self::PatientCountWithSecondaryConditions => "patient_count_with_secondary_conditions",
            Self::PatientCountWithObservations => "patient_count_with_observations",
            Self::PatientCountWithMedicationRequests => "patient_count_with_medicationRequests",
            Self::PatientCountWithMedicationAdministrations => {
                "patient_count_with_medicationAdministrations"
            }
            Self::PatientCountWithMedicationStatements => {
                "patient_count_with_medicationStatements"
            }
            Self::MainDiagnosisCount => "main_diagnosis_count",
            Self::MainDiagnosisCounts => "main_diagnosis_counts",
            Self::SecondaryConditionsCounts => "secondary_conditions_counts",
            Self::ObservationsCounts => "observations_counts",
            Self::MedicationAdministrationsCounts => "medicationAdministrations_counts",
            Self::MedicationRequestsCounts => "medicationRequests_counts",
            Self::MedicationStatementsCounts => "medicationStatements_counts",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
