//! The cohort, extract and analyze stages wired to configuration.

use std::sync::Arc;

use fhircohort_client::{
    ConditionFetcher, Connector, MedicationFetcher, ObservationFetcher, PatientFetcher,
    SharedSession,
};
use fhircohort_core::{
    CodeFilter, Cohort, MedicationKind, MetricKey, ResourceKind, Vocabulary, load_code_filter,
};
use tracing::info;

use crate::aggregate::{
    SecondaryConditionStats, ServerMedicationResolver, medication_frequencies,
    observation_frequencies, secondary_condition_frequencies,
};
use crate::cohort_extraction::{CohortExtractor, MainDiagnoses};
use crate::config::AppConfig;
use crate::error::Result;
use crate::metadata::{FrequencyTable, MedicationCounts, MetadataStore};
use crate::orchestrator::{FetchSummary, Orchestrator};
use crate::result_store::ResultStore;

#[derive(Debug, Clone)]
pub struct CohortReport {
    pub candidates: usize,
    pub main: MainDiagnoses,
}

#[derive(Debug, Clone, Default)]
pub struct AnalysisReport {
    pub observations: FrequencyTable,
    pub secondary_conditions: SecondaryConditionStats,
    pub medications: Vec<(MedicationKind, MedicationCounts)>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub cohort: CohortReport,
    pub fetches: Vec<FetchSummary>,
    pub analysis: AnalysisReport,
}

pub struct Pipeline {
    config: AppConfig,
}

impl Pipeline {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn connector(&self) -> Connector {
        Connector::new(
            self.config.server.base_url.clone(),
            self.config.auth.clone(),
            self.config.timeout(),
        )
    }

    pub fn results(&self) -> ResultStore {
        ResultStore::new(&self.config.output.root, self.config.output.naming)
    }

    pub fn open_metadata(&self) -> Result<MetadataStore> {
        MetadataStore::open(self.config.output.metadata_path())
    }

    fn filter(&self, vocabulary: Vocabulary) -> Result<CodeFilter> {
        let inputs = &self.config.inputs;
        let path = match vocabulary {
            Vocabulary::Icd => &inputs.icd_codes,
            Vocabulary::Loinc => &inputs.loinc_codes,
            Vocabulary::Atc => &inputs.atc_codes,
        };
        Ok(load_code_filter(path, vocabulary, &self.config.vocabularies)?)
    }

    fn fetcher(&self, kind: ResourceKind) -> Result<Arc<dyn PatientFetcher>> {
        let filter = self.filter(kind.vocabulary())?;
        let options = self.config.fetch_options();
        let fetcher: Arc<dyn PatientFetcher> = match kind {
            ResourceKind::Observation => Arc::new(ObservationFetcher::new(filter, options)),
            ResourceKind::Condition => Arc::new(ConditionFetcher::new(filter, options)),
            ResourceKind::Medication(medication) => Arc::new(MedicationFetcher::new(
                medication,
                self.config.fetch.medication_join,
                filter,
                options,
            )),
        };
        Ok(fetcher)
    }

    /// Find candidates, keep main diagnoses, write both patient files.
    pub async fn cohort(&self, metadata: &mut MetadataStore) -> Result<CohortReport> {
        let inputs = &self.config.inputs;
        let main_filter = load_code_filter(
            &inputs.main_diagnosis_codes,
            Vocabulary::Icd,
            &self.config.vocabularies,
        )?;
        let session = SharedSession::open_with_retry(self.connector(), &self.config.retry).await?;
        let extractor = CohortExtractor::new(
            session,
            self.config.fetch_options(),
            self.config.fetch.encounter_page_size,
            self.config.fetch.max_workers,
        );

        let candidates = extractor.find_candidates(&main_filter).await?;
        candidates.save(&inputs.candidates_file)?;
        metadata.update(MetricKey::CohortPatientCount, candidates.len())?;

        let main = extractor.filter_main_diagnoses(&candidates).await?;
        main.cohort.save(&inputs.cohort_file)?;
        metadata.update(MetricKey::CohortPatientsWithMainDiagnosis, main.cohort.len())?;
        metadata.update(MetricKey::MainDiagnosisCounts, main.counts.clone())?;
        metadata.update(MetricKey::MainDiagnosisCount, main.total())?;

        Ok(CohortReport {
            candidates: candidates.len(),
            main,
        })
    }

    /// Fetch `kinds` for every cohort patient.
    pub async fn extract(
        &self,
        kinds: &[ResourceKind],
        metadata: &mut MetadataStore,
    ) -> Result<Vec<FetchSummary>> {
        let cohort = Cohort::load(&self.config.inputs.cohort_file)?;
        let patients = cohort.patients();
        info!(patients = patients.len(), kinds = kinds.len(), "extracting resources for cohort");

        let orchestrator = Orchestrator::new(
            self.connector(),
            self.results(),
            self.config.fetch.max_workers,
            self.config.retry.clone(),
        );
        let mut summaries = Vec::with_capacity(kinds.len());
        for &kind in kinds {
            let fetcher = self.fetcher(kind)?;
            summaries.push(orchestrator.run(&patients, fetcher, metadata).await?);
        }
        Ok(summaries)
    }

    /// Compute every frequency table from the result files.
    pub async fn analyze(&self, metadata: &mut MetadataStore) -> Result<AnalysisReport> {
        let results = self.results();

        let observations = observation_frequencies(&results, &self.filter(Vocabulary::Loinc)?)?;
        metadata.update(MetricKey::ObservationsCounts, observations.clone())?;

        let main_ids = Cohort::load(&self.config.inputs.cohort_file)?.diagnosis_ids();
        let secondary_conditions =
            secondary_condition_frequencies(&results, &self.filter(Vocabulary::Icd)?, &main_ids)?;
        metadata.update(
            MetricKey::SecondaryConditionsCounts,
            secondary_conditions.counts.clone(),
        )?;
        metadata.update(
            MetricKey::PatientCountWithSecondaryConditions,
            secondary_conditions.patients.len(),
        )?;

        let atc = self.filter(Vocabulary::Atc)?;
        let resolver = ServerMedicationResolver::new(self.connector());
        let mut medications = Vec::with_capacity(MedicationKind::ALL.len());
        for kind in MedicationKind::ALL {
            let counts = medication_frequencies(&results, kind, &atc, &resolver).await?;
            metadata.update(ResourceKind::Medication(kind).frequency_metric(), counts.clone())?;
            medications.push((kind, counts));
        }

        Ok(AnalysisReport {
            observations,
            secondary_conditions,
            medications,
        })
    }

    /// Cohort, then all five kinds, then the frequency tables.
    pub async fn run_all(&self) -> Result<RunReport> {
        let mut metadata = self.open_metadata()?;
        let cohort = self.cohort(&mut metadata).await?;
        let fetches = self.extract(&ResourceKind::ALL, &mut metadata).await?;
        let analysis = self.analyze(&mut metadata).await?;
        Ok(RunReport {
            cohort,
            fetches,
            analysis,
        })
    }
}
