//! Per-patient fetchers for observations, conditions and medications.
//!
//! Each query unit (first page plus every following page) runs under the
//! fetcher's [`RetryPolicy`]; a retry restarts the unit from its first page.

use async_trait::async_trait;
use fhircohort_core::{CodeFilter, MedicationKind, ResourceEntry, ResourceKind, parse_reference};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::connector::SharedSession;
use crate::error::Result;
use crate::paginator::drain;
use crate::retry::{RetryPolicy, with_retry};
use crate::session::FhirSession;

pub const DEFAULT_PAGE_SIZE: u32 = 1000;
pub const DEFAULT_CONDITION_BATCH_SIZE: usize = 30;

/// Fetches one resource kind for one patient.
#[async_trait]
pub trait PatientFetcher: Send + Sync {
    fn kind(&self) -> ResourceKind;

    async fn fetch(&self, session: &SharedSession, patient: &str) -> Result<Vec<ResourceEntry>>;
}

/// Knobs shared by all fetchers.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub page_size: u32,
    pub condition_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            condition_batch_size: DEFAULT_CONDITION_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

/// Search a resource type and drain every page, retrying per policy.
pub async fn search_all(
    session: &SharedSession,
    retry: &RetryPolicy,
    resource_type: &str,
    params: Vec<(String, String)>,
) -> Result<Vec<ResourceEntry>> {
    with_retry(session, retry, resource_type, |s| {
        let params = params.clone();
        async move {
            let first = s.search(resource_type, &params).await?;
            drain(&s, first).await
        }
    })
    .await
}

fn param(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

/// Observations are searched by subject only and filtered locally.
pub struct ObservationFetcher {
    filter: CodeFilter,
    options: FetchOptions,
}

impl ObservationFetcher {
    pub fn new(filter: CodeFilter, options: FetchOptions) -> Self {
        Self { filter, options }
    }
}

#[async_trait]
impl PatientFetcher for ObservationFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Observation
    }

    async fn fetch(&self, session: &SharedSession, patient: &str) -> Result<Vec<ResourceEntry>> {
        if self.filter.is_empty() {
            return Ok(Vec::new());
        }
        debug!(patient, "querying observations");
        let params = vec![
            param("_count", self.options.page_size.to_string()),
            param("subject", patient),
        ];
        let entries = search_all(session, &self.options.retry, "Observation", params).await?;
        let filtered = self.filter.filter_entries(entries);
        info!(patient, observations = filtered.len(), "observations fetched");
        Ok(filtered)
    }
}

/// Conditions are searched with the code clause split into batches.
pub struct ConditionFetcher {
    filter: CodeFilter,
    options: FetchOptions,
}

impl ConditionFetcher {
    pub fn new(filter: CodeFilter, options: FetchOptions) -> Self {
        Self { filter, options }
    }
}

#[async_trait]
impl PatientFetcher for ConditionFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Condition
    }

    async fn fetch(&self, session: &SharedSession, patient: &str) -> Result<Vec<ResourceEntry>> {
        debug!(patient, "querying conditions");
        let mut conditions = Vec::new();
        for batch in self.filter.batches(self.options.condition_batch_size) {
            let params = vec![
                param("_count", self.options.page_size.to_string()),
                param("subject", patient),
                param("code", self.filter.token_clause(batch)),
            ];
            let batch_result = search_all(session, &self.options.retry, "Condition", params).await?;
            conditions.extend(batch_result);
        }
        info!(patient, conditions = conditions.len(), "conditions fetched");
        Ok(conditions)
    }
}

/// How a medication resource is joined to its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicationJoin {
    /// The resource points at a separate Medication record (`medication.code`).
    #[default]
    Reference,
    /// The resource carries `medicationCodeableConcept` itself (`code`).
    Inline,
}

impl MedicationJoin {
    pub fn code_param(&self) -> &'static str {
        match self {
            Self::Reference => "medication.code",
            Self::Inline => "code",
        }
    }
}

pub struct MedicationFetcher {
    kind: MedicationKind,
    join: MedicationJoin,
    filter: CodeFilter,
    options: FetchOptions,
}

impl MedicationFetcher {
    pub fn new(
        kind: MedicationKind,
        join: MedicationJoin,
        filter: CodeFilter,
        options: FetchOptions,
    ) -> Self {
        Self {
            kind,
            join,
            filter,
            options,
        }
    }
}

#[async_trait]
impl PatientFetcher for MedicationFetcher {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Medication(self.kind)
    }

    async fn fetch(&self, session: &SharedSession, patient: &str) -> Result<Vec<ResourceEntry>> {
        if self.filter.is_empty() {
            return Ok(Vec::new());
        }
        let resource_type = self.kind.resource_type();
        debug!(patient, resource_type, "querying medications");
        let params = vec![
            param("_count", self.options.page_size.to_string()),
            param("patient", patient),
            param(
                self.join.code_param(),
                self.filter.token_clause(self.filter.codes()),
            ),
        ];
        let entries = search_all(session, &self.options.retry, resource_type, params).await?;
        info!(patient, resource_type, medications = entries.len(), "medications fetched");
        Ok(entries)
    }
}

/// Read the Medication behind `reference` and return its first code that
/// passes `filter`. Single attempt; callers decide what a failure means.
pub async fn resolve_medication_code(
    session: &FhirSession,
    reference: &str,
    filter: &CodeFilter,
) -> Result<Option<String>> {
    let target = parse_reference(reference)?;
    let medication = session.read(&target.resource_type, &target.id).await?;
    let entry = ResourceEntry::new(medication);
    Ok(filter.matching_codes(&entry).into_iter().next())
}
