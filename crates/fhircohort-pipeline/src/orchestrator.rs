//! Runs one fetcher for every patient on a bounded worker pool.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use fhircohort_client::{Connector, PatientFetcher, RetryPolicy, SharedSession};
use fhircohort_core::{ResourceEntry, ResourceKind};
use futures_util::FutureExt;
use indexmap::IndexSet;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::metadata::MetadataStore;
use crate::result_store::ResultStore;

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub kind: ResourceKind,
    /// Unique patients a task was started for
    pub dispatched: usize,
    pub patients_with_results: usize,
    /// Tasks that errored or panicked
    pub failed: usize,
    pub entries: usize,
    pub files: Vec<PathBuf>,
}

pub struct Orchestrator {
    connector: Connector,
    results: ResultStore,
    max_workers: usize,
    retry: RetryPolicy,
}

enum TaskOutcome {
    Fetched(Vec<ResourceEntry>),
    Failed(String),
    Panicked(String),
}

impl Orchestrator {
    pub fn new(
        connector: Connector,
        results: ResultStore,
        max_workers: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            results,
            max_workers: max_workers.max(1),
            retry,
        }
    }

    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    /// Open a session and fetch `fetcher.kind()` for every patient.
    pub async fn run(
        &self,
        patients: &[String],
        fetcher: Arc<dyn PatientFetcher>,
        metadata: &mut MetadataStore,
    ) -> Result<FetchSummary> {
        let session = SharedSession::open_with_retry(self.connector.clone(), &self.retry).await?;
        self.run_with_session(&session, patients, fetcher, metadata)
            .await
    }

    pub async fn run_with_session(
        &self,
        session: &SharedSession,
        patients: &[String],
        fetcher: Arc<dyn PatientFetcher>,
        metadata: &mut MetadataStore,
    ) -> Result<FetchSummary> {
        let kind = fetcher.kind();
        self.results.prepare(kind)?;

        let unique: IndexSet<&str> = patients.iter().map(String::as_str).collect();
        info!(kind = %kind, patients = unique.len(), workers = self.max_workers, "dispatching fetch tasks");

        let permits = Arc::new(Semaphore::new(self.max_workers));
        let mut tasks = JoinSet::new();
        for patient in &unique {
            let patient = patient.to_string();
            let permits = Arc::clone(&permits);
            let fetcher = Arc::clone(&fetcher);
            let session = session.clone();
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return (patient, TaskOutcome::Failed(e.to_string())),
                };
                let outcome = match AssertUnwindSafe(fetcher.fetch(&session, &patient))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(entries)) => TaskOutcome::Fetched(entries),
                    Ok(Err(e)) => TaskOutcome::Failed(e.to_string()),
                    Err(panic) => TaskOutcome::Panicked(panic_message(panic.as_ref())),
                };
                (patient, outcome)
            });
        }

        let mut summary = FetchSummary {
            kind,
            dispatched: unique.len(),
            patients_with_results: 0,
            failed: 0,
            entries: 0,
            files: Vec::new(),
        };

        while let Some(joined) = tasks.join_next().await {
            let (patient, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!(kind = %kind, error = %e, "fetch task did not complete");
                    summary.failed += 1;
                    continue;
                }
            };
            let entries = match outcome {
                TaskOutcome::Fetched(entries) => entries,
                TaskOutcome::Failed(message) => {
                    warn!(kind = %kind, patient = %patient, error = %message, "fetch failed, no results for patient");
                    summary.failed += 1;
                    continue;
                }
                TaskOutcome::Panicked(message) => {
                    error!(kind = %kind, patient = %patient, panic = %message, "fetch task panicked");
                    summary.failed += 1;
                    continue;
                }
            };
            if entries.is_empty() {
                continue;
            }

            summary.patients_with_results += 1;
            summary.entries += entries.len();
            let discriminator = self
                .results
                .discriminator(&patient, summary.patients_with_results);
            let path = self.results.write(kind, &discriminator, &entries)?;
            summary.files.push(path);
        }

        if let Some(metric) = kind.patient_count_metric() {
            metadata.update(metric, summary.patients_with_results)?;
        }
        info!(
            kind = %kind,
            dispatched = summary.dispatched,
            with_results = summary.patients_with_results,
            failed = summary.failed,
            entries = summary.entries,
            "fetch finished"
        );
        Ok(summary)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
