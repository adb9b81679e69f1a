//! Frequency tables computed from the result files on disk.
//!
//! Every pass scans files in sorted name order and only reads; recording the
//! tables in the metadata document is left to the caller.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use fhircohort_client::{Connector, SharedSession, resolve_medication_code};
use fhircohort_core::{CodeFilter, MedicationKind, ResourceEntry, ResourceKind};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::metadata::{Counting, FrequencyTable, MedicationCounts, MedicationTally};
use crate::result_store::ResultStore;

/// Code recorded for a medication whose code could not be determined.
pub const UNRESOLVED: &str = "unresolved";

fn count_matching(table: &mut FrequencyTable, filter: &CodeFilter, entry: &ResourceEntry) -> bool {
    let codes = filter.matching_codes(entry);
    for code in &codes {
        *table.entry(code.clone()).or_insert(0) += 1;
    }
    !codes.is_empty()
}

fn scan<F>(results: &ResultStore, kind: ResourceKind, mut visit: F) -> Result<()>
where
    F: FnMut(&ResourceEntry),
{
    for path in results.files(kind)? {
        debug!(file = %path.display(), "scanning result file");
        for entry in results.read(&path)? {
            if entry.has_resource() {
                visit(&entry);
            }
        }
    }
    Ok(())
}

/// Count every observation coding that passes `filter`.
pub fn observation_frequencies(results: &ResultStore, filter: &CodeFilter) -> Result<FrequencyTable> {
    let mut table = FrequencyTable::new();
    scan(results, ResourceKind::Observation, |entry| {
        count_matching(&mut table, filter, entry);
    })?;
    info!(codes = table.len(), "observation frequencies computed");
    Ok(table)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecondaryConditionStats {
    pub counts: FrequencyTable,
    /// Subject references with at least one counted condition
    pub patients: BTreeSet<String>,
}

/// Count condition codings that pass `filter`, skipping the conditions whose
/// id is a main diagnosis.
pub fn secondary_condition_frequencies(
    results: &ResultStore,
    filter: &CodeFilter,
    main_diagnosis_ids: &HashSet<String>,
) -> Result<SecondaryConditionStats> {
    let mut stats = SecondaryConditionStats::default();
    scan(results, ResourceKind::Condition, |entry| {
        if entry.id().is_some_and(|id| main_diagnosis_ids.contains(id)) {
            return;
        }
        if count_matching(&mut stats.counts, filter, entry)
            && let Some(subject) = entry.subject_reference()
        {
            stats.patients.insert(subject.to_string());
        }
    })?;
    info!(
        codes = stats.counts.len(),
        patients = stats.patients.len(),
        "secondary condition frequencies computed"
    );
    Ok(stats)
}

/// Looks up the code behind a `medicationReference`.
#[async_trait]
pub trait MedicationResolver: Send + Sync {
    /// First code of the referenced Medication passing `filter`. `None` when
    /// it cannot be read or has no such code.
    async fn resolve(&self, reference: &str, filter: &CodeFilter) -> Option<String>;
}

/// Reads Medication resources from the server, opening a session on first
/// use. Each lookup is a single attempt.
pub struct ServerMedicationResolver {
    connector: Connector,
    session: OnceCell<SharedSession>,
}

impl ServerMedicationResolver {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            session: OnceCell::new(),
        }
    }
}

#[async_trait]
impl MedicationResolver for ServerMedicationResolver {
    async fn resolve(&self, reference: &str, filter: &CodeFilter) -> Option<String> {
        let session = match self
            .session
            .get_or_try_init(|| SharedSession::open(self.connector.clone()))
            .await
        {
            Ok(session) => session,
            Err(e) => {
                warn!(reference, error = %e, "cannot open session to resolve medication");
                return None;
            }
        };
        match resolve_medication_code(&session.current(), reference, filter).await {
            Ok(code) => code,
            Err(e) => {
                warn!(reference, error = %e, "medication reference not resolved");
                None
            }
        }
    }
}

/// Count stored medication entries of one sub-type by resource type and
/// code. Inline codes are used when present; references are resolved once
/// per distinct reference.
pub async fn medication_frequencies(
    results: &ResultStore,
    kind: MedicationKind,
    filter: &CodeFilter,
    resolver: &dyn MedicationResolver,
) -> Result<MedicationCounts> {
    let mut per_type: BTreeMap<String, FrequencyTable> = BTreeMap::new();
    let mut resolved: HashMap<String, Option<String>> = HashMap::new();

    for path in results.files(ResourceKind::Medication(kind))? {
        debug!(file = %path.display(), "scanning medication result file");
        for entry in results.read(&path)? {
            if !entry.has_resource() {
                continue;
            }
            let resource_type = entry
                .resource_type()
                .unwrap_or(kind.resource_type())
                .to_string();

            let code = match entry.inline_medication_codings() {
                Some(codings) => codings
                    .iter()
                    .find(|c| filter.matches(c))
                    .and_then(|c| c.code.clone()),
                None => match entry.medication_reference() {
                    Some(reference) => {
                        if !resolved.contains_key(reference) {
                            let code = resolver.resolve(reference, filter).await;
                            resolved.insert(reference.to_string(), code);
                        }
                        resolved.get(reference).cloned().flatten()
                    }
                    None => None,
                },
            };

            *per_type
                .entry(resource_type)
                .or_default()
                .entry(code.unwrap_or_else(|| UNRESOLVED.to_string()))
                .or_insert(0) += 1;
        }
    }

    let counts: MedicationCounts = per_type
        .into_iter()
        .map(|(resource_type, codes)| {
            let tally = MedicationTally {
                counting: Counting {
                    total_count: codes.values().sum(),
                    details_count: codes
                        .into_iter()
                        .map(|(code, n)| BTreeMap::from([(code, n)]))
                        .collect(),
                },
            };
            (resource_type, tally)
        })
        .collect();
    info!(
        kind = kind.resource_type(),
        lookups = resolved.len(),
        "medication frequencies computed"
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileNaming;
    use fhircohort_core::Vocabulary;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    const ICD: &str = "http://fhir.de/CodeSystem/bfarm/icd-10-gm";
    const LOINC: &str = "http://loinc.org";
    const ATC: &str = "http://fhir.de/CodeSystem/bfarm/atc";

    fn resource(resource_type: &str, id: &str, patient: &str, system: &str, code: &str) -> ResourceEntry {
        ResourceEntry::new(json!({
            "resourceType": resource_type,
            "id": id,
            "subject": {"reference": patient},
            "code": {"coding": [{"system": system, "code": code}]}
        }))
    }

    fn store() -> (tempfile::TempDir, ResultStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ResultStore::new(dir.path(), FileNaming::CompletionOrder);
        for kind in ResourceKind::ALL {
            store.prepare(kind).unwrap();
        }
        (dir, store)
    }

    #[test]
    fn condition_codes_outside_filter_are_ignored() {
        let (_dir, results) = store();
        results
            .write(
                ResourceKind::Condition,
                "1",
                &[
                    resource("Condition", "c1", "Patient/1", ICD, "J45.0"),
                    resource("Condition", "c2", "Patient/1", ICD, "J45.0"),
                    resource("Condition", "c3", "Patient/1", ICD, "J44.0"),
                ],
            )
            .unwrap();
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, ["J45.0", "J45.1"]);

        let stats = secondary_condition_frequencies(&results, &filter, &HashSet::new()).unwrap();
        assert_eq!(stats.counts, FrequencyTable::from([("J45.0".to_string(), 2)]));
        assert_eq!(stats.patients.len(), 1);
    }

    #[test]
    fn main_diagnoses_are_excluded() {
        let (_dir, results) = store();
        results
            .write(
                ResourceKind::Condition,
                "1",
                &[
                    resource("Condition", "main", "Patient/1", ICD, "J45.0"),
                    resource("Condition", "other", "Patient/2", ICD, "J45.1"),
                ],
            )
            .unwrap();
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, ["J45.0", "J45.1"]);
        let main = HashSet::from(["main".to_string()]);

        let stats = secondary_condition_frequencies(&results, &filter, &main).unwrap();
        assert_eq!(stats.counts, FrequencyTable::from([("J45.1".to_string(), 1)]));
        assert_eq!(stats.patients, BTreeSet::from(["Patient/2".to_string()]));
    }

    #[test]
    fn observation_pass_is_idempotent() {
        let (_dir, results) = store();
        results
            .write(
                ResourceKind::Observation,
                "1",
                &[
                    resource("Observation", "o1", "Patient/1", LOINC, "718-7"),
                    resource("Observation", "o2", "Patient/1", "http://other", "718-7"),
                ],
            )
            .unwrap();
        results
            .write(
                ResourceKind::Observation,
                "2",
                &[resource("Observation", "o3", "Patient/2", LOINC, "718-7")],
            )
            .unwrap();
        let filter = CodeFilter::new(Vocabulary::Loinc, LOINC, ["718-7"]);

        let first = observation_frequencies(&results, &filter).unwrap();
        let second = observation_frequencies(&results, &filter).unwrap();
        assert_eq!(first, FrequencyTable::from([("718-7".to_string(), 2)]));
        assert_eq!(first, second);
    }

    struct CountingResolver {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MedicationResolver for CountingResolver {
        async fn resolve(&self, reference: &str, _filter: &CodeFilter) -> Option<String> {
            self.calls.lock().unwrap().push(reference.to_string());
            match reference {
                "Medication/m1" => Some("R03AC02".to_string()),
                _ => None,
            }
        }
    }

    fn medication(id: &str, body: Value) -> ResourceEntry {
        let mut resource = json!({
            "resourceType": "MedicationRequest",
            "id": id,
            "subject": {"reference": "Patient/1"}
        });
        if let (Some(target), Some(extra)) = (resource.as_object_mut(), body.as_object()) {
            target.extend(extra.clone());
        }
        ResourceEntry::new(resource)
    }

    #[tokio::test]
    async fn medications_count_inline_resolved_and_unresolved() {
        let (_dir, results) = store();
        let kind = MedicationKind::Request;
        results
            .write(
                ResourceKind::Medication(kind),
                "1",
                &[
                    medication("r1", json!({"medicationReference": {"reference": "Medication/m1"}})),
                    medication("r2", json!({"medicationReference": {"reference": "Medication/m1"}})),
                    medication("r3", json!({"medicationReference": {"reference": "Medication/gone"}})),
                    medication(
                        "r4",
                        json!({"medicationCodeableConcept": {"coding": [{"system": ATC, "code": "R03AC02"}]}}),
                    ),
                ],
            )
            .unwrap();
        let filter = CodeFilter::new(Vocabulary::Atc, ATC, ["R03AC02"]);
        let resolver = CountingResolver {
            calls: Mutex::new(Vec::new()),
        };

        let counts = medication_frequencies(&results, kind, &filter, &resolver)
            .await
            .unwrap();

        let tally = &counts["MedicationRequest"].counting;
        assert_eq!(tally.total_count, 4);
        assert_eq!(
            tally.details_count,
            vec![
                BTreeMap::from([("R03AC02".to_string(), 3)]),
                BTreeMap::from([(UNRESOLVED.to_string(), 1)]),
            ]
        );
        // one lookup per distinct reference
        assert_eq!(resolver.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn empty_medication_folder_gives_empty_counts() {
        let (_dir, results) = store();
        let filter = CodeFilter::new(Vocabulary::Atc, ATC, ["R03AC02"]);
        let resolver = CountingResolver {
            calls: Mutex::new(Vec::new()),
        };
        let counts = medication_frequencies(&results, MedicationKind::Statement, &filter, &resolver)
            .await
            .unwrap();
        assert!(counts.is_empty());
    }
}
