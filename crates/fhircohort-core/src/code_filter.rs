use indexmap::IndexSet;

use crate::entry::{Coding, ResourceEntry};
use crate::vocabulary::Vocabulary;

/// A vocabulary plus an ordered, duplicate-free set of codes.
///
/// An empty filter matches nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFilter {
    vocabulary: Vocabulary,
    system: String,
    codes: IndexSet<String>,
}

impl CodeFilter {
    pub fn new<I, S>(vocabulary: Vocabulary, system: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            vocabulary,
            system: system.into(),
            codes: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.codes.contains(code)
    }

    /// `system == filter system AND code ∈ filter`.
    pub fn matches(&self, coding: &Coding) -> bool {
        match (&coding.system, &coding.code) {
            (Some(system), Some(code)) => system == &self.system && self.contains(code),
            _ => false,
        }
    }

    /// Codes of every matching coding in the entry, in coding order.
    pub fn matching_codes(&self, entry: &ResourceEntry) -> Vec<String> {
        entry
            .codings()
            .into_iter()
            .filter(|c| self.matches(c))
            .filter_map(|c| c.code)
            .collect()
    }

    pub fn matches_entry(&self, entry: &ResourceEntry) -> bool {
        entry.codings().iter().any(|c| self.matches(c))
    }

    /// Keep entries with at least one matching coding, preserving order.
    pub fn filter_entries(&self, entries: Vec<ResourceEntry>) -> Vec<ResourceEntry> {
        if self.is_empty() {
            return Vec::new();
        }
        entries
            .into_iter()
            .filter(|e| self.matches_entry(e))
            .collect()
    }

    /// Search token value `system|c1,system|c2,...` for the given codes.
    pub fn token_clause<'a>(&self, codes: impl IntoIterator<Item = &'a str>) -> String {
        codes
            .into_iter()
            .map(|code| format!("{}|{}", self.system, code))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Split the codes into batches of at most `size` codes.
    ///
    /// Yields `ceil(len / size)` batches; an empty filter yields none.
    pub fn batches(&self, size: usize) -> Vec<Vec<&str>> {
        let size = size.max(1);
        let codes: Vec<&str> = self.codes().collect();
        codes.chunks(size).map(|chunk| chunk.to_vec()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ICD: &str = "http://fhir.de/CodeSystem/bfarm/icd-10-gm";

    fn condition(system: &str, code: &str) -> ResourceEntry {
        ResourceEntry::new(json!({
            "resourceType": "Condition",
            "code": {"coding": [{"system": system, "code": code}]}
        }))
    }

    #[test]
    fn matches_requires_system_and_code() {
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, ["J45.0", "J45.1"]);
        assert!(filter.matches_entry(&condition(ICD, "J45.0")));
        assert!(!filter.matches_entry(&condition(ICD, "J44.0")));
        assert!(!filter.matches_entry(&condition("http://other", "J45.0")));
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, Vec::<String>::new());
        assert!(filter.is_empty());
        let entries = vec![condition(ICD, "J45.0"), condition(ICD, "J44.0")];
        assert!(filter.filter_entries(entries).is_empty());
        assert!(filter.batches(30).is_empty());
    }

    #[test]
    fn filter_entries_preserves_order_and_is_idempotent() {
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, ["J45.0", "J45.1"]);
        let entries = vec![
            condition(ICD, "J45.1"),
            condition(ICD, "J44.0"),
            condition(ICD, "J45.0"),
        ];
        let once = filter.filter_entries(entries.clone());
        let pure: Vec<ResourceEntry> = entries
            .into_iter()
            .filter(|e| {
                e.codings().iter().any(|c| {
                    c.system.as_deref() == Some(ICD)
                        && matches!(c.code.as_deref(), Some("J45.0" | "J45.1"))
                })
            })
            .collect();
        assert_eq!(once, pure);
        assert_eq!(filter.filter_entries(once.clone()), once);
    }

    #[test]
    fn batches_cover_all_codes() {
        let codes: Vec<String> = (0..61).map(|i| format!("C{i:02}")).collect();
        let filter = CodeFilter::new(Vocabulary::Icd, ICD, codes.clone());
        let batches = filter.batches(30);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.len() <= 30));
        let flattened: Vec<&str> = batches.into_iter().flatten().collect();
        assert_eq!(flattened, codes.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn duplicate_codes_collapse() {
        let filter = CodeFilter::new(Vocabulary::Loinc, "http://loinc.org", ["1", "2", "1"]);
        assert_eq!(filter.len(), 2);
    }

    #[test]
    fn token_clause_qualifies_each_code() {
        let filter = CodeFilter::new(Vocabulary::Atc, "atc", ["R03AC02", "R03BA01"]);
        assert_eq!(
            filter.token_clause(filter.codes()),
            "atc|R03AC02,atc|R03BA01"
        );
    }
}
