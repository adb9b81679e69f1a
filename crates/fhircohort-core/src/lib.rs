pub mod code_file;
pub mod code_filter;
pub mod cohort;
pub mod entry;
pub mod error;
pub mod fhir_reference;
pub mod kind;
pub mod metric;
pub mod vocabulary;

pub use code_file::{CodeGroup, CodeList, load_code_file, load_code_filter};
pub use code_filter::CodeFilter;
pub use cohort::{Cohort, DiagnosisRef};
pub use entry::{Bundle, BundleLink, Coding, ResourceEntry};
pub use error::{CoreError, Result};
pub use fhir_reference::{FhirReference, UnresolvableReference, parse_reference};
pub use kind::{MedicationKind, ResourceKind};
pub use metric::MetricKey;
pub use vocabulary::{Vocabulary, VocabularySystems};
