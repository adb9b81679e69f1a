//! FHIR reference parsing for patient and medication references.
//!
//! References found in result files and cohort files appear as
//! - Relative: `Patient/123`
//! - Versioned: `Medication/abc/_history/1`
//! - Absolute URL: `http://example.org/fhir/Patient/123`
//!
//! Contained (`#id`) and URN references cannot be dereferenced.
//!
//! # Example
//!
//! ```
//! use fhircohort_core::fhir_reference::parse_reference;
//!
//! let reference = parse_reference("Medication/m-1/_history/2").unwrap();
//! assert_eq!(reference.resource_type, "Medication");
//! assert_eq!(reference.id, "m-1");
//! assert_eq!(reference.version.as_deref(), Some("2"));
//! ```

use std::fmt;

/// A successfully parsed FHIR reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FhirReference {
    pub resource_type: String,
    pub id: String,
    pub version: Option<String>,
}

impl FhirReference {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version: None,
        }
    }

    /// Returns the reference as a relative string (Type/id).
    pub fn to_relative(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }
}

impl fmt::Display for FhirReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_relative())
    }
}

/// A reference that cannot be read from the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnresolvableReference {
    Contained(String),
    Urn(String),
    Invalid(String),
}

impl fmt::Display for UnresolvableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contained(id) => write!(f, "contained reference: #{id}"),
            Self::Urn(urn) => write!(f, "URN reference: {urn}"),
            Self::Invalid(reason) => write!(f, "invalid reference: {reason}"),
        }
    }
}

impl std::error::Error for UnresolvableReference {}

/// Parse a reference string into type, id and optional version.
///
/// Absolute URLs are reduced to their last `Type/id[/_history/v]` segments.
pub fn parse_reference(reference: &str) -> Result<FhirReference, UnresolvableReference> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(UnresolvableReference::Invalid("empty reference".to_string()));
    }
    if let Some(contained_id) = reference.strip_prefix('#') {
        return Err(UnresolvableReference::Contained(contained_id.to_string()));
    }
    if reference.starts_with("urn:") {
        return Err(UnresolvableReference::Urn(reference.to_string()));
    }

    let path = reference
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(reference);
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();

    // Locate "Type/id" scanning from the end, skipping a trailing "_history/v".
    let (type_idx, version) = match parts.len() {
        n if n >= 4 && parts[n - 2] == "_history" => (n - 4, Some(parts[n - 1].to_string())),
        n if n >= 2 => (n - 2, None),
        _ => {
            return Err(UnresolvableReference::Invalid(format!(
                "reference must contain at least Type/id: {reference}"
            )));
        }
    };

    let resource_type = parts[type_idx];
    let id = parts[type_idx + 1];

    if !resource_type
        .chars()
        .next()
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
    {
        return Err(UnresolvableReference::Invalid(format!(
            "resource type must start with uppercase letter: {resource_type}"
        )));
    }

    Ok(FhirReference {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
        version,
    })
}

/// File-name-safe stem for a patient reference: `Patient/ab:1` -> `Patient-ab_1`.
pub fn reference_file_stem(reference: &str) -> String {
    reference
        .trim()
        .chars()
        .map(|c| match c {
            '/' => '-',
            c if c.is_ascii_alphanumeric() || c == '-' || c == '.' => c,
            _ => '_',
        })
        .collect()
}
