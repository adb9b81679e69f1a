//! Bundle and entry shapes as returned by the server.
//!
//! Only the members the pipeline reads are typed; everything else is carried
//! through verbatim so that persisted result files match what the server sent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single `Coding` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Coding {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// One entry of a search Bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEntry {
    #[serde(rename = "fullUrl", default, skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(default)]
    pub resource: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResourceEntry {
    pub fn new(resource: Value) -> Self {
        Self {
            full_url: None,
            resource,
            extra: Map::new(),
        }
    }

    pub fn has_resource(&self) -> bool {
        self.resource.is_object()
    }

    pub fn resource_type(&self) -> Option<&str> {
        self.resource.get("resourceType").and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.resource.get("id").and_then(Value::as_str)
    }

    /// `subject.reference`, falling back to `patient.reference`.
    pub fn subject_reference(&self) -> Option<&str> {
        ["subject", "patient"].iter().find_map(|field| {
            self.resource
                .get(*field)
                .and_then(|s| s.get("reference"))
                .and_then(Value::as_str)
        })
    }

    /// Codings under `code.coding`, or `medicationCodeableConcept.coding` for
    /// medication resources that carry their code inline.
    pub fn codings(&self) -> Vec<Coding> {
        ["code", "medicationCodeableConcept"]
            .iter()
            .find_map(|field| {
                self.resource
                    .get(*field)
                    .and_then(|c| c.get("coding"))
                    .and_then(Value::as_array)
            })
            .map(|codings| {
                codings
                    .iter()
                    .filter_map(|c| serde_json::from_value(c.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Inline medication codings only (`medicationCodeableConcept.coding`).
    pub fn inline_medication_codings(&self) -> Option<Vec<Coding>> {
        let codings = self
            .resource
            .get("medicationCodeableConcept")?
            .get("coding")?
            .as_array()?;
        Some(
            codings
                .iter()
                .filter_map(|c| serde_json::from_value(c.clone()).ok())
                .collect(),
        )
    }

    pub fn medication_reference(&self) -> Option<&str> {
        self.resource
            .get("medicationReference")
            .and_then(|r| r.get("reference"))
            .and_then(Value::as_str)
    }
}

/// A `Bundle.link` element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLink {
    pub relation: String,
    pub url: String,
}

/// A searchset Bundle page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Bundle {
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub link: Vec<BundleLink>,
    #[serde(default)]
    pub entry: Vec<ResourceEntry>,
}

impl Bundle {
    /// URL of the `next` page, if the server announced one.
    pub fn next_link(&self) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == "next")
            .map(|l| l.url.as_str())
    }
}
