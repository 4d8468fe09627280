//! Records returned by the query layer.
//!
//! Patients and phenotype classes are owned by the graph store; here they are
//! immutable, serde-decoded snapshots. Field names serialize in camelCase to
//! match the property names used in the store.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Entities
// ============================================================================

/// A patient node.
///
/// Commonly used clinical attributes are promoted to named fields; anything
/// else the upstream format carried lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(deserialize_with = "lenient_required_string")]
    pub patient_id: String,
    #[serde(default)]
    pub cohort: String,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub ethnicity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub maternal_ethnicity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub paternal_ethnicity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub life_status: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub global_age_of_onset: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub allergies: Option<String>,
    /// Present when the query collected the patient's phenotypes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phenotypes: Vec<PhenotypeClass>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Patient {
    pub fn new(patient_id: impl Into<String>, cohort: impl Into<String>) -> Self {
        Self {
            patient_id: patient_id.into(),
            cohort: cohort.into(),
            sex: None,
            gender: None,
            ethnicity: None,
            maternal_ethnicity: None,
            paternal_ethnicity: None,
            life_status: None,
            global_age_of_onset: None,
            allergies: None,
            phenotypes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    /// Stored attributes (everything except identity, cohort and phenotypes),
    /// as a JSON object suitable for a `SET p += $attributes` parameter.
    pub fn attributes(&self) -> serde_json::Map<String, Value> {
        let mut out = serde_json::Map::new();
        if let Ok(Value::Object(all)) = serde_json::to_value(self) {
            for (k, v) in all {
                if matches!(k.as_str(), "patientId" | "cohort" | "phenotypes") || v.is_null() {
                    continue;
                }
                out.insert(k, v);
            }
        }
        out
    }
}

/// A phenotype ontology class (e.g. an HPO term).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenotypeClass {
    /// Stable identifier, e.g. `HP_0001250`.
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// A phenotype class reached by a phenotype search, with the patients of one
/// cohort (per-cohort results) or of all cohorts (overall results).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhenotypeMatch {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub patients: Vec<Patient>,
}

// ============================================================================
// Aggregated responses
// ============================================================================

/// One cohort's contribution to an aggregated response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortResult<T> {
    pub cohort: String,
    pub items: Vec<T>,
    pub num_patients: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResponse<T> {
    /// De-duplicated results across every included cohort.
    pub overall: Vec<T>,
    pub per_cohort: Vec<CohortResult<T>>,
    /// Cohorts with matches the caller may not see.
    #[serde(default)]
    pub cohorts_denied: Vec<String>,
    /// Cohorts whose queries failed; their results are absent.
    #[serde(default)]
    pub cohorts_failed: Vec<String>,
    /// Sum of `num_patients` over `per_cohort`.
    pub num_patients: u64,
}

impl<T> Default for AggregatedResponse<T> {
    fn default() -> Self {
        Self {
            overall: Vec::new(),
            per_cohort: Vec::new(),
            cohorts_denied: Vec::new(),
            cohorts_failed: Vec::new(),
            num_patients: 0,
        }
    }
}

impl<T> AggregatedResponse<T> {
    pub fn cohort(&self, name: &str) -> Option<&CohortResult<T>> {
        self.per_cohort.iter().find(|c| c.cohort == name)
    }
}

// ============================================================================
// Graph projection
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub radius: u32,
    pub color: String,
}

/// Directed from the traversal's start towards its end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// ============================================================================
// Lenient attribute decoding
// ============================================================================

// Seeded attributes are not consistently typed across sources (a sex of
// `"F"`, a flag of `true`, a count of `2`); named string fields accept any
// scalar and keep its textual form.
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn lenient_required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    scalar_to_string(Value::deserialize(deserializer)?)
        .ok_or_else(|| serde::de::Error::custom("patientId is null"))
}
