//! Write patient records into the graph store.
//!
//! Statements, all parameterized:
//! - `MERGE (c:Cohort {cohort: $cohort})` once per load
//! - `MERGE (p:Patient {patientId: $patientId}) SET p += $attributes, p.cohort = $cohort`
//! - one `HAS_PHENOTYPE` link per phenotype, matched by class name or label
//!
//! A failing statement is counted and logged and the load carries on. A
//! patient whose own statement failed gets no link statements.

use std::path::Path;

use anyhow::Context;
use phenograph_core::{CypherQuery, GraphStoreClient, StoreValue};
use serde::Serialize;
use serde_json::Value;

use crate::adapter::{adapter_for, PatientRecord, PhenotypeRef, SourceFormat};

const COL_LINKED: &str = "linked";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub cohort: String,
    pub patients: usize,
    pub links: usize,
    /// Link statements that matched no phenotype class.
    pub unmatched_phenotypes: usize,
    pub failed_statements: usize,
}

fn cohort_statement(cohort: &str) -> CypherQuery {
    CypherQuery::new("MERGE (c:Cohort {cohort: $cohort})").param("cohort", cohort)
}

fn patient_statement(record: &PatientRecord, cohort: &str) -> CypherQuery {
    let attributes = record
        .patient
        .attributes()
        .into_iter()
        .map(|(k, v)| (k, property_value(v)))
        .collect();
    CypherQuery::new(
        "MERGE (p:Patient {patientId: $patientId}) SET p += $attributes, p.cohort = $cohort",
    )
    .param("patientId", record.patient.patient_id.as_str())
    .param("attributes", StoreValue::Map(attributes))
    .param("cohort", cohort)
}

fn link_statement(patient_id: &str, phenotype: &PhenotypeRef) -> CypherQuery {
    let (key, value) = match phenotype {
        PhenotypeRef::Id(id) => ("name", id),
        PhenotypeRef::Label(label) => ("label", label),
    };
    CypherQuery::new(format!(
        "MATCH (p:Patient {{patientId: $patientId}}), (c:Class {{{key}: $phenotype}}) \
         MERGE (p)-[:HAS_PHENOTYPE]->(c) \
         RETURN count(*) AS {COL_LINKED}"
    ))
    .param("patientId", patient_id)
    .param("phenotype", value.as_str())
    .returns(COL_LINKED)
}

/// Node properties hold scalars or flat lists; anything deeper is stored as
/// its JSON text.
fn property_value(value: Value) -> StoreValue {
    match value {
        Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => {
            StoreValue::from(Value::Array(items))
        }
        Value::Array(_) | Value::Object(_) => StoreValue::String(value.to_string()),
        scalar => StoreValue::from(scalar),
    }
}

pub async fn load_records<S>(store: &S, cohort: &str, records: &[PatientRecord]) -> LoadReport
where
    S: GraphStoreClient + ?Sized,
{
    let mut report = LoadReport {
        cohort: cohort.to_string(),
        ..LoadReport::default()
    };

    if let Err(e) = store.execute(&cohort_statement(cohort)).await {
        tracing::warn!(cohort, error = %e, "cohort statement failed");
        report.failed_statements += 1;
    }

    for record in records {
        let patient_id = record.patient.patient_id.as_str();
        if let Err(e) = store.execute(&patient_statement(record, cohort)).await {
            tracing::warn!(cohort, patient_id, error = %e, "patient statement failed");
            report.failed_statements += 1;
            continue;
        }
        report.patients += 1;

        for phenotype in &record.phenotypes {
            match store.execute(&link_statement(patient_id, phenotype)).await {
                Ok(rows) => {
                    let linked = rows
                        .first()
                        .and_then(|r| r.get(0).ok())
                        .and_then(StoreValue::as_count)
                        .unwrap_or(0);
                    if linked > 0 {
                        report.links += 1;
                    } else {
                        tracing::debug!(patient_id, ?phenotype, "no phenotype class to link");
                        report.unmatched_phenotypes += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(patient_id, ?phenotype, error = %e, "link statement failed");
                    report.failed_statements += 1;
                }
            }
        }
    }

    tracing::info!(
        cohort,
        patients = report.patients,
        links = report.links,
        unmatched = report.unmatched_phenotypes,
        failed = report.failed_statements,
        "load finished"
    );
    report
}

/// Read an export file, map it with the format's adapter and load it.
pub async fn load_file<S>(
    store: &S,
    path: &Path,
    format: SourceFormat,
    cohort: Option<&str>,
) -> anyhow::Result<LoadReport>
where
    S: GraphStoreClient + ?Sized,
{
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let document: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let records = adapter_for(format)
        .to_records(&document)
        .with_context(|| format!("failed to map {} as {format}", path.display()))?;

    let cohort = cohort.unwrap_or(format.default_cohort());
    tracing::info!(path = %path.display(), %format, cohort, records = records.len(), "loading export");
    Ok(load_records(store, cohort, &records).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use phenograph_core::Patient;
    use serde_json::json;

    fn record() -> PatientRecord {
        let mut patient = Patient::new("P1'}) DETACH DELETE (n", "");
        patient.sex = Some("F".into());
        patient.extra.insert("variantTypes".into(), json!(["SNV"]));
        patient.extra.insert("familyHistory".into(), json!({"notes": "x"}));
        PatientRecord {
            patient,
            phenotypes: vec![PhenotypeRef::Label("Seizures".into())],
        }
    }

    #[test]
    fn patient_values_are_bound_not_interpolated() {
        let q = patient_statement(&record(), "Acute Care");
        assert!(!q.text.contains("DETACH"));
        assert!(!q.text.contains("Acute Care"));
        assert_eq!(q.param_str("patientId"), Some("P1'}) DETACH DELETE (n"));

        let attrs = q.params["attributes"].as_map().unwrap();
        assert_eq!(attrs["sex"], StoreValue::from("F"));
        assert_eq!(attrs["variantTypes"], StoreValue::List(vec!["SNV".into()]));
        assert_eq!(attrs["familyHistory"], StoreValue::from(r#"{"notes":"x"}"#));
        assert!(!attrs.contains_key("patientId"));
    }

    #[test]
    fn link_matches_by_name_or_label() {
        let by_id = link_statement("P1", &PhenotypeRef::Id("HP_0001250".into()));
        assert!(by_id.text.contains("(c:Class {name: $phenotype})"));
        let by_label = link_statement("P1", &PhenotypeRef::Label("Seizures".into()));
        assert!(by_label.text.contains("(c:Class {label: $phenotype})"));
        assert_eq!(by_label.param_str("phenotype"), Some("Seizures"));
        assert_eq!(by_label.columns, vec![COL_LINKED]);
    }
}
