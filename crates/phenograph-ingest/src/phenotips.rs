//! PhenoTips report exports.
//!
//! Several fields are arrays upstream but only ever carry one meaningful
//! element (multiple ethnicities are joined with "and" inside one string), so
//! the first element is kept.

use phenograph_core::Patient;
use serde_json::Value;

use crate::adapter::{entries, scalar_text, Entry, PatientAdapter, PatientRecord, PhenotypeRef, SourceFormat};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct PhenoTipsAdapter;

impl PatientAdapter for PhenoTipsAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::PhenoTips
    }

    fn to_records(&self, document: &Value) -> Result<Vec<PatientRecord>> {
        entries(self.format(), document)?
            .iter()
            .map(to_record)
            .collect()
    }
}

fn first_text(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_array)?.first().and_then(scalar_text)
}

fn to_record(entry: &Entry<'_>) -> Result<PatientRecord> {
    let mut patient = Patient::new(entry.required_id("report_id")?, "");

    if let Some(allergies) = entry.get("allergies") {
        // An empty list still records that allergies were asked about.
        patient.allergies = Some(first_text(Some(allergies)).unwrap_or_default());
    }

    patient.global_age_of_onset = entry
        .list("global_age_of_onset")?
        .first()
        .and_then(|onset| onset.get("id"))
        .and_then(scalar_text);

    if let Some(family) = entry.get("family_history") {
        for (upstream, key) in [
            ("consanguinity", "consanguinity"),
            ("affectedRelatives", "affectedRelatives"),
        ] {
            if let Some(v) = family.get(upstream).filter(|v| !v.is_null()) {
                patient.extra.insert(key.to_string(), v.clone());
            }
        }
    }

    if let Some(ethnicity) = entry.get("ethnicity") {
        patient.maternal_ethnicity = first_text(ethnicity.get("maternal_ethnicity"));
        patient.paternal_ethnicity = first_text(ethnicity.get("paternal_ethnicity"));
    }

    patient.life_status = entry.text("lifeStatus");
    patient.sex = entry.text("sex");

    let mut phenotypes = Vec::new();
    for feature in entry.list("features")? {
        if feature.get("observed").and_then(Value::as_str) != Some("yes") {
            continue;
        }
        match feature.get("id").and_then(Value::as_str) {
            Some(id) => phenotypes.push(PhenotypeRef::Id(id.replacen(':', "_", 1))),
            None => tracing::warn!(
                patient_id = %patient.patient_id,
                "skipping observed feature without an id"
            ),
        }
    }

    Ok(PatientRecord {
        patient,
        phenotypes,
    })
}
