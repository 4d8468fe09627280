//! Acute Care tracker exports.

use phenograph_core::Patient;
use serde_json::Value;

use crate::adapter::{entries, Entry, PatientAdapter, PatientRecord, PhenotypeRef, SourceFormat};
use crate::error::Result;

const FEATURES: &str = "Principal phenotypic features";

/// Upstream column → stored attribute, for columns without a named field.
const EXTRA_COLUMNS: &[(&str, &str)] = &[
    ("Is there an affected sibling?", "hasAffectedSibling"),
    ("Number of affected siblings:", "numberOfAffectedSiblings"),
    ("Is there an affected child?", "hasAffectedChild"),
    ("Number of affected children:", "numberOfAffectedChildren"),
    ("Consanguinity", "consanguinity"),
    ("Number of variants reported", "numberOfVariantsReported"),
    ("Relevant pregnancy information", "relevantPregnancyInformation"),
    ("Variant class", "variantClasses"),
    ("Variant type", "variantTypes"),
    ("Variant Zygosity", "variantZygosities"),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct AcuteCareAdapter;

impl PatientAdapter for AcuteCareAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::AcuteCare
    }

    fn to_records(&self, document: &Value) -> Result<Vec<PatientRecord>> {
        entries(self.format(), document)?
            .iter()
            .map(to_record)
            .collect()
    }
}

/// `HP:0001250|Seizures` → `Seizures`; free-text entries pass through.
fn feature_label(raw: &str) -> Option<&str> {
    if raw.starts_with("HP") {
        raw.split('|').nth(1).map(str::trim).filter(|l| !l.is_empty())
    } else {
        Some(raw.trim()).filter(|l| !l.is_empty())
    }
}

fn to_record(entry: &Entry<'_>) -> Result<PatientRecord> {
    let mut patient = Patient::new(entry.required_id("externalIDs")?, "");
    patient.sex = entry.text("sex");
    patient.ethnicity = entry.text("Participant Ethnicity");
    patient.maternal_ethnicity = entry.text("Maternal Ethnicity");
    patient.paternal_ethnicity = entry.text("Paternal Ethnicity");

    for (column, key) in EXTRA_COLUMNS {
        if let Some(v) = entry.get(column) {
            patient.extra.insert(key.to_string(), v.clone());
        }
    }

    let mut phenotypes = Vec::new();
    for feature in entry.list(FEATURES)? {
        let raw = feature
            .as_str()
            .ok_or_else(|| entry.wrong_type(FEATURES, "a list of strings"))?;
        match feature_label(raw) {
            Some(label) => phenotypes.push(PhenotypeRef::Label(label.to_string())),
            None => tracing::warn!(
                patient_id = %patient.patient_id,
                feature = raw,
                "skipping phenotype entry without a label"
            ),
        }
    }

    Ok(PatientRecord {
        patient,
        phenotypes,
    })
}
