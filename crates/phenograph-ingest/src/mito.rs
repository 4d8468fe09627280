//! Mitochondrial disease tracker exports.

use phenograph_core::Patient;
use serde_json::Value;

use crate::adapter::{entries, scalar_text, Entry, PatientAdapter, PatientRecord, PhenotypeRef, SourceFormat};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct MitoAdapter;

impl PatientAdapter for MitoAdapter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Mito
    }

    fn to_records(&self, document: &Value) -> Result<Vec<PatientRecord>> {
        entries(self.format(), document)?
            .iter()
            .map(to_record)
            .collect()
    }
}

fn to_record(entry: &Entry<'_>) -> Result<PatientRecord> {
    let mut patient = Patient::new(entry.required_id("externalIDs")?, "");
    patient.gender = entry.text("Gender");

    let phenotypes = entry
        .list("Condition")?
        .iter()
        .map(|c| {
            scalar_text(c)
                .map(PhenotypeRef::Label)
                .ok_or_else(|| entry.wrong_type("Condition", "a list of strings"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(PatientRecord {
        patient,
        phenotypes,
    })
}
