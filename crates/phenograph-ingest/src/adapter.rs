//! The common "raw export → patient records" capability.

use std::fmt;
use std::str::FromStr;

use phenograph_core::Patient;
use serde_json::{Map, Value};

use crate::error::{IngestError, Result};

/// How a record refers to a phenotype class in the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhenotypeRef {
    /// Class `name`, e.g. `HP_0001250`.
    Id(String),
    /// Class `label`, e.g. `Seizures`.
    Label(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatientRecord {
    pub patient: Patient,
    pub phenotypes: Vec<PhenotypeRef>,
}

pub trait PatientAdapter: Send + Sync {
    fn format(&self) -> SourceFormat;

    /// Map a whole export document. Cohort membership is assigned by the
    /// loader, so records come back with an empty cohort.
    fn to_records(&self, document: &Value) -> Result<Vec<PatientRecord>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    PhenoTips,
    AcuteCare,
    Mito,
}

impl SourceFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::PhenoTips => "phenotips",
            Self::AcuteCare => "acute-care",
            Self::Mito => "mito",
        }
    }

    /// Cohort the export is loaded into unless told otherwise.
    pub fn default_cohort(self) -> &'static str {
        match self {
            Self::PhenoTips => "Demo",
            Self::AcuteCare => "Acute Care",
            Self::Mito => "Mitochondria",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceFormat {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "phenotips" => Ok(Self::PhenoTips),
            "acute-care" | "acutecare" | "ac" => Ok(Self::AcuteCare),
            "mito" | "mitochondria" => Ok(Self::Mito),
            _ => Err(IngestError::UnknownFormat(s.to_string())),
        }
    }
}

pub fn adapter_for(format: SourceFormat) -> Box<dyn PatientAdapter> {
    match format {
        SourceFormat::PhenoTips => Box::new(crate::phenotips::PhenoTipsAdapter),
        SourceFormat::AcuteCare => Box::new(crate::acute_care::AcuteCareAdapter),
        SourceFormat::Mito => Box::new(crate::mito::MitoAdapter),
    }
}

// ============================================================================
// Entry access helpers shared by the adapters
// ============================================================================

pub(crate) fn entries<'a>(format: SourceFormat, document: &'a Value) -> Result<Vec<Entry<'a>>> {
    let items = document
        .as_array()
        .ok_or(IngestError::NotAList { format: format.name() })?;
    items
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value
                .as_object()
                .map(|obj| Entry { format, index, obj })
                .ok_or(IngestError::NotAnObject {
                    format: format.name(),
                    index,
                })
        })
        .collect()
}

/// One patient entry of an export.
pub(crate) struct Entry<'a> {
    format: SourceFormat,
    index: usize,
    obj: &'a Map<String, Value>,
}

impl<'a> Entry<'a> {
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.obj.get(key).filter(|v| !v.is_null())
    }

    /// A non-empty scalar, as text.
    pub fn required_id(&self, key: &'static str) -> Result<String> {
        match self.get(key).and_then(scalar_text) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(IngestError::MissingField {
                format: self.format.name(),
                index: self.index,
                field: key,
            }),
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        self.get(key).and_then(scalar_text)
    }

    /// An array field; absent means empty.
    pub fn list(&self, key: &'static str) -> Result<&'a [Value]> {
        match self.get(key) {
            None => Ok(&[][..]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(_) => Err(self.wrong_type(key, "an array")),
        }
    }

    pub fn wrong_type(&self, field: &'static str, expected: &'static str) -> IngestError {
        IngestError::WrongType {
            format: self.format.name(),
            index: self.index,
            field,
            expected,
        }
    }
}

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
