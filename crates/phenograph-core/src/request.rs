//! Caller-supplied request parameters, validated before any query is built.
//!
//! Every caller surface (HTTP, CLI, tests) goes through these constructors, so
//! a malformed hop bound is rejected here and never reaches query text.

use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;

/// Maximum number of hops a traversal may take (the "fuzz" factor).
///
/// This value is embedded into query text, so it only exists as a validated
/// integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HopBound(u32);

impl HopBound {
    pub const fn new(hops: u32) -> Self {
        Self(hops)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Reject bounds above `max`; the traversal is unbounded in practice
    /// well before `u32::MAX`.
    pub fn at_most(self, max: u32) -> Result<Self, QueryError> {
        if self.0 > max {
            return Err(QueryError::invalid(
                "fuzz",
                format!("hop bound {} exceeds the maximum of {max}", self.0),
            ));
        }
        Ok(self)
    }

    /// Parse a raw request parameter. Missing input is an error.
    pub fn parse(raw: Option<&str>) -> Result<Self, QueryError> {
        let raw = raw.ok_or_else(|| QueryError::invalid("fuzz", "a hop bound is required"))?;
        raw.parse()
    }
}

impl FromStr for HopBound {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QueryError::invalid(
                "fuzz",
                format!("expected a non-negative integer, got `{s}`"),
            ));
        }
        s.parse::<u32>()
            .map(Self)
            .map_err(|_| QueryError::invalid("fuzz", format!("hop bound `{s}` is out of range")))
    }
}

impl fmt::Display for HopBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimum number of cohort patients attached to a matched phenotype.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cutoff(u32);

impl Cutoff {
    pub const fn new(min_patients: u32) -> Self {
        Self(min_patients)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Absent, non-numeric or negative input means no cutoff.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|s| s.trim().parse::<u32>().ok())
            .map(Self)
            .unwrap_or_default()
    }
}

fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(name: &'static str, raw: &str) -> Result<String, QueryError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(QueryError::invalid(name, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Patients within `hops` of a given patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientSearch {
    pub patient_id: String,
    pub hops: HopBound,
    pub cohort_filter: Option<String>,
}

impl PatientSearch {
    pub fn new(patient_id: impl Into<String>, hops: HopBound) -> Self {
        Self {
            patient_id: patient_id.into(),
            hops,
            cohort_filter: None,
        }
    }

    pub fn with_cohort(mut self, cohort: impl Into<String>) -> Self {
        self.cohort_filter = Some(cohort.into());
        self
    }

    pub fn from_params(
        patient_id: &str,
        fuzz: Option<&str>,
        cohort: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            patient_id: required("patientId", patient_id)?,
            hops: HopBound::parse(fuzz)?,
            cohort_filter: non_empty(cohort),
        })
    }
}

/// Patients within `hops` (along subclass edges) of a phenotype label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhenotypeSearch {
    pub label: String,
    pub hops: HopBound,
    pub cutoff: Cutoff,
    /// A second phenotype label matched patients must also have.
    pub limitation: Option<String>,
    pub cohort_filter: Option<String>,
}

impl PhenotypeSearch {
    pub fn new(label: impl Into<String>, hops: HopBound) -> Self {
        Self {
            label: label.into(),
            hops,
            cutoff: Cutoff::default(),
            limitation: None,
            cohort_filter: None,
        }
    }

    pub fn with_cutoff(mut self, cutoff: Cutoff) -> Self {
        self.cutoff = cutoff;
        self
    }

    pub fn with_limitation(mut self, label: impl Into<String>) -> Self {
        let label: String = label.into();
        self.limitation = non_empty(Some(label.as_str()));
        self
    }

    pub fn with_cohort(mut self, cohort: impl Into<String>) -> Self {
        self.cohort_filter = Some(cohort.into());
        self
    }

    pub fn from_params(
        label: &str,
        fuzz: Option<&str>,
        cutoff: Option<&str>,
        limitation: Option<&str>,
        cohort: Option<&str>,
    ) -> Result<Self, QueryError> {
        Ok(Self {
            label: required("label", label)?,
            hops: HopBound::parse(fuzz)?,
            cutoff: Cutoff::parse(cutoff),
            limitation: non_empty(limitation),
            cohort_filter: non_empty(cohort),
        })
    }
}
