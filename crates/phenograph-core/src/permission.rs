//! Per-cohort access decisions.
//!
//! A caller presents a [`ClaimSet`] that has already been verified upstream.
//! Each cohort maps to a claim (`<prefix><suffix>`, e.g. `acutecare/pheno`);
//! public cohorts ("Demo" by default) need no claim.
//!
//! An explicit cohort filter is applied first and to every cohort, public ones
//! included: a cohort the caller did not ask for is simply not part of the
//! request, so it is never reported as denied either.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Permission claims of the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimSet(BTreeSet<String>);

impl ClaimSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, claim: &str) -> bool {
        self.0.contains(claim)
    }

    /// Split a header-style list (`a/pheno, b/pheno` or space separated).
    pub fn parse_list(raw: &str) -> Self {
        raw.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ClaimSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Cohort → claim mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortPermissions {
    /// Cohort name → claim prefix.
    pub claims: BTreeMap<String, String>,
    pub claim_suffix: String,
    /// Cohorts visible without any claim.
    pub public_cohorts: BTreeSet<String>,
}

impl Default for CohortPermissions {
    fn default() -> Self {
        Self {
            claims: BTreeMap::new(),
            claim_suffix: "/pheno".to_string(),
            public_cohorts: BTreeSet::from(["Demo".to_string()]),
        }
    }
}

impl CohortPermissions {
    pub fn with_claim(mut self, cohort: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.claims.insert(cohort.into(), prefix.into());
        self
    }

    /// The claim gating `cohort`, if it has one.
    pub fn claim_for(&self, cohort: &str) -> Option<String> {
        self.claims
            .get(cohort)
            .map(|prefix| format!("{prefix}{}", self.claim_suffix))
    }

    pub fn is_public(&self, cohort: &str) -> bool {
        self.public_cohorts.contains(cohort)
    }
}

/// How a cohort relates to the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CohortAccess {
    /// Caller may see the cohort's data.
    Granted,
    /// Caller asked for it (or for everything) but lacks the claim.
    Forbidden,
    /// Excluded by the caller's own cohort filter.
    FilteredOut,
}

impl CohortAccess {
    /// Final decision once the cohort's match count is known.
    pub fn decide(self, matches: u64) -> Authorization {
        Authorization {
            included: self == Self::Granted,
            denied: self == Self::Forbidden && matches > 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorization {
    pub included: bool,
    /// Matching data exists but may not be shown.
    pub denied: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PermissionFilter {
    permissions: CohortPermissions,
}

impl PermissionFilter {
    pub fn new(permissions: CohortPermissions) -> Self {
        Self { permissions }
    }

    pub fn permissions(&self) -> &CohortPermissions {
        &self.permissions
    }

    /// May the caller see `cohort` at all, ignoring any filter?
    pub fn may_view(&self, cohort: &str, claims: &ClaimSet) -> bool {
        self.permissions.is_public(cohort)
            || self
                .permissions
                .claim_for(cohort)
                .is_some_and(|claim| claims.contains(&claim))
    }

    pub fn access(&self, cohort: &str, claims: &ClaimSet, filter: Option<&str>) -> CohortAccess {
        if filter.is_some_and(|f| f != cohort) {
            return CohortAccess::FilteredOut;
        }
        if self.may_view(cohort, claims) {
            CohortAccess::Granted
        } else {
            CohortAccess::Forbidden
        }
    }

    /// Decision for `cohort`. `matches` is the cohort's match count when the
    /// request is an aggregation that reports denied cohorts.
    pub fn authorize(
        &self,
        cohort: &str,
        claims: &ClaimSet,
        filter: Option<&str>,
        matches: Option<u64>,
    ) -> Authorization {
        self.access(cohort, claims, filter)
            .decide(matches.unwrap_or(0))
    }
}
