//! Per-cohort execution and cross-cohort merging.
//!
//! A request becomes one [`CohortPlan`] per enumerated cohort. Each plan runs
//! its data and count queries; the outcomes are then folded, in plan order,
//! into an [`AggregatedResponse`]:
//!
//! - `per_cohort` gets one entry per included cohort,
//! - `overall` gets every item, merging items that share a merge key
//!   (phenotype results) by concatenating their patient lists,
//! - a forbidden cohort with matches is listed in `cohorts_denied`,
//! - a cohort whose store calls failed is listed in `cohorts_failed` and
//!   contributes nothing. Other cohorts are unaffected.
//!
//! Plans may run concurrently; the fold order is always the plan order.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::model::{AggregatedResponse, CohortResult, Patient, PhenotypeMatch};
use crate::permission::CohortAccess;
use crate::query::CohortQueries;
use crate::store::{CypherQuery, GraphStoreClient};

// ============================================================================
// Result items
// ============================================================================

/// A row type that can be aggregated across cohorts.
pub trait ResultItem: DeserializeOwned + Clone + Send + 'static {
    /// Items sharing a key are merged in `overall`; `None` never merges.
    fn merge_key(&self) -> Option<&str> {
        None
    }

    /// Fold a later same-key item into this one.
    fn absorb(&mut self, _later: Self) {}
}

// A patient belongs to exactly one cohort, so a repeat is the same record.
impl ResultItem for Patient {
    fn merge_key(&self) -> Option<&str> {
        Some(&self.patient_id)
    }
}

impl ResultItem for PhenotypeMatch {
    fn merge_key(&self) -> Option<&str> {
        Some(&self.name)
    }

    // Concatenate, not union: the same patient reached from two cohorts'
    // queries stays listed twice, mirroring the per-cohort partition.
    fn absorb(&mut self, later: Self) {
        self.patients.extend(later.patients);
    }
}

/// Insertion-ordered overall result set.
struct OverallSet<T> {
    items: Vec<T>,
    by_key: HashMap<String, usize>,
}

impl<T: ResultItem> OverallSet<T> {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            by_key: HashMap::new(),
        }
    }

    fn push(&mut self, item: T) {
        let Some(key) = item.merge_key().map(str::to_string) else {
            self.items.push(item);
            return;
        };
        match self.by_key.get(&key) {
            Some(&i) => self.items[i].absorb(item),
            None => {
                self.by_key.insert(key, self.items.len());
                self.items.push(item);
            }
        }
    }
}

// ============================================================================
// Plans
// ============================================================================

#[derive(Debug, Clone)]
pub struct CohortPlan {
    pub cohort: String,
    pub access: CohortAccess,
    pub queries: CohortQueries,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationOptions {
    /// 1 runs cohorts one after another.
    pub max_concurrent_cohorts: usize,
    /// Run the count query for forbidden cohorts and report those with matches.
    pub report_denied: bool,
}

impl Default for AggregationOptions {
    fn default() -> Self {
        Self {
            max_concurrent_cohorts: 1,
            report_denied: false,
        }
    }
}

#[derive(Debug)]
enum CohortOutcome<T> {
    Included { items: Vec<T>, matches: u64 },
    Denied,
    Skipped,
    Failed,
}

pub struct AggregationEngine<'a, S: ?Sized> {
    store: &'a S,
    options: AggregationOptions,
}

impl<'a, S: GraphStoreClient + ?Sized> AggregationEngine<'a, S> {
    pub fn new(store: &'a S, options: AggregationOptions) -> Self {
        Self { store, options }
    }

    pub async fn aggregate<T: ResultItem>(&self, plans: Vec<CohortPlan>) -> AggregatedResponse<T> {
        let outcomes: Vec<CohortOutcome<T>> = if self.options.max_concurrent_cohorts <= 1 {
            let mut out = Vec::with_capacity(plans.len());
            for plan in &plans {
                out.push(self.run_plan(plan).await);
            }
            out
        } else {
            // Built before the stream: a borrowing `map` closure inside it
            // makes the future non-`Send`. `buffered` yields in input order.
            let pending: Vec<_> = plans.iter().map(|plan| self.run_plan(plan)).collect();
            stream::iter(pending)
                .buffered(self.options.max_concurrent_cohorts)
                .collect()
                .await
        };

        let mut response = AggregatedResponse::default();
        let mut overall = OverallSet::new();
        for (plan, outcome) in plans.into_iter().zip(outcomes) {
            match outcome {
                CohortOutcome::Included { items, matches } => {
                    for item in &items {
                        overall.push(item.clone());
                    }
                    response.num_patients += matches;
                    response.per_cohort.push(CohortResult {
                        cohort: plan.cohort,
                        items,
                        num_patients: matches,
                    });
                }
                CohortOutcome::Denied => response.cohorts_denied.push(plan.cohort),
                CohortOutcome::Failed => response.cohorts_failed.push(plan.cohort),
                CohortOutcome::Skipped => {}
            }
        }
        response.overall = overall.items;
        response
    }

    async fn run_plan<T: ResultItem>(&self, plan: &CohortPlan) -> CohortOutcome<T> {
        match plan.access {
            CohortAccess::FilteredOut => CohortOutcome::Skipped,
            CohortAccess::Forbidden if !self.options.report_denied => CohortOutcome::Skipped,
            CohortAccess::Forbidden => match self.count(&plan.queries.count).await {
                Ok(matches) if plan.access.decide(matches).denied => {
                    tracing::debug!(cohort = %plan.cohort, matches, "cohort denied");
                    CohortOutcome::Denied
                }
                Ok(_) => CohortOutcome::Skipped,
                Err(e) => {
                    tracing::warn!(cohort = %plan.cohort, error = %e, "cohort count query failed");
                    CohortOutcome::Failed
                }
            },
            CohortAccess::Granted => match self.fetch::<T>(&plan.queries).await {
                Ok((items, matches)) => {
                    tracing::debug!(
                        cohort = %plan.cohort,
                        items = items.len(),
                        matches,
                        "cohort aggregated"
                    );
                    CohortOutcome::Included { items, matches }
                }
                Err(e) => {
                    tracing::warn!(cohort = %plan.cohort, error = %e, "cohort query failed");
                    CohortOutcome::Failed
                }
            },
        }
    }

    async fn fetch<T: ResultItem>(&self, queries: &CohortQueries) -> Result<(Vec<T>, u64), StoreError> {
        tracing::trace!(query = %queries.data.text, "executing cohort data query");
        let records = self.store.execute(&queries.data).await?;
        let items = records
            .iter()
            .map(|r| r.get(0)?.decode::<T>())
            .collect::<Result<Vec<_>, _>>()?;
        let matches = self.count(&queries.count).await?;
        Ok((items, matches))
    }

    async fn count(&self, query: &CypherQuery) -> Result<u64, StoreError> {
        tracing::trace!(query = %query.text, "executing cohort count query");
        let records = self.store.execute(query).await?;
        records
            .first()
            .ok_or_else(|| StoreError::decode("count query returned no rows"))?
            .get(0)?
            .as_count()
            .ok_or_else(|| StoreError::decode("count is not a non-negative integer"))
    }
}
