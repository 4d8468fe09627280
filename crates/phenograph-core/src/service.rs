//! The logical operations exposed to callers.
//!
//! Every operation re-enumerates cohorts from the store (no caching), decides
//! access per cohort, then either aggregates per-cohort queries or runs one
//! graph query restricted to the visible cohorts.

use crate::aggregate::{AggregationEngine, AggregationOptions, CohortPlan};
use crate::error::{QueryError, Result};
use crate::model::{AggregatedResponse, Graph, Patient, PhenotypeMatch};
use crate::permission::{ClaimSet, CohortAccess, CohortPermissions, PermissionFilter};
use crate::projection::{GraphProjector, TraversalPath};
use crate::query::{self, CohortQueries};
use crate::request::{HopBound, PatientSearch, PhenotypeSearch};
use crate::store::{CypherQuery, GraphStoreClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceOptions {
    pub max_concurrent_cohorts: usize,
    /// Largest hop bound a traversal may request.
    pub max_hops: u32,
}

/// Default ceiling for `ServiceOptions::max_hops`.
pub const DEFAULT_MAX_HOPS: u32 = 10;

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_concurrent_cohorts: 1,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }
}

pub struct CohortQueryService<S> {
    store: S,
    filter: PermissionFilter,
    options: ServiceOptions,
}

impl<S: GraphStoreClient> CohortQueryService<S> {
    pub fn new(store: S, permissions: CohortPermissions) -> Self {
        Self {
            store,
            filter: PermissionFilter::new(permissions),
            options: ServiceOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn permissions(&self) -> &PermissionFilter {
        &self.filter
    }

    // ------------------------------------------------------------------------
    // Cohorts
    // ------------------------------------------------------------------------

    /// Cohort names in store order. Failure here fails the whole operation.
    async fn enumerate_cohorts(&self) -> Result<Vec<String>> {
        let records = self.store.execute(&query::cohorts()).await.map_err(|e| {
            tracing::warn!(error = %e, "cohort enumeration failed");
            QueryError::from(e)
        })?;

        let mut cohorts = Vec::with_capacity(records.len());
        for record in &records {
            match record.get(0)?.as_str() {
                Some(name) => cohorts.push(name.to_string()),
                None => tracing::warn!("skipping cohort node without a name"),
            }
        }
        Ok(cohorts)
    }

    /// Cohorts the caller may see. Public cohorts are always listed.
    pub async fn list_authorized_cohorts(&self, claims: &ClaimSet) -> Result<Vec<String>> {
        let mut visible: Vec<String> = self
            .enumerate_cohorts()
            .await?
            .into_iter()
            .filter(|c| self.filter.may_view(c, claims))
            .collect();
        for public in &self.filter.permissions().public_cohorts {
            if !visible.contains(public) {
                visible.push(public.clone());
            }
        }
        Ok(visible)
    }

    fn plans(
        &self,
        cohorts: Vec<String>,
        claims: &ClaimSet,
        cohort_filter: Option<&str>,
        build: impl Fn(&str) -> CohortQueries,
    ) -> Vec<CohortPlan> {
        cohorts
            .into_iter()
            .filter_map(|cohort| {
                let access = self.filter.access(&cohort, claims, cohort_filter);
                if access == CohortAccess::FilteredOut {
                    return None;
                }
                Some(CohortPlan {
                    queries: build(&cohort),
                    cohort,
                    access,
                })
            })
            .collect()
    }

    fn engine(&self, report_denied: bool) -> AggregationEngine<'_, S> {
        AggregationEngine::new(
            &self.store,
            AggregationOptions {
                max_concurrent_cohorts: self.options.max_concurrent_cohorts,
                report_denied,
            },
        )
    }

    fn check_hops(&self, hops: HopBound) -> Result<()> {
        hops.at_most(self.options.max_hops).map(|_| ())
    }

    // ------------------------------------------------------------------------
    // Aggregated searches
    // ------------------------------------------------------------------------

    pub async fn find_similar_patients(
        &self,
        search: &PatientSearch,
        claims: &ClaimSet,
    ) -> Result<AggregatedResponse<Patient>> {
        self.check_hops(search.hops)?;
        let cohorts = self.enumerate_cohorts().await?;
        let plans = self.plans(cohorts, claims, search.cohort_filter.as_deref(), |cohort| {
            query::similar_patients(search, cohort)
        });
        tracing::debug!(
            patient_id = %search.patient_id,
            hops = %search.hops,
            cohorts = plans.len(),
            "finding similar patients"
        );
        Ok(self.engine(true).aggregate(plans).await)
    }

    pub async fn find_patients_with_phenotype(
        &self,
        search: &PhenotypeSearch,
        claims: &ClaimSet,
    ) -> Result<AggregatedResponse<PhenotypeMatch>> {
        self.check_hops(search.hops)?;
        let cohorts = self.enumerate_cohorts().await?;
        let plans = self.plans(cohorts, claims, search.cohort_filter.as_deref(), |cohort| {
            query::patients_with_phenotype(search, cohort)
        });
        tracing::debug!(
            label = %search.label,
            hops = %search.hops,
            cutoff = search.cutoff.get(),
            cohorts = plans.len(),
            "finding patients with phenotype"
        );
        Ok(self.engine(true).aggregate(plans).await)
    }

    /// An empty or blank `cohort_filter` means no filter.
    pub async fn list_patients(
        &self,
        cohort_filter: Option<&str>,
        claims: &ClaimSet,
    ) -> Result<AggregatedResponse<Patient>> {
        let cohort_filter = cohort_filter.map(str::trim).filter(|c| !c.is_empty());
        let cohorts = self.enumerate_cohorts().await?;
        let plans = self.plans(cohorts, claims, cohort_filter, query::cohort_patients);
        Ok(self.engine(false).aggregate(plans).await)
    }

    pub async fn get_patient(&self, patient_id: &str, claims: &ClaimSet) -> Result<Patient> {
        let records = self.store.execute(&query::patient_by_id(patient_id)).await?;
        let record = records
            .first()
            .ok_or_else(|| QueryError::NotFound(patient_id.to_string()))?;
        let patient: Patient = record.get(0)?.decode()?;
        if !self.filter.may_view(&patient.cohort, claims) {
            return Err(QueryError::Unauthorized(patient_id.to_string()));
        }
        Ok(patient)
    }

    // ------------------------------------------------------------------------
    // Graph projections
    // ------------------------------------------------------------------------

    fn visible_cohorts(
        &self,
        cohorts: Vec<String>,
        claims: &ClaimSet,
        cohort_filter: Option<&str>,
    ) -> Vec<String> {
        cohorts
            .into_iter()
            .filter(|c| self.filter.access(c, claims, cohort_filter) == CohortAccess::Granted)
            .collect()
    }

    pub async fn project_similarity_graph(
        &self,
        search: &PatientSearch,
        claims: &ClaimSet,
    ) -> Result<Graph> {
        self.check_hops(search.hops)?;
        let cohorts = self.visible_cohorts(
            self.enumerate_cohorts().await?,
            claims,
            search.cohort_filter.as_deref(),
        );
        if cohorts.is_empty() {
            return Ok(Graph::default());
        }
        self.project(&query::similarity_graph(search, &cohorts), &search.patient_id)
            .await
    }

    /// The cohort filter does not apply to phenotype graphs; every visible
    /// cohort contributes.
    pub async fn project_phenotype_graph(
        &self,
        search: &PhenotypeSearch,
        claims: &ClaimSet,
    ) -> Result<Graph> {
        self.check_hops(search.hops)?;
        let cohorts = self.visible_cohorts(self.enumerate_cohorts().await?, claims, None);
        if cohorts.is_empty() {
            return Ok(Graph::default());
        }
        self.project(&query::phenotype_graph(search, &cohorts), &search.label)
            .await
    }

    async fn project(&self, query: &CypherQuery, start_id: &str) -> Result<Graph> {
        tracing::trace!(query = %query.text, "executing graph query");
        let records = self.store.execute(query).await.map_err(|e| {
            tracing::warn!(error = %e, "graph query failed");
            QueryError::from(e)
        })?;

        let mut projector = GraphProjector::new();
        for record in &records {
            match record.get(0).and_then(TraversalPath::from_value) {
                Ok(path) => projector.add_path(&path, start_id),
                Err(e) => tracing::warn!(error = %e, "skipping undecodable path"),
            }
        }
        let graph = projector.finish();
        tracing::debug!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "projected graph"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::{StoreRecord, StoreValue};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Routes by a substring of the query text.
    struct RouteStore {
        routes: Vec<(&'static str, Result<Vec<StoreRecord>, StoreError>)>,
        seen: Mutex<Vec<CypherQuery>>,
    }

    impl RouteStore {
        fn new(cohorts: &[&str]) -> Self {
            let rows = cohorts
                .iter()
                .map(|c| StoreRecord::single(StoreValue::from(*c)))
                .collect();
            Self {
                routes: vec![("MATCH (c:Cohort)", Ok(rows))],
                seen: Mutex::new(Vec::new()),
            }
        }

        fn route(mut self, needle: &'static str, result: Result<Vec<StoreRecord>, StoreError>) -> Self {
            self.routes.push((needle, result));
            self
        }
    }

    #[async_trait]
    impl GraphStoreClient for RouteStore {
        async fn execute(&self, query: &CypherQuery) -> std::result::Result<Vec<StoreRecord>, StoreError> {
            self.seen.lock().push(query.clone());
            self.routes
                .iter()
                .find(|(needle, _)| query.text.contains(needle))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn permissions() -> CohortPermissions {
        CohortPermissions::default().with_claim("Acute Care", "acutecare")
    }

    fn row(value: serde_json::Value) -> StoreRecord {
        StoreRecord::single(StoreValue::from(value))
    }

    #[tokio::test]
    async fn enumeration_failure_fails_the_operation() {
        let mut store = RouteStore::new(&[]);
        store.routes[0].1 = Err(StoreError::Connection("refused".into()));
        let service = CohortQueryService::new(store, permissions());

        let err = service
            .list_authorized_cohorts(&ClaimSet::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::StoreUnavailable(_)));
        assert_eq!(err.to_string(), "graph store unavailable");
    }

    #[tokio::test]
    async fn authorized_cohorts_always_include_demo() {
        let service = CohortQueryService::new(RouteStore::new(&["Acute Care"]), permissions());
        let cohorts = service.list_authorized_cohorts(&ClaimSet::empty()).await.unwrap();
        assert_eq!(cohorts, vec!["Demo"]);

        let claims: ClaimSet = ["acutecare/pheno"].into_iter().collect();
        let cohorts = service.list_authorized_cohorts(&claims).await.unwrap();
        assert_eq!(cohorts, vec!["Acute Care", "Demo"]);
    }

    #[tokio::test]
    async fn get_patient_distinguishes_missing_and_forbidden() {
        let store = RouteStore::new(&["Demo", "Acute Care"]).route(
            "patientId: $patientId}) OPTIONAL",
            Ok(vec![row(json!({"patientId": "AC1", "cohort": "Acute Care", "phenotypes": []}))]),
        );
        let service = CohortQueryService::new(store, permissions());

        let err = service.get_patient("AC1", &ClaimSet::empty()).await.unwrap_err();
        assert!(matches!(err, QueryError::Unauthorized(id) if id == "AC1"));

        let claims: ClaimSet = ["acutecare/pheno"].into_iter().collect();
        assert_eq!(service.get_patient("AC1", &claims).await.unwrap().cohort, "Acute Care");

        let empty = CohortQueryService::new(RouteStore::new(&["Demo"]), permissions());
        assert!(matches!(
            empty.get_patient("nobody", &claims).await,
            Err(QueryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn similarity_graph_is_restricted_to_visible_cohorts() {
        let store = RouteStore::new(&["Demo", "Acute Care", "Secret"]).route(
            "CALL {",
            Ok(vec![row(json!([
                {"id": 1, "start": {"patientId": "P1"}, "end": {"name": "HP_1", "label": "Seizures"}},
                {"id": 2, "start": {"name": "HP_1", "label": "Seizures"}, "end": {"patientId": "P2"}}
            ]))]),
        );
        let service = CohortQueryService::new(store, permissions());
        let search = PatientSearch::new("P1", HopBound::new(2));

        let graph = service
            .project_similarity_graph(&search, &ClaimSet::empty())
            .await
            .unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);

        let seen = service.store().seen.lock();
        let graph_query = seen.iter().find(|q| q.text.contains("CALL {")).unwrap();
        assert_eq!(
            graph_query.params["cohorts"],
            StoreValue::List(vec!["Demo".into()])
        );
    }

    #[tokio::test]
    async fn graph_with_no_visible_cohort_skips_the_store() {
        let service = CohortQueryService::new(RouteStore::new(&["Demo", "Secret"]), permissions());
        let search = PatientSearch::new("P1", HopBound::new(1)).with_cohort("Secret");
        let graph = service
            .project_similarity_graph(&search, &ClaimSet::empty())
            .await
            .unwrap();
        assert_eq!(graph, Graph::default());
        assert_eq!(service.store().seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn failed_graph_query_is_store_unavailable() {
        let store = RouteStore::new(&["Demo"])
            .route("CALL {", Err(StoreError::Query("syntax error near MATCH".into())));
        let service = CohortQueryService::new(store, permissions());
        let search = PhenotypeSearch::new("Seizures", HopBound::new(1));
        let err = service
            .project_phenotype_graph(&search, &ClaimSet::empty())
            .await
            .unwrap_err();
        assert!(!err.to_string().contains("MATCH"));
    }

    #[tokio::test]
    async fn hop_bound_above_the_maximum_never_reaches_the_store() {
        let service = CohortQueryService::new(RouteStore::new(&["Demo"]), permissions())
            .with_options(ServiceOptions {
                max_hops: 3,
                ..ServiceOptions::default()
            });
        let claims = ClaimSet::empty();

        let err = service
            .find_similar_patients(&PatientSearch::new("P1", HopBound::new(4)), &claims)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidArgument { name: "fuzz", .. }));
        let far = PhenotypeSearch::new("Seizures", HopBound::new(u32::MAX));
        assert!(service.find_patients_with_phenotype(&far, &claims).await.is_err());
        assert!(service.project_phenotype_graph(&far, &claims).await.is_err());
        assert!(service.store().seen.lock().is_empty());

        let at_limit = PatientSearch::new("P1", HopBound::new(3));
        assert!(service.project_similarity_graph(&at_limit, &claims).await.is_ok());
    }

    #[tokio::test]
    async fn blank_cohort_filter_lists_every_visible_cohort() {
        let store = RouteStore::new(&["Demo"])
            .route("AS matches", Ok(vec![row(json!(1))]))
            .route("AS item", Ok(vec![row(json!({"patientId": "D1", "cohort": "Demo"}))]));
        let service = CohortQueryService::new(store, permissions());

        for filter in [None, Some(""), Some("  ")] {
            let r = service.list_patients(filter, &ClaimSet::empty()).await.unwrap();
            assert_eq!(r.per_cohort.len(), 1, "filter {filter:?}");
            assert_eq!(r.overall.len(), 1);
        }
    }
}
