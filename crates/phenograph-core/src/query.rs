//! Cypher construction for bounded-depth traversals.
//!
//! Every builder is a pure function from a validated request to a
//! [`CypherQuery`]. User input is always bound as a parameter; the only value
//! spliced into the text is the hop bound, which the variable-length pattern
//! syntax does not allow to be parameterized and which only exists as a
//! validated [`HopBound`].
//!
//! Graph model assumed by the queries:
//! - `(:Cohort {cohort})`
//! - `(:Patient {patientId, cohort, ...})-[:HAS_PHENOTYPE]->(:Class {name, label})`
//! - `(:Class)-[:SCO]->(:Class)` subclass-of edges

use crate::request::{HopBound, PatientSearch, PhenotypeSearch};
use crate::store::CypherQuery;

/// Column alias for data rows.
pub const COL_ITEM: &str = "item";
/// Column alias for `count(...)` rows.
pub const COL_MATCHES: &str = "matches";
/// Column alias for projected path segments.
pub const COL_SEGMENTS: &str = "segments";
pub const COL_COHORT: &str = "cohort";

/// A per-cohort data query and its parallel count query.
#[derive(Debug, Clone, PartialEq)]
pub struct CohortQueries {
    pub data: CypherQuery,
    pub count: CypherQuery,
}

// `[*0..N]` with `N` rendered from the validated bound.
fn hops_clause(rel: &str, hops: HopBound) -> String {
    format!("[{rel}*0..{}]", hops.get())
}

// ============================================================================
// Cohorts and single patients
// ============================================================================

pub fn cohorts() -> CypherQuery {
    CypherQuery::new("MATCH (c:Cohort) RETURN c.cohort AS cohort").returns(COL_COHORT)
}

pub fn patient_by_id(patient_id: &str) -> CypherQuery {
    CypherQuery::new(
        "MATCH (patient:Patient {patientId: $patientId}) \
         OPTIONAL MATCH (patient)-[:HAS_PHENOTYPE]-(phenotype:Class) \
         RETURN patient{.*, phenotypes: collect(properties(phenotype))} AS item",
    )
    .param("patientId", patient_id)
    .returns(COL_ITEM)
}

/// Every patient of one cohort, with phenotypes.
pub fn cohort_patients(cohort: &str) -> CohortQueries {
    let base = "MATCH (p:Patient {cohort: $cohort})-[:HAS_PHENOTYPE]->(ph:Class)";
    CohortQueries {
        data: CypherQuery::new(format!(
            "{base} RETURN p{{.*, phenotypes: collect(properties(ph))}} AS item"
        ))
        .param("cohort", cohort)
        .returns(COL_ITEM),
        count: CypherQuery::new(format!("{base} RETURN count(DISTINCT p) AS matches"))
            .param("cohort", cohort)
            .returns(COL_MATCHES),
    }
}

// ============================================================================
// Per-cohort traversals
// ============================================================================

/// Patients of `cohort` within `hops` of the search's patient.
pub fn similar_patients(search: &PatientSearch, cohort: &str) -> CohortQueries {
    let base = format!(
        "MATCH (a:Patient {{patientId: $patientId}})-{}-(b:Patient {{cohort: $cohort}})\
         -[:HAS_PHENOTYPE]-(c:Class) WITH DISTINCT b, c",
        hops_clause("", search.hops)
    );
    let bind = |q: CypherQuery| {
        q.param("patientId", search.patient_id.as_str())
            .param("cohort", cohort)
    };
    CohortQueries {
        data: bind(CypherQuery::new(format!(
            "{base} RETURN b{{.*, phenotypes: collect(properties(c))}} AS item"
        )))
        .returns(COL_ITEM),
        count: bind(CypherQuery::new(format!(
            "{base} RETURN count(DISTINCT b) AS matches"
        )))
        .returns(COL_MATCHES),
    }
}

/// Phenotype classes within `hops` subclass steps of the search label that
/// have patients in `cohort`, each with those patients.
pub fn patients_with_phenotype(search: &PhenotypeSearch, cohort: &str) -> CohortQueries {
    let limitation = if search.limitation.is_some() {
        "-[:HAS_PHENOTYPE]-(:Class {label: $limitation})"
    } else {
        ""
    };
    let base = format!(
        "MATCH (:Class {{label: $label}})-{}-(relphen:Class)-[:HAS_PHENOTYPE]-\
         (p:Patient {{cohort: $cohort}}){limitation} \
         WHERE size([(relphen)-[:HAS_PHENOTYPE]-(q:Patient {{cohort: $cohort}}) | q]) >= $cutoff",
        hops_clause(":SCO", search.hops)
    );
    let bind = |q: CypherQuery| {
        let q = q
            .param("label", search.label.as_str())
            .param("cohort", cohort)
            .param("cutoff", i64::from(search.cutoff.get()));
        match &search.limitation {
            Some(lim) => q.param("limitation", lim.as_str()),
            None => q,
        }
    };
    CohortQueries {
        data: bind(CypherQuery::new(format!(
            "{base} RETURN relphen{{.label, .name, patients: collect(DISTINCT properties(p))}} AS item"
        )))
        .returns(COL_ITEM),
        count: bind(CypherQuery::new(format!(
            "{base} RETURN count(DISTINCT p) AS matches"
        )))
        .returns(COL_MATCHES),
    }
}

// ============================================================================
// Graph projections
// ============================================================================

// Segments in traversal order: `start`/`end` follow the path, not the
// stored relationship direction.
const SEGMENTS_RETURN: &str = "RETURN [i IN range(0, length(path) - 1) | {\
     id: id(relationships(path)[i]), \
     start: properties(nodes(path)[i]), \
     end: properties(nodes(path)[i + 1])}] AS segments";

/// First path from the search's patient to each patient in `cohorts`.
pub fn similarity_graph(search: &PatientSearch, cohorts: &[String]) -> CypherQuery {
    CypherQuery::new(format!(
        "MATCH (m:Patient {{patientId: $patientId}}) \
         CALL {{ \
           WITH m \
           MATCH path = (m)-{}-(patient:Patient) \
           WHERE patient.cohort IN $cohorts \
           RETURN patient, collect(path)[0] AS path \
         }} \
         {SEGMENTS_RETURN}",
        hops_clause("", search.hops)
    ))
    .param("patientId", search.patient_id.as_str())
    .param("cohorts", cohorts.to_vec())
    .returns(COL_SEGMENTS)
}

/// First path from the search label to each patient in `cohorts` reachable
/// through a related phenotype class.
pub fn phenotype_graph(search: &PhenotypeSearch, cohorts: &[String]) -> CypherQuery {
    let limitation = if search.limitation.is_some() {
        " AND (patient)-[:HAS_PHENOTYPE]-(:Class {label: $limitation})"
    } else {
        ""
    };
    let query = CypherQuery::new(format!(
        "MATCH (m:Class {{label: $label}}) \
         CALL {{ \
           WITH m \
           MATCH path = (m)-{}-(relphen:Class)-[:HAS_PHENOTYPE]-(patient:Patient) \
           WHERE patient.cohort IN $cohorts \
             AND size([(relphen)-[:HAS_PHENOTYPE]-(q:Patient {{cohort: patient.cohort}}) | q]) >= $cutoff\
             {limitation} \
           RETURN patient, collect(path)[0] AS path \
         }} \
         {SEGMENTS_RETURN}",
        hops_clause(":SCO", search.hops)
    ))
    .param("label", search.label.as_str())
    .param("cohorts", cohorts.to_vec())
    .param("cutoff", i64::from(search.cutoff.get()))
    .returns(COL_SEGMENTS);

    match &search.limitation {
        Some(lim) => query.param("limitation", lim.as_str()),
        None => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Cutoff;
    use crate::store::StoreValue;
    use proptest::prelude::*;

    fn phenotype_search() -> PhenotypeSearch {
        PhenotypeSearch::new("Seizures", HopBound::new(2))
    }

    #[test]
    fn similar_patients_binds_ids_and_embeds_hops() {
        let search = PatientSearch::new("P1'; DROP", HopBound::new(3));
        let q = similar_patients(&search, "Demo");

        assert!(q.data.text.contains("-[*0..3]-"));
        assert!(!q.data.text.contains("DROP"));
        assert_eq!(q.data.param_str("patientId"), Some("P1'; DROP"));
        assert_eq!(q.data.param_str("cohort"), Some("Demo"));
        assert_eq!(q.data.columns, vec![COL_ITEM]);
        assert_eq!(q.count.columns, vec![COL_MATCHES]);
        assert!(q.count.text.ends_with("RETURN count(DISTINCT b) AS matches"));
    }

    #[test]
    fn limitation_clause_only_when_present() {
        let without = patients_with_phenotype(&phenotype_search(), "Demo");
        assert!(!without.data.text.contains("$limitation"));
        assert!(!without.data.params.contains_key("limitation"));

        let with = patients_with_phenotype(
            &phenotype_search().with_limitation("Ataxia"),
            "Demo",
        );
        assert!(with.data.text.contains("(:Class {label: $limitation})"));
        assert!(with.count.text.contains("(:Class {label: $limitation})"));
        assert_eq!(with.data.param_str("limitation"), Some("Ataxia"));
    }

    #[test]
    fn cutoff_is_bound_not_embedded() {
        let q = patients_with_phenotype(&phenotype_search().with_cutoff(Cutoff::new(5)), "Demo");
        assert!(q.data.text.contains(">= $cutoff"));
        assert_eq!(q.data.params["cutoff"], StoreValue::Int(5));
        assert!(q.data.text.contains("-[:SCO*0..2]-"));
    }

    #[test]
    fn graph_queries_restrict_to_authorized_cohorts() {
        let cohorts = vec!["Demo".to_string(), "Acute Care".to_string()];
        let q = similarity_graph(&PatientSearch::new("P1", HopBound::new(1)), &cohorts);
        assert!(q.text.contains("patient.cohort IN $cohorts"));
        assert!(q.text.contains("collect(path)[0] AS path"));
        assert_eq!(
            q.params["cohorts"],
            StoreValue::List(vec!["Demo".into(), "Acute Care".into()])
        );
        assert_eq!(q.columns, vec![COL_SEGMENTS]);

        let q = phenotype_graph(&phenotype_search().with_limitation("Ataxia"), &cohorts);
        assert!(q.text.contains("-[:SCO*0..2]-"));
        assert!(q.text.contains("$limitation"));
        assert!(q.text.contains(">= $cutoff"));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            failure_persistence: None,
            ..ProptestConfig::default()
        })]

        #[test]
        fn every_builder_embeds_exactly_the_validated_bound(n in 0u32..=10_000, label in "[A-Za-z ]{1,12}") {
            let hops = HopBound::parse(Some(&n.to_string())).unwrap();
            let ps = PatientSearch::new(label.clone(), hops);
            let ph = PhenotypeSearch::new(label, hops);
            let expected = format!("*0..{n}]");

            let texts = [
                similar_patients(&ps, "Demo").data.text,
                similar_patients(&ps, "Demo").count.text,
                patients_with_phenotype(&ph, "Demo").data.text,
                patients_with_phenotype(&ph, "Demo").count.text,
                similarity_graph(&ps, &[]).text,
                phenotype_graph(&ph, &[]).text,
            ];
            for text in texts {
                prop_assert!(text.contains(&expected));
                prop_assert_eq!(text.matches("*0..").count(), 1);
            }
        }
    }
}
