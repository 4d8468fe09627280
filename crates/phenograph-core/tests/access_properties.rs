//! Property tests for cohort access decisions and graph projection.

use phenograph_core::{
    project, ClaimSet, CohortAccess, CohortPermissions, PermissionFilter, StoreValue,
    TraversalPath,
};
use proptest::prelude::*;
use serde_json::json;

const COHORTS: [&str; 4] = ["Demo", "Acute Care", "Mito", "Secret"];

fn filter() -> PermissionFilter {
    PermissionFilter::new(
        CohortPermissions::default()
            .with_claim("Acute Care", "acutecare")
            .with_claim("Mito", "mito")
            .with_claim("Secret", "secret"),
    )
}

fn claims_from(mask: u8) -> ClaimSet {
    ["acutecare/pheno", "mito/pheno", "secret/pheno", "other/pheno"]
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, c)| *c)
        .collect()
}

fn segment(id: i64, from: &str, to: &str) -> serde_json::Value {
    let endpoint = |n: &str| {
        if n.starts_with('P') {
            json!({"patientId": n})
        } else {
            json!({"name": n, "label": n})
        }
    };
    json!({"id": id, "start": endpoint(from), "end": endpoint(to)})
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn public_cohort_is_granted_for_any_claims(mask in any::<u8>()) {
        let claims = claims_from(mask);
        prop_assert_eq!(filter().access("Demo", &claims, None), CohortAccess::Granted);
    }

    #[test]
    fn filter_excludes_every_other_cohort(mask in any::<u8>(), pick in 0usize..4) {
        let claims = claims_from(mask);
        let wanted = COHORTS[pick];
        for cohort in COHORTS {
            let access = filter().access(cohort, &claims, Some(wanted));
            if cohort == wanted {
                prop_assert_ne!(access, CohortAccess::FilteredOut);
            } else {
                prop_assert_eq!(access, CohortAccess::FilteredOut);
            }
        }
    }

    #[test]
    fn denied_needs_matches_and_a_missing_claim(mask in any::<u8>(), matches in 0u64..5) {
        let claims = claims_from(mask);
        let f = filter();
        for cohort in COHORTS {
            let auth = f.authorize(cohort, &claims, None, Some(matches));
            prop_assert!(!(auth.included && auth.denied));
            prop_assert_eq!(auth.included, f.may_view(cohort, &claims));
            prop_assert_eq!(auth.denied, !f.may_view(cohort, &claims) && matches > 0);
        }
    }

    #[test]
    fn projected_edges_reference_projected_nodes(
        routes in prop::collection::vec(
            prop::collection::vec((0i64..20, 0usize..6, 0usize..6), 1..5),
            0..6,
        )
    ) {
        let names = ["P1", "P2", "P3", "HP_1", "HP_2", "HP_3"];
        let paths: Vec<TraversalPath> = routes
            .iter()
            .map(|route| {
                let segments: Vec<_> = route
                    .iter()
                    .map(|(id, a, b)| segment(*id, names[*a], names[*b]))
                    .collect();
                TraversalPath::from_value(&StoreValue::from(json!(segments))).unwrap()
            })
            .collect();

        let graph = project(&paths, "P1");

        let mut node_ids: Vec<_> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
        node_ids.sort_unstable();
        node_ids.dedup();
        prop_assert_eq!(node_ids.len(), graph.nodes.len());

        let mut edge_ids: Vec<_> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        edge_ids.sort_unstable();
        edge_ids.dedup();
        prop_assert_eq!(edge_ids.len(), graph.edges.len());

        for edge in &graph.edges {
            prop_assert!(graph.node(&edge.from).is_some());
            prop_assert!(graph.node(&edge.to).is_some());
        }
    }
}
