//! # Phenograph Core
//!
//! Cohort-aware queries over a patient/phenotype graph:
//! - **request**: validated search parameters (hop bound, cutoff, filters)
//! - **query**: Cypher construction for bounded-depth traversals
//! - **permission**: per-cohort access decisions from caller claims
//! - **aggregate**: per-cohort execution and cross-cohort merging
//! - **projection**: traversal paths to a de-duplicated node/edge graph
//! - **service**: the logical operations callers use
//!
//! The graph store is reached only through [`GraphStoreClient`].

pub mod aggregate;
pub mod error;
pub mod model;
pub mod permission;
pub mod projection;
pub mod query;
pub mod request;
pub mod service;
pub mod store;

pub use aggregate::{AggregationEngine, AggregationOptions, CohortPlan, ResultItem};
pub use error::{QueryError, Result, StoreError};
pub use model::{
    AggregatedResponse, CohortResult, Graph, GraphEdge, GraphNode, Patient, PhenotypeClass,
    PhenotypeMatch,
};
pub use permission::{Authorization, ClaimSet, CohortAccess, CohortPermissions, PermissionFilter};
pub use projection::{project, GraphProjector, TraversalPath};
pub use request::{Cutoff, HopBound, PatientSearch, PhenotypeSearch};
pub use service::{CohortQueryService, ServiceOptions, DEFAULT_MAX_HOPS};
pub use store::{CypherQuery, GraphStoreClient, RelationshipId, StoreRecord, StoreValue};
