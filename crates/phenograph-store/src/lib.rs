//! Phenograph graph store clients
//!
//! Implementations of [`phenograph_core::GraphStoreClient`]:
//!
//! - **Neo4jStore**: Bolt connection via `neo4rs`, one pooled session per call
//! - **MemoryStore**: scripted responses and a query log, for tests and demos
//!
//! Both acquire a [`Session`] from a [`SessionPool`] for every call; the
//! session is released when the guard drops, on success and on failure.

pub mod config;
pub mod memory;
pub mod neo4j;
pub mod session;

pub use config::StoreConfig;
pub use memory::{MemoryStore, QueryPattern};
pub use neo4j::Neo4jStore;
pub use session::{Session, SessionPool};
