//! Phenograph ingestion
//!
//! Turns upstream clinical exports into patient records and loads them into
//! the graph store:
//! - **PhenoTips**: report exports, phenotypes linked by HPO id
//! - **Acute Care**: tracker exports, phenotypes linked by label
//! - **Mitochondria**: tracker exports, conditions linked by label
//!
//! Adapters are pure mappings from a JSON document to [`PatientRecord`]s.
//! The [`loader`] writes records with bound parameters only.

pub mod acute_care;
pub mod adapter;
pub mod error;
pub mod loader;
pub mod mito;
pub mod phenotips;

pub use adapter::{adapter_for, PatientAdapter, PatientRecord, PhenotypeRef, SourceFormat};
pub use error::IngestError;
pub use loader::{load_file, load_records, LoadReport};
