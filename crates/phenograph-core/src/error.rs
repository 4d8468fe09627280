//! Error kinds surfaced by the query layer.
//!
//! Two levels:
//! - [`StoreError`] is what a [`crate::store::GraphStoreClient`] reports for a
//!   single call. It may carry driver detail and is only ever logged.
//! - [`QueryError`] is what callers of the service see. Its `Display` output
//!   never contains query text or store internals.

use thiserror::Error;

/// Failure of a single graph store interaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("unexpected record shape: {0}")]
    Decode(String),
    #[error("session pool: {0}")]
    SessionPool(String),
}

impl StoreError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}

/// Caller-visible error of a logical operation.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Malformed or missing request parameter; nothing was sent to the store.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    /// A store call the operation cannot do without failed.
    #[error("graph store unavailable")]
    StoreUnavailable(#[source] StoreError),

    #[error("patient `{0}` not found")]
    NotFound(String),

    #[error("not authorized to view patient `{0}`")]
    Unauthorized(String),
}

impl QueryError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

impl From<StoreError> for QueryError {
    fn from(value: StoreError) -> Self {
        Self::StoreUnavailable(value)
    }
}

pub type Result<T, E = QueryError> = std::result::Result<T, E>;
