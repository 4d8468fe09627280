use thiserror::Error;

/// A malformed upstream document.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{format} export must be a JSON array of patient entries")]
    NotAList { format: &'static str },

    #[error("{format} entry {index} is not an object")]
    NotAnObject { format: &'static str, index: usize },

    #[error("{format} entry {index} has no `{field}`")]
    MissingField {
        format: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("{format} entry {index}: `{field}` must be {expected}")]
    WrongType {
        format: &'static str,
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown source format `{0}` (expected phenotips, acute-care or mito)")]
    UnknownFormat(String),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
