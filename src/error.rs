use thiserror::Error;

/// Identifier derivation failures. Callers skip the record and move on.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("empty natural key")]
    Empty,

    #[error("upstream id {0:?} is not numeric")]
    NotNumeric(String),

    #[error("id {0} is outside the namespace range")]
    OutOfRange(u64),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("{table}: missing referenced {column} {key}")]
    ForeignKey {
        table: &'static str,
        column: &'static str,
        key: i64,
    },

    #[error("{table}: row {key} not found")]
    NotFound { table: &'static str, key: String },

    #[error("in-memory store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("JSON decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("bad selector {0:?}")]
    Selector(String),

    #[error("unexpected payload: {0}")]
    Shape(String),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
