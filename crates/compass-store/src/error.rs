use compass_query::{FilterParseError, PipelineParseError, UpdateParseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend unavailable")]
    Unavailable,
    #[error("invalid collection name: {0}")]
    InvalidCollection(String),
    #[error("invalid field path: {0}")]
    InvalidField(String),
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error(transparent)]
    Filter(#[from] FilterParseError),
    #[error(transparent)]
    Update(#[from] UpdateParseError),
    #[error(transparent)]
    Pipeline(#[from] PipelineParseError),
    #[error("cannot apply update: {0}")]
    Mutation(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[cfg(feature = "sqlite")]
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[cfg(feature = "mongodb")]
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Errors raised by the backing store itself, as opposed to bad input.
    pub fn is_driver(&self) -> bool {
        match self {
            StoreError::Backend(_) => true,
            #[cfg(feature = "sqlite")]
            StoreError::Sqlite(_) => true,
            #[cfg(feature = "mongodb")]
            StoreError::Mongo(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Backend(format!("blocking task failed: {e}"))
    }
}
