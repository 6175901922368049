use std::fmt::{self, Debug};

use async_trait::async_trait;
use bson::Document;
use compass_query::{Filter, Pipeline, Query, Update};
use serde::{Deserialize, Serialize};

use crate::aggregate;
use crate::error::StoreError;
use crate::result::{DeleteResult, UpdateResult};

/// Which kind of store is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Native document server; queries pass straight through.
    Native,
    /// Relational database emulating documents in a JSON column.
    Relational,
    /// Process-local store; data is lost on shutdown.
    Memory,
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendMode::Native => "native",
            BackendMode::Relational => "relational",
            BackendMode::Memory => "memory",
        };
        f.write_str(s)
    }
}

/// Physical layout requested for a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub name: String,
    /// Field paths that get a structural index where the backend supports one.
    pub indexes: Vec<String>,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    pub fn with_index(mut self, field: impl Into<String>) -> Self {
        self.indexes.push(field.into());
        self
    }
}

/// Collection names double as table names, so they are restricted to
/// plain identifiers.
pub fn validate_collection_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid && name.len() <= 64 {
        Ok(())
    } else {
        Err(StoreError::InvalidCollection(name.to_string()))
    }
}

/// One storage strategy behind the document API.
///
/// Documents handed to [`insert`](DocumentBackend::insert) already carry a
/// canonical string `_id`, and filters have had their identity conditions
/// canonicalized.
#[async_trait]
pub trait DocumentBackend: Send + Sync + Debug {
    fn mode(&self) -> BackendMode;

    /// Idempotently create the storage for a collection.
    async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), StoreError>;

    /// Insert documents, replacing any stored document with the same identity.
    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError>;

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Update the first document matching `filter`.
    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError>;

    /// Delete the first match, or every match when `many` is set.
    async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        many: bool,
    ) -> Result<DeleteResult, StoreError>;

    /// Run a match-then-group pipeline.
    ///
    /// The default materializes every matching document and groups in
    /// process.
    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let docs = self
            .find(collection, &Query::new(pipeline.filter.clone()))
            .await?;
        Ok(aggregate::group(&docs, &pipeline.group))
    }

    async fn ping(&self) -> bool;

    /// Release the underlying connection. Later calls fail with
    /// [`StoreError::Unavailable`] where the backend holds one.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_identifiers() {
        assert!(validate_collection_name("users").is_ok());
        assert!(validate_collection_name("_tasks_2").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("2fast").is_err());
        assert!(validate_collection_name("users; DROP TABLE x").is_err());
        assert!(validate_collection_name("a.b").is_err());
    }

    #[test]
    fn mode_display_matches_serde() {
        assert_eq!(BackendMode::Relational.to_string(), "relational");
        assert_eq!(
            serde_json::to_string(&BackendMode::Memory).unwrap(),
            "\"memory\""
        );
    }
}
