use std::sync::Arc;

use bson::Document;
use compass_query::{Filter, Query};
use tracing::warn;

use crate::backend::DocumentBackend;
use crate::convert::{IntoFilter, IntoPipeline, IntoUpdate};
use crate::cursor::Cursor;
use crate::error::StoreError;
use crate::identity::{assign_id, canonicalize_filter};
use crate::mutation::refuse_identity;
use crate::result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};

/// Handle to one collection on the live backend.
///
/// Cheap to clone. Filters and updates are accepted either typed or as
/// documents in the `$`-operator dialect.
#[derive(Debug, Clone)]
pub struct Collection {
    name: String,
    backend: Arc<dyn DocumentBackend>,
}

/// Store failures degrade to the operation's empty result: no documents, a
/// zero count, nothing matched or deleted.
fn or_empty<T: Default>(
    collection: &str,
    op: &str,
    result: Result<T, StoreError>,
) -> Result<T, StoreError> {
    match result {
        Err(e) if e.is_driver() => {
            warn!(collection, op, error = %e, "store failed, returning empty result");
            Ok(T::default())
        }
        other => other,
    }
}

fn prepare_filter(filter: impl IntoFilter) -> Result<Filter, StoreError> {
    Ok(canonicalize_filter(filter.into_filter()?))
}

impl Collection {
    pub(crate) fn new(name: impl Into<String>, backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Insert a document, assigning `_id` if it has none. Inserting a
    /// document whose `_id` already exists replaces the stored one.
    pub async fn insert_one(&self, mut doc: Document) -> Result<InsertOneResult, StoreError> {
        let inserted_id = assign_id(&mut doc)?;
        self.backend.insert(&self.name, vec![doc]).await?;
        Ok(InsertOneResult { inserted_id })
    }

    pub async fn insert_many(
        &self,
        docs: impl IntoIterator<Item = Document>,
    ) -> Result<InsertManyResult, StoreError> {
        let mut batch = Vec::new();
        let mut inserted_ids = Vec::new();
        for mut doc in docs {
            inserted_ids.push(assign_id(&mut doc)?);
            batch.push(doc);
        }
        if !batch.is_empty() {
            self.backend.insert(&self.name, batch).await?;
        }
        Ok(InsertManyResult { inserted_ids })
    }

    /// A lazy query over this collection; nothing runs until the cursor is
    /// read.
    pub fn find(&self, filter: impl IntoFilter) -> Result<Cursor, StoreError> {
        Ok(Cursor::new(
            self.name.clone(),
            Arc::clone(&self.backend),
            Query::new(prepare_filter(filter)?),
        ))
    }

    pub async fn find_one(&self, filter: impl IntoFilter) -> Result<Option<Document>, StoreError> {
        self.find(filter)?.first().await
    }

    pub async fn count_documents(&self, filter: impl IntoFilter) -> Result<u64, StoreError> {
        let filter = prepare_filter(filter)?;
        let result = self.backend.count(&self.name, &filter).await;
        or_empty(&self.name, "count", result)
    }

    /// Apply an update to the first matching document. No match is not an
    /// error; both counts are zero. Updates to `_id` are rejected.
    pub async fn update_one(
        &self,
        filter: impl IntoFilter,
        update: impl IntoUpdate,
    ) -> Result<UpdateResult, StoreError> {
        let filter = prepare_filter(filter)?;
        let update = update.into_update()?;
        refuse_identity(&update)?;
        let result = self.backend.update_one(&self.name, &filter, &update).await;
        or_empty(&self.name, "update", result)
    }

    pub async fn delete_one(&self, filter: impl IntoFilter) -> Result<DeleteResult, StoreError> {
        let filter = prepare_filter(filter)?;
        let result = self.backend.delete(&self.name, &filter, false).await;
        or_empty(&self.name, "delete", result)
    }

    pub async fn delete_many(&self, filter: impl IntoFilter) -> Result<DeleteResult, StoreError> {
        let filter = prepare_filter(filter)?;
        let result = self.backend.delete(&self.name, &filter, true).await;
        or_empty(&self.name, "delete", result)
    }

    /// Group matching documents. Output records carry the group key in `_id`
    /// and one integer per accumulator.
    pub async fn aggregate(
        &self,
        pipeline: impl IntoPipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let mut pipeline = pipeline.into_pipeline()?;
        pipeline.filter = canonicalize_filter(pipeline.filter);
        let result = self.backend.aggregate(&self.name, &pipeline).await;
        or_empty(&self.name, "aggregate", result)
    }
}

pub(crate) async fn run_query(
    collection: &str,
    backend: &dyn DocumentBackend,
    query: &Query,
) -> Result<Vec<Document>, StoreError> {
    let result = backend.find(collection, query).await;
    or_empty(collection, "find", result)
}
