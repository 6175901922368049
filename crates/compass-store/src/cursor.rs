use std::sync::Arc;

use bson::Document;
use compass_query::{Query, Sort, SortDirection};

use crate::backend::DocumentBackend;
use crate::collection::run_query;
use crate::error::StoreError;

/// A deferred find.
///
/// `sort`, `limit` and `projection` only adjust the query. Every read
/// executes it again, so results reflect the collection at read time.
#[derive(Debug, Clone)]
pub struct Cursor {
    collection: String,
    backend: Arc<dyn DocumentBackend>,
    query: Query,
}

impl Cursor {
    pub(crate) fn new(collection: String, backend: Arc<dyn DocumentBackend>, query: Query) -> Self {
        Self {
            collection,
            backend,
            query,
        }
    }

    /// Order by one field. Calling again replaces the previous key.
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.query.sort = Some(Sort::new(field, direction));
        self
    }

    /// Cap the number of documents. Zero means no limit.
    pub fn limit(mut self, n: u64) -> Self {
        self.query.limit = Some(n);
        self
    }

    /// Return only these fields (plus `_id`).
    pub fn projection<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.query.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub async fn to_vec(&self) -> Result<Vec<Document>, StoreError> {
        run_query(&self.collection, self.backend.as_ref(), &self.query).await
    }

    /// The document at `index` in result order.
    pub async fn get(&self, index: usize) -> Result<Option<Document>, StoreError> {
        let mut query = self.query.clone();
        let wanted = u64::try_from(index).unwrap_or(u64::MAX).saturating_add(1);
        if query.effective_limit().is_none_or(|limit| limit > wanted) {
            query.limit = Some(wanted);
        }
        let mut docs = run_query(&self.collection, self.backend.as_ref(), &query).await?;
        Ok((index < docs.len()).then(|| docs.swap_remove(index)))
    }

    pub async fn first(&self) -> Result<Option<Document>, StoreError> {
        self.get(0).await
    }
}
