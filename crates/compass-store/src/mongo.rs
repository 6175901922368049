use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Document, doc};
use compass_query::{Filter, ID_FIELD, Pipeline, Query, Update};
use futures::TryStreamExt;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection, IndexModel};
use tracing::debug;

use crate::backend::{BackendMode, CollectionConfig, DocumentBackend};
use crate::error::StoreError;
use crate::result::{DeleteResult, UpdateResult};

/// Native document server. Filters, updates and pipelines are rendered in
/// the server's own dialect and executed there.
#[derive(Debug)]
pub struct MongoBackend {
    client: Mutex<Option<Client>>,
    database: String,
}

impl MongoBackend {
    /// Connect and confirm liveness with a ping, giving up after `timeout`.
    pub async fn connect(uri: &str, database: &str, timeout: Duration) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.app_name.get_or_insert_with(|| "compass".to_string());

        let client = Client::with_options(options)?;
        client.database(database).run_command(doc! { "ping": 1 }).await?;
        debug!(database, "native server answered ping");

        Ok(Self {
            client: Mutex::new(Some(client)),
            database: database.to_string(),
        })
    }

    fn client(&self) -> Result<Client, StoreError> {
        self.client
            .lock()
            .map_err(|e| StoreError::Backend(format!("client lock poisoned: {e}")))?
            .clone()
            .ok_or(StoreError::Unavailable)
    }

    fn collection(&self, name: &str) -> Result<Collection<Document>, StoreError> {
        Ok(self.client()?.database(&self.database).collection(name))
    }
}

#[async_trait]
impl DocumentBackend for MongoBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Native
    }

    /// Collections appear on first write; only the requested indexes are
    /// created here.
    async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), StoreError> {
        if config.indexes.is_empty() {
            return Ok(());
        }
        let coll = self.collection(&config.name)?;
        let models = config
            .indexes
            .iter()
            .map(|field| {
                let mut keys = Document::new();
                keys.insert(field.clone(), 1);
                IndexModel::builder().keys(keys).build()
            });
        coll.create_indexes(models).await?;
        Ok(())
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let coll = self.collection(collection)?;
        for doc in docs {
            let id = doc
                .get(ID_FIELD)
                .cloned()
                .ok_or_else(|| StoreError::InvalidIdentity("document has no _id".into()))?;
            let mut by_id = Document::new();
            by_id.insert(ID_FIELD, id);
            coll.replace_one(by_id, &doc)
                .upsert(true)
                .await?;
        }
        Ok(())
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(collection)?;
        let mut action = coll.find(query.filter.to_document());
        if let Some(sort) = &query.sort {
            let mut spec = Document::new();
            spec.insert(sort.field.clone(), sort.direction.as_i32());
            action = action.sort(spec);
        }
        if let Some(limit) = query.effective_limit() {
            action = action.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        if let Some(columns) = &query.projection {
            let mut spec = Document::new();
            for column in columns {
                spec.insert(column.clone(), 1);
            }
            action = action.projection(spec);
        }
        let cursor = action.await?;
        Ok(cursor.try_collect().await?)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let coll = self.collection(collection)?;
        Ok(coll.count_documents(filter.to_document()).await?)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let coll = self.collection(collection)?;
        let result = coll
            .update_one(filter.to_document(), update.to_document())
            .await?;
        Ok(UpdateResult {
            matched_count: result.matched_count,
            modified_count: result.modified_count,
        })
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        many: bool,
    ) -> Result<DeleteResult, StoreError> {
        let coll = self.collection(collection)?;
        let result = if many {
            coll.delete_many(filter.to_document()).await?
        } else {
            coll.delete_one(filter.to_document()).await?
        };
        Ok(DeleteResult {
            deleted_count: result.deleted_count,
        })
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, StoreError> {
        let coll = self.collection(collection)?;
        let cursor = coll.aggregate(pipeline.to_documents()).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn ping(&self) -> bool {
        let Ok(client) = self.client() else {
            return false;
        };
        client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await
            .is_ok()
    }

    async fn close(&self) {
        let taken = self.client.lock().ok().and_then(|mut guard| guard.take());
        if let Some(client) = taken {
            client.shutdown().await;
        }
    }
}
