use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bson::Document;
use compass_query::{Filter, Query, Update};
use imbl::Vector;

use crate::backend::{BackendMode, CollectionConfig, DocumentBackend};
use crate::error::StoreError;
use crate::eval::matches;
use crate::mutation::apply_and_stamp;
use crate::pipeline::shape;
use crate::result::{DeleteResult, UpdateResult};

type Documents = Vector<Document>;

/// Process-local document store.
///
/// Each collection is an [`imbl::Vector`] in insertion order behind an
/// [`ArcSwap`]: readers load a snapshot without locking, writers serialize
/// on `write_lock` and publish a new version.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, Arc<ArcSwap<Documents>>>>,
    write_lock: Mutex<()>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_writes(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|e| StoreError::Backend(format!("write lock poisoned: {e}")))
    }

    /// Get or create the slot for a collection.
    fn slot(&self, name: &str) -> Result<Arc<ArcSwap<Documents>>, StoreError> {
        {
            let collections = self
                .collections
                .read()
                .map_err(|e| StoreError::Backend(format!("catalog lock poisoned: {e}")))?;
            if let Some(slot) = collections.get(name) {
                return Ok(Arc::clone(slot));
            }
        }
        let mut collections = self
            .collections
            .write()
            .map_err(|e| StoreError::Backend(format!("catalog lock poisoned: {e}")))?;
        let slot = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(Vector::new()))));
        Ok(Arc::clone(slot))
    }

    /// Snapshot a collection; missing collections read as empty.
    fn snapshot(&self, name: &str) -> Result<Arc<Documents>, StoreError> {
        let collections = self
            .collections
            .read()
            .map_err(|e| StoreError::Backend(format!("catalog lock poisoned: {e}")))?;
        Ok(match collections.get(name) {
            Some(slot) => slot.load_full(),
            None => Arc::new(Vector::new()),
        })
    }
}

fn id_of(doc: &Document) -> Option<&str> {
    doc.get_str(compass_query::ID_FIELD).ok()
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Memory
    }

    async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), StoreError> {
        self.slot(&config.name).map(|_| ())
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let slot = self.slot(collection)?;
        let _guard = self.lock_writes()?;
        let mut data = (**slot.load()).clone();
        for doc in docs {
            let existing = data
                .iter()
                .position(|stored| id_of(stored).is_some() && id_of(stored) == id_of(&doc));
            match existing {
                Some(idx) => {
                    data.set(idx, doc);
                }
                None => data.push_back(doc),
            }
        }
        slot.store(Arc::new(data));
        Ok(())
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let data = self.snapshot(collection)?;
        let hits: Vec<Document> = data
            .iter()
            .filter(|doc| matches(doc, &query.filter))
            .cloned()
            .collect();
        Ok(shape(hits, query))
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let data = self.snapshot(collection)?;
        Ok(data.iter().filter(|doc| matches(doc, filter)).count() as u64)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let slot = self.slot(collection)?;
        let _guard = self.lock_writes()?;
        let current = slot.load_full();
        let Some(idx) = current.iter().position(|doc| matches(doc, filter)) else {
            return Ok(UpdateResult::default());
        };

        let mut doc = current[idx].clone();
        if !apply_and_stamp(&mut doc, update)? {
            return Ok(UpdateResult {
                matched_count: 1,
                modified_count: 0,
            });
        }
        let mut data = (*current).clone();
        data.set(idx, doc);
        slot.store(Arc::new(data));
        Ok(UpdateResult {
            matched_count: 1,
            modified_count: 1,
        })
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        many: bool,
    ) -> Result<DeleteResult, StoreError> {
        let slot = self.slot(collection)?;
        let _guard = self.lock_writes()?;
        let current = slot.load_full();

        let mut data = (*current).clone();
        let deleted = if many {
            let before = data.len();
            data.retain(|doc| !matches(doc, filter));
            before - data.len()
        } else {
            match data.iter().position(|doc| matches(doc, filter)) {
                Some(idx) => {
                    data.remove(idx);
                    1
                }
                None => 0,
            }
        };
        if deleted > 0 {
            slot.store(Arc::new(data));
        }
        Ok(DeleteResult {
            deleted_count: deleted as u64,
        })
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn close(&self) {
        if let Ok(mut collections) = self.collections.write() {
            collections.clear();
        }
    }
}
