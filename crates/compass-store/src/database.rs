use std::sync::{Arc, RwLock};
use std::time::Duration;

use tracing::{error, info, warn};

use crate::backend::{BackendMode, CollectionConfig, DocumentBackend, validate_collection_name};
use crate::collection::Collection;
use crate::config::{BackendTarget, StoreConfig};
use crate::error::StoreError;
use crate::memory::MemoryBackend;

/// The process-wide backend handle.
///
/// Built once at startup with [`Database::connect`], shared by reference
/// and torn down with [`Database::close`]. A handle whose connection failed
/// stays usable but unavailable: [`Database::collection`] returns `None`.
#[derive(Debug)]
pub struct Database {
    backend: RwLock<Option<Arc<dyn DocumentBackend>>>,
}

impl Database {
    pub fn new(backend: Arc<dyn DocumentBackend>) -> Self {
        Self {
            backend: RwLock::new(Some(backend)),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// A handle with no backend; every collection lookup returns `None`.
    pub fn unavailable() -> Self {
        Self {
            backend: RwLock::new(None),
        }
    }

    /// Pick and connect the backend named by `config.uri`.
    ///
    /// A native server that cannot be reached within the connect timeout is
    /// replaced by the in-memory store when `memory_fallback` is set. A
    /// relational database that fails to open leaves the handle unavailable.
    pub async fn connect(config: &StoreConfig) -> Self {
        match config.target() {
            BackendTarget::Native(uri) => {
                let attempt = connect_native(&uri, &config.database_name, config.connect_timeout);
                match attempt.await {
                    Ok(backend) => {
                        let database = &config.database_name;
                        info!(mode = %BackendMode::Native, %database, "connected");
                        Self::new(backend)
                    }
                    Err(e) if config.memory_fallback => {
                        warn!(error = %e, "native server unreachable, using in-memory store");
                        Self::in_memory()
                    }
                    Err(e) => {
                        error!(error = %e, "native server unreachable, database unavailable");
                        Self::unavailable()
                    }
                }
            }
            BackendTarget::Relational(path) => match connect_relational(&path).await {
                Ok(backend) => {
                    info!(mode = %BackendMode::Relational, %path, "connected");
                    Self::new(backend)
                }
                Err(e) => {
                    error!(error = %e, %path, "relational database failed to open");
                    Self::unavailable()
                }
            },
            BackendTarget::Memory => {
                info!(mode = %BackendMode::Memory, "using in-memory store");
                Self::in_memory()
            }
            BackendTarget::Unsupported(uri) => {
                error!(%uri, "unsupported database uri, database unavailable");
                Self::unavailable()
            }
        }
    }

    fn backend(&self) -> Option<Arc<dyn DocumentBackend>> {
        self.backend.read().ok().and_then(|guard| guard.clone())
    }

    pub fn mode(&self) -> Option<BackendMode> {
        self.backend().map(|b| b.mode())
    }

    pub fn is_available(&self) -> bool {
        self.backend().is_some()
    }

    /// Liveness of the backend; `false` when unavailable.
    pub async fn ping(&self) -> bool {
        match self.backend() {
            Some(backend) => backend.ping().await,
            None => false,
        }
    }

    /// Handle to a collection, creating its storage if needed.
    ///
    /// `None` when the backend is unavailable or the storage could not be
    /// created.
    pub async fn collection(&self, name: &str) -> Option<Collection> {
        match self.create_collection(CollectionConfig::new(name)).await {
            Ok(collection) => Some(collection),
            Err(StoreError::Unavailable) => None,
            Err(e) => {
                warn!(collection = name, error = %e, "collection unavailable");
                None
            }
        }
    }

    /// Create a collection's storage, including any requested indexes.
    pub async fn create_collection(
        &self,
        config: CollectionConfig,
    ) -> Result<Collection, StoreError> {
        validate_collection_name(&config.name)?;
        let backend = self.backend().ok_or(StoreError::Unavailable)?;
        backend.ensure_collection(&config).await?;
        Ok(Collection::new(config.name, backend))
    }

    /// Close the backend and drop the handle. Idempotent.
    pub async fn close(&self) {
        let taken = self.backend.write().ok().and_then(|mut guard| guard.take());
        if let Some(backend) = taken {
            backend.close().await;
            info!(mode = %backend.mode(), "database closed");
        }
    }
}

#[cfg(feature = "mongodb")]
async fn connect_native(
    uri: &str,
    database: &str,
    timeout: Duration,
) -> Result<Arc<dyn DocumentBackend>, StoreError> {
    let attempt = crate::mongo::MongoBackend::connect(uri, database, timeout);
    // Server selection retries internally; bound the whole attempt.
    match tokio::time::timeout(timeout + Duration::from_millis(500), attempt).await {
        Ok(backend) => Ok(Arc::new(backend?)),
        Err(_) => Err(StoreError::Backend(format!(
            "no answer within {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(not(feature = "mongodb"))]
async fn connect_native(
    _uri: &str,
    _database: &str,
    _timeout: Duration,
) -> Result<Arc<dyn DocumentBackend>, StoreError> {
    Err(StoreError::Backend("built without native backend support".into()))
}

#[cfg(feature = "sqlite")]
async fn connect_relational(path: &str) -> Result<Arc<dyn DocumentBackend>, StoreError> {
    let backend = crate::sqlite::SqliteBackend::open(path).await?;
    if !backend.ping().await {
        return Err(StoreError::Backend("ping failed".into()));
    }
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "sqlite"))]
async fn connect_relational(_path: &str) -> Result<Arc<dyn DocumentBackend>, StoreError> {
    Err(StoreError::Backend("built without relational backend support".into()))
}
