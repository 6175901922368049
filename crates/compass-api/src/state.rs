use std::sync::Arc;

use compass_store::{Collection, CollectionConfig, Database};
use tracing::warn;

use crate::error::ApiError;

pub const TASKS: &str = "tasks";
pub const USERS: &str = "users";
pub const INTERNSHIPS: &str = "internships";

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
}

impl AppState {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// A collection handle, or `None` while the database is unavailable.
    pub async fn collection(&self, name: &str) -> Option<Collection> {
        self.db.collection(name).await
    }

    /// Like [`AppState::collection`], for handlers that cannot degrade.
    pub async fn require(&self, name: &str) -> Result<Collection, ApiError> {
        self.collection(name).await.ok_or(ApiError::Unavailable)
    }

    /// Create the service's collections and their lookup indexes.
    pub async fn ensure_collections(&self) {
        let configs = [
            CollectionConfig::new(TASKS)
                .with_index("student_id")
                .with_index("status"),
            CollectionConfig::new(USERS).with_index("email"),
            CollectionConfig::new(INTERNSHIPS).with_index("student_id"),
        ];
        for config in configs {
            let name = config.name.clone();
            if let Err(e) = self.db.create_collection(config).await {
                warn!(collection = %name, error = %e, "could not prepare collection");
            }
        }
    }
}
