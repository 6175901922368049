//! Document-store compatibility layer.
//!
//! One document API over three interchangeable backends: a native document
//! server, SQLite emulating documents in a JSON column, and a process-local
//! store. [`Database::connect`] picks the backend from a connection URI.

mod aggregate;
mod backend;
mod collection;
mod config;
mod convert;
mod cursor;
mod database;
pub mod encoding;
mod error;
mod eval;
pub mod identity;
mod memory;
#[cfg(feature = "mongodb")]
mod mongo;
mod mutation;
mod pipeline;
mod result;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use backend::{BackendMode, CollectionConfig, DocumentBackend, validate_collection_name};
pub use collection::Collection;
pub use config::{BackendTarget, StoreConfig};
pub use convert::{IntoFilter, IntoPipeline, IntoUpdate};
pub use cursor::Cursor;
pub use database::Database;
pub use error::StoreError;
pub use memory::MemoryBackend;
#[cfg(feature = "mongodb")]
pub use mongo::MongoBackend;
pub use mutation::UPDATED_AT_FIELD;
pub use result::{DeleteResult, InsertManyResult, InsertOneResult, UpdateResult};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;

pub use compass_query::{
    Filter, ID_FIELD, Pipeline, Query, Sort, SortDirection, UNKNOWN_GROUP, Update,
};
