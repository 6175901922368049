mod backend;
mod translate;

pub use backend::SqliteBackend;
