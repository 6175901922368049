use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bson::Document;
use compass_query::{Filter, Query, Update};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::debug;

use super::translate::{self, Predicate};
use crate::backend::{BackendMode, CollectionConfig, DocumentBackend, validate_collection_name};
use crate::encoding::{from_json_text, to_json_text};
use crate::error::StoreError;
use crate::mutation::apply_and_stamp;
use crate::pipeline::apply_projection;
use crate::result::{DeleteResult, UpdateResult};

/// Documents emulated in SQLite: one table per collection with an `id`
/// column and the document as JSON text in `doc`.
///
/// The connection sits behind a mutex and every call runs on the blocking
/// pool. [`close`](DocumentBackend::close) drops the connection.
#[derive(Debug)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Option<Connection>>>,
    ensured: Mutex<HashSet<String>>,
}

impl SqliteBackend {
    /// Open (or create) a database file. `":memory:"` opens a private
    /// in-memory database.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = if path == ":memory:" {
                Connection::open_in_memory()?
            } else {
                let conn = Connection::open(&path)?;
                let mode: String =
                    conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
                debug!(%path, journal_mode = %mode, "opened sqlite database");
                conn
            };
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(conn)
        })
        .await??;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            ensured: Mutex::new(HashSet::new()),
        })
    }

    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:").await
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Backend(format!("connection lock poisoned: {e}")))?;
            let conn = guard.as_mut().ok_or(StoreError::Unavailable)?;
            f(conn)
        })
        .await?
    }

    fn is_ensured(&self, name: &str) -> bool {
        self.ensured
            .lock()
            .map(|set| set.contains(name))
            .unwrap_or(false)
    }
}

fn table(name: &str) -> Result<String, StoreError> {
    validate_collection_name(name)?;
    Ok(format!("\"{name}\""))
}

fn select_sql(table: &str, predicate: &Option<Predicate>) -> String {
    let mut sql = format!("SELECT doc FROM {table}");
    if let Some(p) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&p.sql);
    }
    sql
}

fn params_of(predicate: &Option<Predicate>) -> Vec<rusqlite::types::Value> {
    predicate.as_ref().map(|p| p.params.clone()).unwrap_or_default()
}

fn index_name(table: &str, field: &str) -> String {
    let suffix: String = field
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("\"idx_{table}_{suffix}\"")
}

#[async_trait]
impl DocumentBackend for SqliteBackend {
    fn mode(&self) -> BackendMode {
        BackendMode::Relational
    }

    async fn ensure_collection(&self, config: &CollectionConfig) -> Result<(), StoreError> {
        if config.indexes.is_empty() && self.is_ensured(&config.name) {
            return Ok(());
        }
        let table = table(&config.name)?;
        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
                id  TEXT PRIMARY KEY, \
                doc TEXT NOT NULL CHECK (json_valid(doc))\
            );"
        );
        for field in &config.indexes {
            ddl.push_str(&format!(
                "\nCREATE INDEX IF NOT EXISTS {} ON {table} ({});",
                index_name(&config.name, field),
                translate::column(field)?,
            ));
        }

        self.with_conn(move |conn| Ok(conn.execute_batch(&ddl)?)).await?;
        debug!(collection = %config.name, indexes = config.indexes.len(), "ensured table");
        if let Ok(mut set) = self.ensured.lock() {
            set.insert(config.name.clone());
        }
        Ok(())
    }

    async fn insert(&self, collection: &str, docs: Vec<Document>) -> Result<(), StoreError> {
        let table = table(collection)?;
        let rows = docs
            .iter()
            .map(|doc| -> Result<(String, String), StoreError> {
                let id = doc
                    .get_str(compass_query::ID_FIELD)
                    .map_err(|_| StoreError::InvalidIdentity("document has no string _id".into()))?;
                Ok((id.to_string(), to_json_text(doc)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            {
                let mut stmt = tx.prepare(&format!(
                    "INSERT INTO {table} (id, doc) VALUES (?1, ?2) \
                     ON CONFLICT(id) DO UPDATE SET doc = excluded.doc"
                ))?;
                for (id, doc) in &rows {
                    stmt.execute(params![id, doc])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let table = table(collection)?;
        let predicate = translate::where_clause(&query.filter)?;
        let mut sql = select_sql(&table, &predicate);
        sql.push_str(&translate::order_by(query.sort.as_ref())?);
        if let Some(limit) = query.effective_limit() {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        let params = params_of(&predicate);

        let texts = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        let mut docs = texts
            .iter()
            .map(|text| from_json_text(text))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(columns) = &query.projection {
            for doc in &mut docs {
                apply_projection(doc, columns);
            }
        }
        Ok(docs)
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let table = table(collection)?;
        let predicate = translate::where_clause(filter)?;
        let mut sql = format!("SELECT COUNT(*) FROM {table}");
        if let Some(p) = &predicate {
            sql.push_str(" WHERE ");
            sql.push_str(&p.sql);
        }
        let params = params_of(&predicate);

        let count = self
            .with_conn(move |conn| {
                Ok(conn.query_row(&sql, params_from_iter(params.iter()), |row| {
                    row.get::<_, i64>(0)
                })?)
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: &Update,
    ) -> Result<UpdateResult, StoreError> {
        let table = table(collection)?;
        let predicate = translate::where_clause(filter)?;
        let mut select = format!("SELECT id, doc FROM {table}");
        if let Some(p) = &predicate {
            select.push_str(" WHERE ");
            select.push_str(&p.sql);
        }
        select.push_str(" ORDER BY rowid LIMIT 1");
        let params = params_of(&predicate);
        let update = update.clone();

        // Read, modify in process, write back. Not atomic across the two
        // statements; concurrent writers to one document can lose updates.
        self.with_conn(move |conn| {
            let row = conn
                .query_row(&select, params_from_iter(params.iter()), |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()?;
            let Some((id, text)) = row else {
                return Ok(UpdateResult::default());
            };

            let mut doc = from_json_text(&text)?;
            if !apply_and_stamp(&mut doc, &update)? {
                return Ok(UpdateResult {
                    matched_count: 1,
                    modified_count: 0,
                });
            }
            let modified = conn.execute(
                &format!("UPDATE {table} SET doc = ?1 WHERE id = ?2"),
                params![to_json_text(&doc)?, id],
            )?;
            Ok(UpdateResult {
                matched_count: 1,
                modified_count: modified as u64,
            })
        })
        .await
    }

    async fn delete(
        &self,
        collection: &str,
        filter: &Filter,
        many: bool,
    ) -> Result<DeleteResult, StoreError> {
        let table = table(collection)?;
        let predicate = translate::where_clause(filter)?;
        let condition = predicate.as_ref().map(|p| p.sql.as_str()).unwrap_or("1");
        let sql = if many {
            format!("DELETE FROM {table} WHERE {condition}")
        } else {
            format!(
                "DELETE FROM {table} WHERE id = \
                 (SELECT id FROM {table} WHERE {condition} ORDER BY rowid LIMIT 1)"
            )
        };
        let params = params_of(&predicate);

        let deleted = self
            .with_conn(move |conn| Ok(conn.execute(&sql, params_from_iter(params.iter()))?))
            .await?;
        Ok(DeleteResult {
            deleted_count: deleted as u64,
        })
    }

    async fn ping(&self) -> bool {
        self.with_conn(|conn| Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?))
            .await
            .is_ok()
    }

    async fn close(&self) {
        let conn = Arc::clone(&self.conn);
        let closed = tokio::task::spawn_blocking(move || {
            let taken = conn.lock().ok().and_then(|mut guard| guard.take());
            if let Some(conn) = taken {
                if let Err((_, e)) = conn.close() {
                    tracing::warn!(error = %e, "sqlite close failed");
                }
            }
        })
        .await;
        if let Err(e) = closed {
            tracing::warn!(error = %e, "sqlite close task failed");
        }
        if let Ok(mut set) = self.ensured.lock() {
            set.clear();
        }
    }
}
