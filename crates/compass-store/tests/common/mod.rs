#![allow(dead_code)]

use std::sync::Arc;

use bson::{Document, doc};
use compass_store::{Collection, Database, SqliteBackend};

pub const COLLECTION: &str = "accounts";

/// One database per backend that runs without external services.
pub async fn databases() -> Vec<(&'static str, Database)> {
    let sqlite = SqliteBackend::open_in_memory().await.unwrap();
    vec![
        ("memory", Database::in_memory()),
        ("sqlite", Database::new(Arc::new(sqlite))),
    ]
}

pub async fn collection(db: &Database, name: &str) -> Collection {
    db.collection(name).await.expect("collection should be available")
}

pub fn seed_docs() -> Vec<Document> {
    vec![
        doc! { "_id": "acct-1", "name": "Acme Corp", "revenue": 50000, "status": "active", "active": true, "address": { "city": "Pune", "zip": "411001" } },
        doc! { "_id": "acct-2", "name": "Globex", "revenue": 80000, "status": "snoozed", "active": true, "address": { "city": "Delhi", "zip": "110001" } },
        doc! { "_id": "acct-3", "name": "Initech", "revenue": 12000, "active": false },
        doc! { "_id": "acct-4", "name": "Umbrella", "revenue": 95000, "status": "active", "active": true, "address": { "city": "Pune", "zip": "411002" } },
        doc! { "_id": "acct-5", "name": "Stark Industries", "revenue": 200000, "status": "active", "active": false },
    ]
}

/// A collection holding the five seed accounts, in insertion order.
pub async fn seeded(db: &Database) -> Collection {
    let coll = collection(db, COLLECTION).await;
    coll.insert_many(seed_docs()).await.unwrap();
    coll
}

pub fn ids(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .map(|d| d.get_str("_id").unwrap().to_string())
        .collect()
}
