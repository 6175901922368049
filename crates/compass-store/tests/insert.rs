mod common;
use common::*;

use bson::oid::ObjectId;
use bson::{Bson, doc};
use compass_store::Filter;

#[tokio::test]
async fn insert_assigns_fresh_identity() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "users").await;
        let doc = doc! { "email": "x@y.com" };

        let first = coll.insert_one(doc.clone()).await.unwrap().inserted_id;
        let second = coll.insert_one(doc).await.unwrap().inserted_id;

        assert_eq!(first.len(), 24, "{backend}");
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()), "{backend}");
        assert_ne!(first, second, "{backend}");
        assert_eq!(coll.count_documents(doc! {}).await.unwrap(), 2, "{backend}");
    }
}

#[tokio::test]
async fn explicit_identity_is_kept_and_upserted() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "users").await;
        let id = coll
            .insert_one(doc! { "_id": "u-1", "name": "Asha" })
            .await
            .unwrap()
            .inserted_id;
        assert_eq!(id, "u-1", "{backend}");

        coll.insert_one(doc! { "_id": "u-1", "name": "Asha K" }).await.unwrap();
        assert_eq!(coll.count_documents(doc! {}).await.unwrap(), 1, "{backend}");
        let stored = coll.find_one(doc! { "_id": "u-1" }).await.unwrap().unwrap();
        assert_eq!(stored.get_str("name").unwrap(), "Asha K", "{backend}");
    }
}

#[tokio::test]
async fn object_id_identity_is_stored_as_hex() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "users").await;
        let oid = ObjectId::new();
        let id = coll.insert_one(doc! { "_id": oid }).await.unwrap().inserted_id;
        assert_eq!(id, oid.to_hex(), "{backend}");

        // Lookups by either form find it.
        assert!(coll.find_one(doc! { "_id": oid }).await.unwrap().is_some(), "{backend}");
        assert!(coll.find_one(doc! { "_id": oid.to_hex() }).await.unwrap().is_some(), "{backend}");
    }
}

#[tokio::test]
async fn plain_documents_round_trip() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "profiles").await;
        let original = doc! {
            "_id": "p-1",
            "name": "Ravi",
            "year": 3,
            "cgpa": 8.25,
            "placed": false,
            "mentor": Bson::Null,
            "skills": ["rust", "sql"],
            "address": { "city": "Chennai", "geo": { "lat": 13.08, "lng": 80.27 } },
        };
        coll.insert_one(original.clone()).await.unwrap();
        let stored = coll.find_one(Filter::eq("_id", "p-1")).await.unwrap().unwrap();
        assert_eq!(stored, original, "{backend}");
    }
}

#[tokio::test]
async fn insert_many_reports_ids_in_order() {
    for (backend, db) in databases().await {
        let coll = collection(&db, COLLECTION).await;
        let result = coll.insert_many(seed_docs()).await.unwrap();
        assert_eq!(
            result.inserted_ids,
            ["acct-1", "acct-2", "acct-3", "acct-4", "acct-5"],
            "{backend}"
        );
        assert!(coll.insert_many(Vec::new()).await.unwrap().inserted_ids.is_empty());
    }
}

#[tokio::test]
async fn structured_identity_is_rejected() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "users").await;
        let err = coll.insert_one(doc! { "_id": { "a": 1 } }).await.unwrap_err();
        assert!(
            matches!(err, compass_store::StoreError::InvalidIdentity(_)),
            "{backend}: {err}"
        );
    }
}
