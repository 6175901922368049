mod common;
use common::*;

use bson::{Bson, doc};
use compass_store::{Filter, SortDirection, StoreError};

#[tokio::test]
async fn empty_filter_matches_all() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let all = coll.find(doc! {}).unwrap().to_vec().await.unwrap();
        assert_eq!(all.len(), 5, "{backend}");
        assert_eq!(all, seed_docs(), "{backend}");
        assert_eq!(coll.count_documents(Filter::all()).await.unwrap(), 5, "{backend}");
    }
}

#[tokio::test]
async fn implicit_equality() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll.find(doc! { "status": "active" }).unwrap().to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-1", "acct-4", "acct-5"], "{backend}");

        let docs = coll.find(doc! { "active": true }).unwrap().to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-1", "acct-2", "acct-4"], "{backend}");

        let docs = coll.find(doc! { "revenue": 12000 }).unwrap().to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-3"], "{backend}");
    }
}

#[tokio::test]
async fn not_equal_includes_missing_fields() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll
            .find(doc! { "status": { "$ne": "active" } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-2", "acct-3"], "{backend}");
    }
}

#[tokio::test]
async fn membership() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll
            .find(doc! { "status": { "$in": ["snoozed", "rejected"] } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-2"], "{backend}");

        let docs = coll
            .find(doc! { "_id": { "$in": ["acct-5", "acct-1", "missing"] } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-1", "acct-5"], "{backend}");

        let none = coll.count_documents(doc! { "_id": { "$in": [] } }).await.unwrap();
        assert_eq!(none, 0, "{backend}");
    }
}

#[tokio::test]
async fn greater_than_is_numeric() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        // Text comparison would put "200000" below "60000".
        let docs = coll
            .find(doc! { "revenue": { "$gt": 60000 } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-2", "acct-4", "acct-5"], "{backend}");

        let docs = coll
            .find(doc! { "revenue": { "$gt": 79999.5 } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-2", "acct-4", "acct-5"], "{backend}");
    }
}

#[tokio::test]
async fn greater_than_on_strings() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll
            .find(doc! { "name": { "$gt": "Stark" } })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-4", "acct-5"], "{backend}");
    }
}

#[tokio::test]
async fn or_group_with_conjunction() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let filter = doc! {
            "active": true,
            "$or": [{ "status": "snoozed" }, { "revenue": { "$gt": 90000 } }],
        };
        let docs = coll.find(filter).unwrap().to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-2", "acct-4"], "{backend}");
    }
}

#[tokio::test]
async fn dotted_paths() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll
            .find(doc! { "address.city": "Pune" })
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-1", "acct-4"], "{backend}");
    }
}

#[tokio::test]
async fn null_matches_missing() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let docs = coll
            .find(Filter::eq("address", Bson::Null))
            .unwrap()
            .to_vec()
            .await
            .unwrap();
        assert_eq!(ids(&docs), ["acct-3", "acct-5"], "{backend}");
    }
}

#[tokio::test]
async fn sort_and_limit() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let cursor = coll.find(doc! {}).unwrap().sort("name", SortDirection::Desc);
        let docs = cursor.clone().limit(2).to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-4", "acct-5"], "{backend}");

        // Zero means unlimited.
        let docs = cursor.clone().limit(0).to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-4", "acct-5", "acct-3", "acct-2", "acct-1"], "{backend}");

        // The last sort wins.
        let docs = cursor.sort("name", SortDirection::Asc).to_vec().await.unwrap();
        assert_eq!(ids(&docs), ["acct-1", "acct-2", "acct-3", "acct-5", "acct-4"], "{backend}");
    }
}

#[tokio::test]
async fn projection_keeps_identity() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let doc = coll
            .find(doc! { "_id": "acct-1" })
            .unwrap()
            .projection(["name", "address.city"])
            .first()
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            doc,
            doc! { "_id": "acct-1", "name": "Acme Corp", "address": { "city": "Pune" } },
            "{backend}"
        );
    }
}

#[tokio::test]
async fn cursor_reexecutes_on_every_read() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let cursor = coll.find(doc! { "status": "active" }).unwrap();
        assert_eq!(cursor.to_vec().await.unwrap().len(), 3, "{backend}");

        coll.insert_one(doc! { "status": "active" }).await.unwrap();
        assert_eq!(cursor.to_vec().await.unwrap().len(), 4, "{backend}");
    }
}

#[tokio::test]
async fn cursor_indexing() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let cursor = coll.find(doc! {}).unwrap().sort("name", SortDirection::Asc);
        let second = cursor.get(1).await.unwrap().unwrap();
        assert_eq!(second.get_str("name").unwrap(), "Globex", "{backend}");
        assert!(cursor.get(5).await.unwrap().is_none(), "{backend}");
    }
}

#[tokio::test]
async fn malformed_identity_is_not_found() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        assert!(coll.find_one(doc! { "_id": Bson::Null }).await.unwrap().is_none(), "{backend}");
        assert!(coll.find_one(doc! { "_id": 1.5 }).await.unwrap().is_none(), "{backend}");
        assert!(coll.find_one(doc! { "_id": "acct-9" }).await.unwrap().is_none(), "{backend}");
    }
}

#[tokio::test]
async fn unknown_operator_is_rejected() {
    for (backend, db) in databases().await {
        let coll = seeded(&db).await;
        let err = coll.find(doc! { "name": { "$regex": "^A" } }).unwrap_err();
        assert!(matches!(err, StoreError::Filter(_)), "{backend}: {err}");
    }
}

#[tokio::test]
async fn missing_collection_reads_empty() {
    for (backend, db) in databases().await {
        let coll = collection(&db, "never_written").await;
        assert!(coll.find_one(doc! {}).await.unwrap().is_none(), "{backend}");
        assert_eq!(coll.count_documents(doc! {}).await.unwrap(), 0, "{backend}");
    }
}
