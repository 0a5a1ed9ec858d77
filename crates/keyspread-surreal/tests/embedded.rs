//! Store contract tests against the embedded `mem://` engine.

use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use keyspread_core::{Record, Row, StorageKey, Value};
use keyspread_store::{
    CounterUpdate, Mutation, OrderIndex, ReadFence, RecordStore, StoreClient, UniqueIndexStore,
};
use keyspread_surreal::{Surreal2Store, SurrealConfig};
use std::collections::HashSet;
use std::sync::Arc;

fn record(id: &str, author: &str, sort_weight: i64) -> Record {
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    Record {
        id: id.to_string(),
        author: author.to_string(),
        content: format!("content-{id}"),
        count: 0,
        favorites: vec!["ruby".to_string(), "gold".to_string()],
        sort_weight,
        created_at: at,
        updated_at: at,
        committed_at: None,
    }
}

async fn store() -> Arc<Surreal2Store> {
    Arc::new(Surreal2Store::connect_embedded().await.unwrap())
}

#[tokio::test]
async fn test_insert_get_round_trip() {
    let client = store().await;
    let records = RecordStore::new(Arc::clone(&client));

    let committed_at = records.insert(&record("s-1", "gold", 9)).await.unwrap();
    let read = records.get("s-1").await.unwrap();

    assert_eq!(read.id, "s-1");
    assert_eq!(read.favorites, vec!["ruby".to_string(), "gold".to_string()]);
    assert_eq!(read.sort_weight, 9);
    assert_eq!(read.committed_at, Some(committed_at));
    assert!(records.get("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_duplicate_insert_is_uniqueness_violation() {
    let client = store().await;
    let key = StorageKey::single("dup");
    let row = Row::new().with("id", "dup");

    client
        .apply(vec![Mutation::insert("T", key.clone(), row.clone())])
        .await
        .unwrap();
    let err = client
        .apply(vec![
            Mutation::insert("Other", StorageKey::single("fresh"), row.clone()),
            Mutation::insert("T", key, row),
        ])
        .await
        .unwrap_err();

    assert!(err.is_uniqueness_violation(), "{err}");
    assert_eq!(client.count("Other").await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_missing_row_is_not_found() {
    let client = store().await;
    let err = client
        .apply(vec![Mutation::update(
            "T",
            StorageKey::single("ghost"),
            Row::new().with("x", 1_i64),
        )])
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
}

#[tokio::test]
async fn test_paged_scan_in_sort_order() {
    let client = Arc::new(
        Surreal2Store::connect(&SurrealConfig::default().with_page_size(7))
            .await
            .unwrap(),
    );
    let records = RecordStore::new(Arc::clone(&client));
    let batch: Vec<Record> = (0..40)
        .map(|i| record(&format!("p-{i:02}"), "dia", (i * 37) % 40))
        .collect();
    records.insert_many(&batch).await.unwrap();

    let listed = records.query(25).await.unwrap();
    assert_eq!(listed.len(), 25);
    assert!(listed.windows(2).all(|w| w[0].sort_weight <= w[1].sort_weight));

    let all: Vec<Row> = client
        .scan("Record", &OrderIndex::PrimaryKey)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    assert_eq!(all.len(), 40);
    assert_eq!(all[0].string("id").unwrap(), "p-00");
}

#[tokio::test]
async fn test_projection() {
    let client = store().await;
    let records = RecordStore::new(Arc::clone(&client));
    let batch: Vec<Record> = (0..15)
        .map(|i| record(&format!("q-{i:02}"), "silver", i))
        .collect();
    records.insert_many(&batch).await.unwrap();

    let projected = records.query_projection().await.unwrap();
    assert_eq!(projected.len(), 10);
    assert_eq!(projected[0].id, "q-00");
    assert_eq!(projected[0].author, "silver");
}

#[tokio::test]
async fn test_audited_insert_and_update() {
    let client = store().await;
    let records = RecordStore::new(Arc::clone(&client));

    records.insert_audited(&record("a-1", "ruby", 1)).await.unwrap();
    assert_eq!(client.count("OperationLog").await.unwrap(), 1);
    assert_eq!(client.count("RecordMirror3").await.unwrap(), 1);

    let first = records.update("a-1").await.unwrap();
    let second = records.update("a-1").await.unwrap();
    assert_eq!((first.value, second.value), (1, 2));

    let read = records.get("a-1").await.unwrap();
    assert_eq!(read.count, 2);
    assert_eq!(read.committed_at, Some(second.committed_at));
}

#[tokio::test]
async fn test_counter_update_needs_fence() {
    let client = store().await;
    let key = StorageKey::single("c-1");
    client
        .apply(vec![Mutation::insert(
            "Counter",
            key.clone(),
            Row::new().with("count", 0_i64).with("committed_at", Value::CommitTimestamp),
        )])
        .await
        .unwrap();

    let update = CounterUpdate::new("Counter", key.clone(), "count")
        .with_fence(ReadFence::new("Fence", key.clone()));
    let err = client.read_modify_write(update).await.unwrap_err();
    assert!(err.is_not_found(), "{err}");

    let row = client.read_row("Counter", &key).await.unwrap();
    assert_eq!(row.int("count").unwrap(), 0);
}

#[tokio::test]
async fn test_unique_index_rejects_second_natural_id() {
    let client = store().await;
    let store = UniqueIndexStore::new(Arc::clone(&client));

    let (first, _) = store.insert(record("n-1", "gold", 0)).await.unwrap();
    let err = store.insert(record("n-1", "dia", 0)).await.unwrap_err();

    assert!(err.is_uniqueness_violation(), "{err}");
    assert_eq!(client.count("RecordNaturalIdIndex").await.unwrap(), 1);
    assert_eq!(client.count("RecordUniqueIndex").await.unwrap(), 1);
    assert_eq!(store.get_by_natural_id("n-1").await.unwrap(), first);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_natural_id_collisions() {
    let client = store().await;
    let store = Arc::new(UniqueIndexStore::new(Arc::clone(&client)));

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let id = format!("n-{}", i % 4);
            tokio::spawn(async move { store.insert(record(&id, "dia", 0)).await })
        })
        .collect();

    let mut winners = HashSet::new();
    let (mut violations, mut conflicts) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok((stored, _)) => assert!(winners.insert(stored.record.id.clone()), "{} stored twice", stored.record.id),
            Err(e) if e.is_uniqueness_violation() => violations += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error kind {:?}: {e}", e.kind()),
        }
    }

    assert_eq!(winners.len() + violations + conflicts, 16);
    assert!(violations > 0);
    assert_eq!(client.count("RecordNaturalIdIndex").await.unwrap(), winners.len());
    assert_eq!(client.count("RecordUniqueIndex").await.unwrap(), winners.len());
    for id in &winners {
        assert_eq!(store.get_by_natural_id(id).await.unwrap().record.id, *id);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_updates_are_not_lost() {
    let client = store().await;
    let records = Arc::new(RecordStore::new(Arc::clone(&client)));
    records.insert_audited(&record("hot", "gold", 1)).await.unwrap();

    let handles: Vec<_> = (0..32)
        .map(|_| {
            let records = Arc::clone(&records);
            tokio::spawn(async move { records.update("hot").await })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => applied += 1,
            Err(e) => assert!(e.is_conflict(), "unexpected error kind {:?}: {e}", e.kind()),
        }
    }

    assert!(applied > 0);
    assert_eq!(records.get("hot").await.unwrap().count, applied);
    assert_eq!(client.count("OperationLog").await.unwrap() as i64, 1 + applied);
}
