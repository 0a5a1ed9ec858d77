//! In-process store with range-sharding accounting.
//!
//! Every table is a `BTreeMap` keyed by [`StorageKey`] behind one lock, which
//! makes every write set and every read-modify-write serializable. Each
//! table also counts writes per key range so a run can show where its
//! writes landed.
//!
//! Scans hand out rows a page at a time, taking the lock once per page.
//! Ascending scans walk a column index that the first scan over the column
//! builds and every later write keeps current.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use keyspread_core::{KeyRanges, RangeHistogram, Row, StorageKey, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::ops::Bound;
use std::sync::atomic::{self, AtomicU64};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::error::StoreError;
use crate::mutation::{CounterOutcome, CounterUpdate, Mutation, OrderIndex, RowStream};
use crate::traits::StoreClient;

/// Rows handed out per lock acquisition by a scan.
const SCAN_PAGE_SIZE: usize = 32;

/// A column value ordered the way ascending scans order it.
#[derive(Debug, Clone)]
struct OrderKey(Option<Value>);

impl PartialEq for OrderKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OrderKey {}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(self.0.as_ref(), other.0.as_ref())
    }
}

type ColumnIndex = BTreeSet<(OrderKey, StorageKey)>;

/// Position of the last row a scan handed out.
#[derive(Debug, Clone)]
enum ScanCursor {
    Key(StorageKey),
    Ordered(OrderKey, StorageKey),
}

struct Table {
    rows: BTreeMap<StorageKey, Row>,
    indexes: HashMap<String, ColumnIndex>,
    writes: RangeHistogram,
}

impl Table {
    fn new(ranges: &KeyRanges) -> Self {
        Self {
            rows: BTreeMap::new(),
            indexes: HashMap::new(),
            writes: RangeHistogram::new(ranges.clone()),
        }
    }

    fn unindex(&mut self, key: &StorageKey) {
        let Some(row) = self.rows.get(key) else {
            return;
        };
        for (column, index) in self.indexes.iter_mut() {
            index.remove(&(OrderKey(row.get(column).cloned()), key.clone()));
        }
    }

    fn reindex(&mut self, key: &StorageKey) {
        let Some(row) = self.rows.get(key) else {
            return;
        };
        for (column, index) in self.indexes.iter_mut() {
            index.insert((OrderKey(row.get(column).cloned()), key.clone()));
        }
    }

    fn upsert(&mut self, key: StorageKey, row: Row, merge: bool) {
        self.unindex(&key);
        if merge {
            if let Some(existing) = self.rows.get_mut(&key) {
                existing.merge(row);
                self.reindex(&key);
                return;
            }
        }
        self.rows.insert(key.clone(), row);
        self.reindex(&key);
    }

    /// Up to `limit` rows after `after`, in scan order.
    fn page(&mut self, order: &OrderIndex, after: Option<&ScanCursor>, limit: usize) -> Vec<(ScanCursor, Row)> {
        match order {
            OrderIndex::PrimaryKey => {
                let lower = match after {
                    Some(ScanCursor::Key(key)) => Bound::Excluded(key.clone()),
                    _ => Bound::Unbounded,
                };
                self.rows
                    .range::<StorageKey, _>((lower, Bound::Unbounded))
                    .take(limit)
                    .map(|(key, row)| (ScanCursor::Key(key.clone()), row.clone()))
                    .collect()
            }
            OrderIndex::Ascending { column, .. } => {
                if !self.indexes.contains_key(column) {
                    let index: ColumnIndex = self
                        .rows
                        .iter()
                        .map(|(key, row)| (OrderKey(row.get(column).cloned()), key.clone()))
                        .collect();
                    debug!("Built index on {} over {} rows", column, index.len());
                    self.indexes.insert(column.clone(), index);
                }
                let Some(index) = self.indexes.get(column) else {
                    return Vec::new();
                };
                let lower = match after {
                    Some(ScanCursor::Ordered(value, key)) => {
                        Bound::Excluded((value.clone(), key.clone()))
                    }
                    _ => Bound::Unbounded,
                };
                index
                    .range::<(OrderKey, StorageKey), _>((lower, Bound::Unbounded))
                    .filter_map(|(value, key)| {
                        self.rows
                            .get(key)
                            .map(|row| (ScanCursor::Ordered(value.clone(), key.clone()), row.clone()))
                    })
                    .take(limit)
                    .collect()
            }
        }
    }
}

#[derive(Default)]
struct State {
    tables: HashMap<String, Table>,
    last_commit: Option<DateTime<Utc>>,
}

impl State {
    fn contains(&self, table: &str, key: &StorageKey) -> bool {
        self.tables
            .get(table)
            .is_some_and(|t| t.rows.contains_key(key))
    }

    /// Commit timestamps strictly increase even if the clock does not.
    fn next_commit_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_commit {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_commit = Some(ts);
        ts
    }

    /// Check a write set against current state without changing anything.
    fn validate(&self, mutations: &[Mutation]) -> Result<(), StoreError> {
        let mut created: HashSet<(&str, &StorageKey)> = HashSet::new();
        for mutation in mutations {
            let slot = (mutation.table(), mutation.key());
            let exists = self.contains(slot.0, slot.1) || created.contains(&slot);
            match mutation {
                Mutation::Insert { .. } if exists => {
                    return Err(StoreError::uniqueness_violation(slot.0, slot.1));
                }
                Mutation::Insert { .. } => {
                    created.insert(slot);
                }
                Mutation::Update { .. } if !exists => {
                    return Err(StoreError::not_found(slot.0, slot.1));
                }
                Mutation::Update { .. } => {}
            }
        }
        Ok(())
    }

    fn put(&mut self, ranges: &KeyRanges, table: &str, key: StorageKey, row: Row, merge: bool) {
        let table = self
            .tables
            .entry(table.to_string())
            .or_insert_with(|| Table::new(ranges));
        table.writes.record(&key.encoded());
        table.upsert(key, row, merge);
    }

    fn commit(&mut self, ranges: &KeyRanges, mutations: Vec<Mutation>, committed_at: DateTime<Utc>) {
        for mutation in mutations {
            let (table, key, mut row, merge) = match mutation {
                Mutation::Insert { table, key, row } => (table, key, row, false),
                Mutation::Update { table, key, row } => (table, key, row, true),
            };
            row.resolve_commit_timestamp(committed_at);
            self.put(ranges, &table, key, row, merge);
        }
    }
}

/// In-process [`StoreClient`].
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    ranges: KeyRanges,
    rows_streamed: Arc<AtomicU64>,
    rows_fetched: Arc<AtomicU64>,
}

impl MemoryStore {
    /// Store split into 16 uniform hex ranges.
    pub fn new() -> Self {
        Self::with_key_ranges(KeyRanges::default())
    }

    pub fn with_key_ranges(ranges: KeyRanges) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            ranges,
            rows_streamed: Arc::new(AtomicU64::new(0)),
            rows_fetched: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn key_ranges(&self) -> &KeyRanges {
        &self.ranges
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::transport(operation, "memory store lock poisoned"))
    }

    fn snapshot(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.snapshot()
            .tables
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.snapshot().tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Per-range write counts of one table.
    pub fn write_distribution(&self, table: &str) -> Option<RangeHistogram> {
        self.snapshot().tables.get(table).map(|t| t.writes.clone())
    }

    /// Per-range write counts of every table, by table name.
    pub fn write_distributions(&self) -> Vec<(String, RangeHistogram)> {
        let state = self.snapshot();
        let mut out: Vec<(String, RangeHistogram)> = state
            .tables
            .iter()
            .map(|(name, t)| (name.clone(), t.writes.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Rows handed out by scan streams so far.
    pub fn rows_streamed(&self) -> u64 {
        self.rows_streamed.load(atomic::Ordering::Relaxed)
    }

    /// Rows copied out of tables by scan pages so far.
    pub fn rows_fetched(&self) -> u64 {
        self.rows_fetched.load(atomic::Ordering::Relaxed)
    }
}

struct ScanState {
    state: Arc<Mutex<State>>,
    table: String,
    order: OrderIndex,
    cursor: Option<ScanCursor>,
    buffer: VecDeque<Row>,
    exhausted: bool,
    fetched: Arc<AtomicU64>,
}

impl ScanState {
    fn fetch_page(&mut self) -> Result<(), StoreError> {
        let page = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| StoreError::transport("scan", "memory store lock poisoned"))?;
            state
                .tables
                .get_mut(&self.table)
                .map(|t| t.page(&self.order, self.cursor.as_ref(), SCAN_PAGE_SIZE))
                .unwrap_or_default()
        };
        self.exhausted = page.len() < SCAN_PAGE_SIZE;
        self.fetched
            .fetch_add(page.len() as u64, atomic::Ordering::Relaxed);
        for (cursor, row) in page {
            self.cursor = Some(cursor);
            self.buffer.push_back(row);
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Column ordering for ascending scans. Nulls first, then by type, then by value.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) | Some(Value::CommitTimestamp) => 0,
            Some(Value::Int(_)) => 1,
            Some(Value::Timestamp(_)) => 2,
            Some(Value::String(_)) => 3,
            Some(Value::StringArray(_)) => 4,
        }
    }
    match (a, b) {
        (Some(Value::Int(x)), Some(Value::Int(y))) => x.cmp(y),
        (Some(Value::Timestamp(x)), Some(Value::Timestamp(y))) => x.cmp(y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::StringArray(x)), Some(Value::StringArray(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn apply(&self, mutations: Vec<Mutation>) -> Result<DateTime<Utc>, StoreError> {
        let mut state = self.lock("apply")?;
        state.validate(&mutations)?;
        let committed_at = state.next_commit_timestamp();
        let count = mutations.len();
        state.commit(&self.ranges, mutations, committed_at);
        debug!("Committed {} mutations at {}", count, committed_at);
        Ok(committed_at)
    }

    async fn read_row(&self, table: &str, key: &StorageKey) -> Result<Row, StoreError> {
        let state = self.lock("read_row")?;
        state
            .tables
            .get(table)
            .and_then(|t| t.rows.get(key))
            .cloned()
            .ok_or_else(|| StoreError::not_found(table, key))
    }

    async fn scan(&self, table: &str, order: &OrderIndex) -> Result<RowStream, StoreError> {
        let scan = ScanState {
            state: Arc::clone(&self.state),
            table: table.to_string(),
            order: order.clone(),
            cursor: None,
            buffer: VecDeque::new(),
            exhausted: false,
            fetched: Arc::clone(&self.rows_fetched),
        };
        let streamed = Arc::clone(&self.rows_streamed);
        let stream = stream::try_unfold(scan, |mut scan| async move {
            loop {
                if let Some(row) = scan.buffer.pop_front() {
                    return Ok(Some((row, scan)));
                }
                if scan.exhausted {
                    return Ok(None);
                }
                if let Err(e) = scan.fetch_page() {
                    return Err(e);
                }
            }
        })
        .map(move |row| {
            if row.is_ok() {
                streamed.fetch_add(1, atomic::Ordering::Relaxed);
            }
            row
        });
        Ok(stream.boxed())
    }

    async fn project(
        &self,
        table: &str,
        columns: &[&str],
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let state = self.lock("project")?;
        Ok(state
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .values()
                    .take(limit)
                    .map(|row| row.project(columns))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn read_modify_write(&self, update: CounterUpdate) -> Result<CounterOutcome, StoreError> {
        let mut state = self.lock("read_modify_write")?;
        for fence in &update.fences {
            if !state.contains(&fence.table, &fence.key) {
                return Err(StoreError::not_found(&fence.table, &fence.key));
            }
        }
        let value = state
            .tables
            .get(&update.table)
            .and_then(|t| t.rows.get(&update.key))
            .ok_or_else(|| StoreError::not_found(&update.table, &update.key))?
            .int(&update.counter_column)?
            + 1;
        state.validate(&update.append)?;

        let committed_at = state.next_commit_timestamp();
        let mut set = update.set;
        set.insert(&update.counter_column, value);
        set.resolve_commit_timestamp(committed_at);
        state.put(&self.ranges, &update.table, update.key, set, true);
        state.commit(&self.ranges, update.append, committed_at);

        Ok(CounterOutcome {
            value,
            committed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::ReadFence;
    use futures::TryStreamExt;

    fn row(id: &str, weight: i64) -> Row {
        Row::new()
            .with("id", id)
            .with("weight", weight)
            .with("count", 0_i64)
            .with("committed_at", Value::CommitTimestamp)
    }

    #[tokio::test]
    async fn test_insert_and_read() {
        let store = MemoryStore::new();
        let key = StorageKey::single("a");
        let committed_at = store
            .apply(vec![Mutation::insert("T", key.clone(), row("a", 1))])
            .await
            .unwrap();

        let read = store.read_row("T", &key).await.unwrap();
        assert_eq!(read.opt_timestamp("committed_at").unwrap(), Some(committed_at));
        assert!(store
            .read_row("T", &StorageKey::single("b"))
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_write_set_is_atomic() {
        let store = MemoryStore::new();
        store
            .apply(vec![Mutation::insert("Index", StorageKey::single("n1"), row("n1", 0))])
            .await
            .unwrap();

        let err = store
            .apply(vec![
                Mutation::insert("Primary", StorageKey::single("p1"), row("p1", 0)),
                Mutation::insert("Index", StorageKey::single("n1"), row("n1", 0)),
            ])
            .await
            .unwrap_err();

        assert!(err.is_uniqueness_violation());
        assert_eq!(store.row_count("Primary"), 0);
        assert_eq!(store.row_count("Index"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_within_one_set() {
        let store = MemoryStore::new();
        let key = StorageKey::single("dup");
        let err = store
            .apply(vec![
                Mutation::insert("T", key.clone(), row("dup", 0)),
                Mutation::insert("T", key, row("dup", 1)),
            ])
            .await
            .unwrap_err();
        assert!(err.is_uniqueness_violation());
        assert_eq!(store.row_count("T"), 0);
    }

    #[tokio::test]
    async fn test_update_requires_existing_row() {
        let store = MemoryStore::new();
        let err = store
            .apply(vec![Mutation::update("T", StorageKey::single("x"), row("x", 0))])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_commit_timestamps_increase() {
        let store = MemoryStore::new();
        let mut last = None;
        for i in 0..50 {
            let ts = store
                .apply(vec![Mutation::insert(
                    "T",
                    StorageKey::single(format!("k{i}")),
                    row("x", i),
                )])
                .await
                .unwrap();
            if let Some(prev) = last {
                assert!(ts > prev);
            }
            last = Some(ts);
        }
    }

    #[tokio::test]
    async fn test_ascending_scan_is_lazy() {
        let store = MemoryStore::new();
        let mutations = (0..20)
            .map(|i| Mutation::insert("T", StorageKey::single(format!("k{i:02}")), row("x", 20 - i)))
            .collect();
        store.apply(mutations).await.unwrap();

        let order = OrderIndex::ascending("TWeightAsc", "weight");
        let stream = store.scan("T", &order).await.unwrap();
        let first: Vec<Row> = stream.take(5).try_collect().await.unwrap();

        let weights: Vec<i64> = first.iter().map(|r| r.int("weight").unwrap()).collect();
        assert_eq!(weights, vec![1, 2, 3, 4, 5]);
        assert_eq!(store.rows_streamed(), 5);
        assert_eq!(store.rows_fetched(), 20);
    }

    #[tokio::test]
    async fn test_scan_fetches_one_page_at_a_time() {
        let store = MemoryStore::new();
        let mutations = (0..200)
            .map(|i| Mutation::insert("T", StorageKey::single(format!("k{i:03}")), row("x", (i * 7) % 200)))
            .collect();
        store.apply(mutations).await.unwrap();

        let order = OrderIndex::ascending("TWeightAsc", "weight");
        let first: Vec<Row> = store
            .scan("T", &order)
            .await
            .unwrap()
            .take(40)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first.len(), 40);
        assert_eq!(store.rows_fetched(), 2 * SCAN_PAGE_SIZE as u64);

        let all: Vec<Row> = store.scan("T", &order).await.unwrap().try_collect().await.unwrap();
        assert_eq!(all.len(), 200);
        let weights: Vec<i64> = all.iter().map(|r| r.int("weight").unwrap()).collect();
        assert!(weights.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_column_index_follows_updates() {
        let store = MemoryStore::new();
        let order = OrderIndex::ascending("TWeightAsc", "weight");
        store
            .apply(vec![
                Mutation::insert("T", StorageKey::single("a"), row("a", 1)),
                Mutation::insert("T", StorageKey::single("b"), row("b", 2)),
            ])
            .await
            .unwrap();
        let _: Vec<Row> = store.scan("T", &order).await.unwrap().try_collect().await.unwrap();

        store
            .apply(vec![
                Mutation::update("T", StorageKey::single("a"), Row::new().with("weight", 9_i64)),
                Mutation::insert("T", StorageKey::single("c"), row("c", 0)),
            ])
            .await
            .unwrap();

        let ids: Vec<String> = store
            .scan("T", &order)
            .await
            .unwrap()
            .map(|r| r.unwrap().string("id").unwrap().to_string())
            .collect()
            .await;
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_project_restricts_columns() {
        let store = MemoryStore::new();
        let mutations = (0..15)
            .map(|i| Mutation::insert("T", StorageKey::single(format!("k{i:02}")), row("x", i)))
            .collect();
        store.apply(mutations).await.unwrap();

        let rows = store.project("T", &["id"], 10).await.unwrap();
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r.len() == 1 && r.contains("id")));
    }

    #[tokio::test]
    async fn test_read_modify_write() {
        let store = MemoryStore::new();
        let key = StorageKey::single("c");
        store
            .apply(vec![
                Mutation::insert("T", key.clone(), row("c", 0)),
                Mutation::insert("Fence", key.clone(), row("c", 0)),
            ])
            .await
            .unwrap();

        let update = CounterUpdate::new("T", key.clone(), "count")
            .with_fence(ReadFence::new("Fence", key.clone()))
            .with_set(Row::new().with("committed_at", Value::CommitTimestamp));
        let first = store.read_modify_write(update.clone()).await.unwrap();
        let second = store.read_modify_write(update).await.unwrap();

        assert_eq!(first.value, 1);
        assert_eq!(second.value, 2);
        let read = store.read_row("T", &key).await.unwrap();
        assert_eq!(read.int("count").unwrap(), 2);
        assert_eq!(read.opt_timestamp("committed_at").unwrap(), Some(second.committed_at));
    }

    #[tokio::test]
    async fn test_read_modify_write_missing_fence() {
        let store = MemoryStore::new();
        let key = StorageKey::single("c");
        store
            .apply(vec![Mutation::insert("T", key.clone(), row("c", 0))])
            .await
            .unwrap();

        let update = CounterUpdate::new("T", key.clone(), "count")
            .with_fence(ReadFence::new("Fence", key.clone()));
        assert!(store.read_modify_write(update).await.unwrap_err().is_not_found());
        assert_eq!(store.read_row("T", &key).await.unwrap().int("count").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_distribution_counts_writes() {
        let store = MemoryStore::with_key_ranges(KeyRanges::uniform_hex(2));
        store
            .apply(vec![
                Mutation::insert("T", StorageKey::single("0aaa"), row("x", 0)),
                Mutation::insert("T", StorageKey::single("0bbb"), row("x", 0)),
                Mutation::insert("T", StorageKey::single("f000"), row("x", 0)),
            ])
            .await
            .unwrap();

        let histogram = store.write_distribution("T").unwrap();
        assert_eq!(histogram.counts(), &[2, 1]);
        assert!(store.write_distribution("Other").is_none());
        assert_eq!(store.tables(), vec!["T".to_string()]);
    }
}
