//! SurrealDB v2 [`StoreClient`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use keyspread_core::{Row, StorageKey};
use keyspread_store::{
    CounterOutcome, CounterUpdate, Mutation, OrderIndex, RowStream, StoreClient, StoreError,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::VecDeque;
use surrealdb::engine::any::Any;
use surrealdb::{Response, Surreal};
use tracing::debug;

use crate::config::SurrealConfig;
use crate::document::{ident, row_from_document, KEY_FIELD};
use crate::statements::{classify, is_conflict, thing, Transaction};

/// SurrealDB v2 SDK implementation of the store contract.
#[derive(Clone)]
pub struct Surreal2Store {
    client: Surreal<Any>,
    page_size: usize,
}

#[derive(Deserialize)]
struct CounterResult {
    value: i64,
    committed_at: String,
}

fn transport(operation: &'static str) -> impl Fn(surrealdb::Error) -> StoreError {
    move |e| StoreError::transport(operation, e.to_string())
}

/// Like [`transport`], but keeps transaction conflicts distinct.
fn request_error(operation: &'static str) -> impl Fn(surrealdb::Error) -> StoreError {
    move |e| {
        let message = e.to_string();
        if is_conflict(&message) {
            StoreError::conflict(operation, message)
        } else {
            StoreError::transport(operation, message)
        }
    }
}

fn parse_commit_timestamp(operation: &'static str, raw: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::transport(operation, format!("bad commit timestamp '{raw}': {e}")))
}

/// Value of the last statement that produced one.
///
/// Depending on server version, statements before a transaction's RETURN may
/// or may not report their own (empty) results.
fn take_last<T: DeserializeOwned>(
    response: &mut Response,
    operation: &'static str,
) -> Result<T, StoreError> {
    for index in (0..response.num_statements()).rev() {
        if let Ok(Some(value)) = response.take::<Option<T>>(index) {
            return Ok(value);
        }
    }
    Err(StoreError::transport(operation, "transaction returned no result"))
}

fn rows_from_documents(documents: Vec<serde_json::Value>) -> Result<Vec<Row>, StoreError> {
    documents
        .into_iter()
        .map(|d| row_from_document(d).map_err(StoreError::from))
        .collect()
}

impl Surreal2Store {
    pub fn new(client: Surreal<Any>, page_size: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    /// Connect, sign in (remote endpoints only) and select namespace and database.
    pub async fn connect(config: &SurrealConfig) -> Result<Self, StoreError> {
        let client = surrealdb::engine::any::connect(config.endpoint.as_str())
            .await
            .map_err(|e| {
                StoreError::transport(
                    "connect",
                    format!("SurrealDB connection to '{}' failed: {e}", config.endpoint),
                )
            })?;

        if !config.is_embedded() {
            client
                .signin(surrealdb::opt::auth::Root {
                    username: &config.username,
                    password: &config.password,
                })
                .await
                .map_err(|e| {
                    StoreError::transport(
                        "connect",
                        format!("SurrealDB authentication failed (user: '{}'): {e}", config.username),
                    )
                })?;
        }

        client
            .use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await
            .map_err(|e| {
                StoreError::transport(
                    "connect",
                    format!(
                        "SurrealDB failed to select namespace '{}' / database '{}': {e}",
                        config.namespace, config.database
                    ),
                )
            })?;

        debug!("Connected to SurrealDB at {}", config.endpoint);
        Ok(Self::new(client, config.page_size))
    }

    /// Fresh embedded in-memory database.
    pub async fn connect_embedded() -> Result<Self, StoreError> {
        Self::connect(&SurrealConfig::default()).await
    }

    pub fn client(&self) -> &Surreal<Any> {
        &self.client
    }

    async fn run(&self, operation: &'static str, tx: Transaction, returning: &str) -> Result<Response, StoreError> {
        let (query, guards) = tx.commit(returning).into_query(&self.client);
        let mut response = query.await.map_err(request_error(operation))?;
        let errors = response.take_errors();
        if !errors.is_empty() {
            return Err(classify(operation, errors, &guards));
        }
        Ok(response)
    }

    /// Explain a write set that lost a transaction race.
    ///
    /// Reads each inserted key once. If a concurrent transaction committed
    /// one of them, the insert is a uniqueness violation; otherwise the
    /// conflict is returned as is.
    async fn diagnose_conflict(&self, conflict: StoreError, mutations: &[Mutation]) -> StoreError {
        for mutation in mutations {
            let Mutation::Insert { table, key, .. } = mutation else {
                continue;
            };
            match self.read_row(table, key).await {
                Ok(_) => {
                    debug!("Conflict on {table}/{key} resolved as an existing row");
                    return StoreError::uniqueness_violation(table, key);
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => {
                    debug!("Conflict diagnosis read of {table}/{key} failed: {e}");
                    break;
                }
            }
        }
        conflict
    }

    /// Number of rows in a table.
    pub async fn count(&self, table: &str) -> Result<usize, StoreError> {
        let mut response = self
            .client
            .query("SELECT count() FROM type::table($tb) GROUP ALL")
            .bind(("tb", table.to_string()))
            .await
            .map_err(transport("count"))?;
        let count: Option<i64> = response.take((0, "count")).map_err(transport("count"))?;
        Ok(count.unwrap_or(0).max(0) as usize)
    }
}

fn order_clause(order: &OrderIndex) -> Result<String, StoreError> {
    Ok(match order {
        OrderIndex::PrimaryKey => format!("{KEY_FIELD} ASC"),
        OrderIndex::Ascending { column, .. } => format!("{} ASC, {KEY_FIELD} ASC", ident(column)?),
    })
}

struct ScanState {
    client: Surreal<Any>,
    sql: String,
    table: String,
    start: usize,
    page_size: usize,
    buffer: VecDeque<Row>,
    exhausted: bool,
}

impl ScanState {
    async fn fetch_page(&mut self) -> Result<(), StoreError> {
        let mut response = self
            .client
            .query(self.sql.as_str())
            .bind(("tb", self.table.clone()))
            .bind(("limit", self.page_size as i64))
            .bind(("start", self.start as i64))
            .await
            .map_err(transport("scan"))?;
        let documents: Vec<serde_json::Value> = response.take(0).map_err(transport("scan"))?;
        let rows = rows_from_documents(documents)?;
        self.exhausted = rows.len() < self.page_size;
        self.start += rows.len();
        self.buffer.extend(rows);
        Ok(())
    }
}

#[async_trait]
impl StoreClient for Surreal2Store {
    async fn apply(&self, mutations: Vec<Mutation>) -> Result<DateTime<Utc>, StoreError> {
        let mut tx = Transaction::begin();
        for mutation in &mutations {
            tx.mutation(mutation)?;
        }
        let mut response = match self.run("apply", tx, "$committed").await {
            Err(e) if e.is_conflict() => return Err(self.diagnose_conflict(e, &mutations).await),
            result => result?,
        };
        let raw: String = take_last(&mut response, "apply")?;
        debug!("Committed {} mutations at {}", mutations.len(), raw);
        parse_commit_timestamp("apply", &raw)
    }

    async fn read_row(&self, table: &str, key: &StorageKey) -> Result<Row, StoreError> {
        let mut response = self
            .client
            .query("SELECT * OMIT id FROM $record_id")
            .bind(("record_id", thing(table, key)))
            .await
            .map_err(transport("read_row"))?;
        let documents: Vec<serde_json::Value> = response.take(0).map_err(transport("read_row"))?;
        match documents.into_iter().next() {
            Some(document) => Ok(row_from_document(document)?),
            None => Err(StoreError::not_found(table, key)),
        }
    }

    async fn scan(&self, table: &str, order: &OrderIndex) -> Result<RowStream, StoreError> {
        let sql = format!(
            "SELECT * OMIT id FROM type::table($tb) ORDER BY {} LIMIT $limit START $start",
            order_clause(order)?
        );
        let state = ScanState {
            client: self.client.clone(),
            sql,
            table: table.to_string(),
            start: 0,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            exhausted: false,
        };
        let stream = stream::try_unfold(state, |mut state| async move {
            loop {
                if let Some(row) = state.buffer.pop_front() {
                    return Ok(Some((row, state)));
                }
                if state.exhausted {
                    return Ok(None);
                }
                if let Err(e) = state.fetch_page().await {
                    return Err(e);
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn project(
        &self,
        table: &str,
        columns: &[&str],
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let fields = columns
            .iter()
            .map(|c| ident(c))
            .collect::<Result<Vec<_>, _>>()?
            .join(", ");
        let sql = format!(
            "SELECT {fields}, {KEY_FIELD} FROM type::table($tb) ORDER BY {KEY_FIELD} ASC LIMIT $limit"
        );
        let mut response = self
            .client
            .query(sql)
            .bind(("tb", table.to_string()))
            .bind(("limit", limit as i64))
            .await
            .map_err(transport("project"))?;
        let documents: Vec<serde_json::Value> = response.take(0).map_err(transport("project"))?;
        rows_from_documents(documents)
    }

    async fn read_modify_write(&self, update: CounterUpdate) -> Result<CounterOutcome, StoreError> {
        let mut tx = Transaction::begin();
        for fence in &update.fences {
            tx.require(&fence.table, &fence.key);
        }
        tx.increment(&update.table, &update.key, &update.counter_column, &update.set)?;
        for mutation in &update.append {
            tx.mutation(mutation)?;
        }
        let mut response = self
            .run(
                "read_modify_write",
                tx,
                "{ value: $next, committed_at: $committed }",
            )
            .await?;
        let result: CounterResult = take_last(&mut response, "read_modify_write")?;
        Ok(CounterOutcome {
            value: result.value,
            committed_at: parse_commit_timestamp("read_modify_write", &result.committed_at)?,
        })
    }
}
