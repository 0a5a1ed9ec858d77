//! SurrealQL transaction builder.
//!
//! Record ids and contents are always bound as parameters. The only text
//! spliced into statements is column names, which pass through
//! [`crate::document::ident`] first.

use keyspread_core::{EncodingError, Row, StorageKey};
use keyspread_store::{Mutation, StoreError};
use std::collections::HashMap;
use std::fmt::Write;
use surrealdb::engine::any::Any;
use surrealdb::method::Query;
use surrealdb::sql::{Id, Thing};
use surrealdb::Surreal;

use crate::document::{content, ident, placeholder_columns, KEY_FIELD};

const NOT_FOUND_MARKER: &str = "keyspread:not_found:";
const EXISTS_MARKER: &str = "keyspread:exists:";

pub(crate) fn thing(table: &str, key: &StorageKey) -> Thing {
    Thing::from((table, Id::String(key.encoded())))
}

enum Param {
    Record(Thing),
    Content(serde_json::Value),
}

/// One SurrealQL transaction under construction.
pub(crate) struct Transaction {
    sql: String,
    params: Vec<(String, Param)>,
    /// Rows referenced by THROW markers, by marker number.
    guards: Vec<(String, StorageKey)>,
}

impl Transaction {
    pub(crate) fn begin() -> Self {
        Self {
            sql: "BEGIN TRANSACTION;\nLET $committed = <string> time::now();\n".to_string(),
            params: Vec::new(),
            guards: Vec::new(),
        }
    }

    fn bind_record(&mut self, table: &str, key: &StorageKey) -> String {
        let name = format!("r{}", self.params.len());
        self.params.push((name.clone(), Param::Record(thing(table, key))));
        name
    }

    fn bind_content(&mut self, value: serde_json::Value) -> String {
        let name = format!("c{}", self.params.len());
        self.params.push((name.clone(), Param::Content(value)));
        name
    }

    fn guard(&mut self, table: &str, key: &StorageKey) -> usize {
        self.guards.push((table.to_string(), key.clone()));
        self.guards.len() - 1
    }

    fn line(&mut self, statement: std::fmt::Arguments<'_>) {
        // Writing to a String cannot fail.
        let _ = self.sql.write_fmt(statement);
        self.sql.push_str(";\n");
    }

    /// Abort with not found unless the row exists.
    pub(crate) fn require(&mut self, table: &str, key: &StorageKey) -> String {
        let record = self.bind_record(table, key);
        let guard = self.guard(table, key);
        self.line(format_args!(
            "IF array::len((SELECT {KEY_FIELD} FROM ${record})) = 0 {{ THROW \"{NOT_FOUND_MARKER}{guard}\" }}"
        ));
        record
    }

    fn require_absent(&mut self, table: &str, key: &StorageKey) -> String {
        let record = self.bind_record(table, key);
        let guard = self.guard(table, key);
        self.line(format_args!(
            "IF array::len((SELECT {KEY_FIELD} FROM ${record})) > 0 {{ THROW \"{EXISTS_MARKER}{guard}\" }}"
        ));
        record
    }

    fn stamp(&mut self, record: &str, row: &Row) -> Result<(), EncodingError> {
        let columns = placeholder_columns(row);
        if columns.is_empty() {
            return Ok(());
        }
        let assignments = columns
            .iter()
            .map(|c| Ok(format!("{} = $committed", ident(c)?)))
            .collect::<Result<Vec<_>, EncodingError>>()?
            .join(", ");
        self.line(format_args!("UPDATE ${record} SET {assignments} RETURN NONE"));
        Ok(())
    }

    pub(crate) fn create(&mut self, table: &str, key: &StorageKey, row: &Row) -> Result<(), EncodingError> {
        let record = self.require_absent(table, key);
        let body = self.bind_content(content(key, row));
        self.line(format_args!("CREATE ${record} CONTENT ${body} RETURN NONE"));
        self.stamp(&record, row)
    }

    pub(crate) fn merge(&mut self, table: &str, key: &StorageKey, row: &Row) -> Result<(), EncodingError> {
        let record = self.require(table, key);
        let body = self.bind_content(content(key, row));
        self.line(format_args!("UPDATE ${record} MERGE ${body} RETURN NONE"));
        self.stamp(&record, row)
    }

    pub(crate) fn mutation(&mut self, mutation: &Mutation) -> Result<(), EncodingError> {
        match mutation {
            Mutation::Insert { table, key, row } => self.create(table, key, row),
            Mutation::Update { table, key, row } => self.merge(table, key, row),
        }
    }

    /// Increment `counter` of an existing row into `$next`.
    pub(crate) fn increment(
        &mut self,
        table: &str,
        key: &StorageKey,
        counter: &str,
        set: &Row,
    ) -> Result<(), EncodingError> {
        let counter = ident(counter)?;
        let record = self.bind_record(table, key);
        let guard = self.guard(table, key);
        self.line(format_args!(
            "LET $current = (SELECT VALUE {counter} FROM ${record})[0]"
        ));
        self.line(format_args!(
            "IF $current = NONE {{ THROW \"{NOT_FOUND_MARKER}{guard}\" }}"
        ));
        self.line(format_args!("LET $next = $current + 1"));
        let body = self.bind_content(content(key, set));
        self.line(format_args!("UPDATE ${record} MERGE ${body} RETURN NONE"));
        self.line(format_args!("UPDATE ${record} SET {counter} = $next RETURN NONE"));
        self.stamp(&record, set)
    }

    pub(crate) fn commit(mut self, returning: &str) -> CommittedTransaction {
        self.line(format_args!("RETURN {returning}"));
        self.sql.push_str("COMMIT TRANSACTION;\n");
        CommittedTransaction {
            sql: self.sql,
            params: self.params,
            guards: self.guards,
        }
    }
}

/// A finished transaction, ready to send.
pub(crate) struct CommittedTransaction {
    sql: String,
    params: Vec<(String, Param)>,
    guards: Vec<(String, StorageKey)>,
}

impl CommittedTransaction {
    #[cfg(test)]
    pub(crate) fn sql(&self) -> &str {
        &self.sql
    }

    pub(crate) fn into_query(self, client: &Surreal<Any>) -> (Query<'_, Any>, Vec<(String, StorageKey)>) {
        let mut query = client.query(self.sql);
        for (name, param) in self.params {
            query = match param {
                Param::Record(thing) => query.bind((name, thing)),
                Param::Content(value) => query.bind((name, value)),
            };
        }
        (query, self.guards)
    }
}

/// Whether a statement error reports a transaction that lost a race with a
/// concurrent one.
pub(crate) fn is_conflict(message: &str) -> bool {
    message.to_ascii_lowercase().contains("conflict")
}

/// Row named by a THROW marker in an error message.
fn guarded<'g>(
    message: &str,
    marker: &str,
    guards: &'g [(String, StorageKey)],
) -> Option<&'g (String, StorageKey)> {
    let rest = &message[message.find(marker)? + marker.len()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    guards.get(digits.parse::<usize>().ok()?)
}

/// Map the statement errors of a failed transaction to one store error.
pub(crate) fn classify(
    operation: &'static str,
    errors: HashMap<usize, surrealdb::Error>,
    guards: &[(String, StorageKey)],
) -> StoreError {
    let mut errors: Vec<(usize, String)> = errors
        .into_iter()
        .map(|(index, e)| (index, e.to_string()))
        .collect();
    errors.sort_by_key(|(index, _)| *index);

    for (_, message) in &errors {
        if let Some((table, key)) = guarded(message, NOT_FOUND_MARKER, guards) {
            return StoreError::not_found(table, key);
        }
        if let Some((table, key)) = guarded(message, EXISTS_MARKER, guards) {
            return StoreError::uniqueness_violation(table, key);
        }
    }
    // A concurrent transaction created the row between our check and our write.
    if let Some((_, message)) = errors.iter().find(|(_, m)| m.contains("already exists")) {
        return StoreError::uniqueness_violation("unknown", message);
    }
    if let Some((_, message)) = errors.iter().find(|(_, m)| is_conflict(m)) {
        return StoreError::conflict(operation, message.clone());
    }
    let message = errors
        .iter()
        .find(|(_, m)| !m.contains("not executed"))
        .or_else(|| errors.first())
        .map(|(_, m)| m.clone())
        .unwrap_or_else(|| "unknown failure".to_string());
    StoreError::transport(operation, message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspread_core::Value;

    #[test]
    fn test_insert_transaction_text() {
        let mut tx = Transaction::begin();
        let row = Row::new()
            .with("id", "r-1")
            .with("committed_at", Value::CommitTimestamp);
        tx.create("Record", &StorageKey::single("r-1"), &row).unwrap();
        let tx = tx.commit("$committed");

        let sql = tx.sql();
        assert!(sql.starts_with("BEGIN TRANSACTION;"));
        assert!(sql.contains("THROW \"keyspread:exists:0\""));
        assert!(sql.contains("CREATE $r0 CONTENT $c1 RETURN NONE;"));
        assert!(sql.contains("UPDATE $r0 SET `committed_at` = $committed RETURN NONE;"));
        assert!(sql.trim_end().ends_with("RETURN $committed;\nCOMMIT TRANSACTION;"));
    }

    #[test]
    fn test_counter_transaction_text() {
        let mut tx = Transaction::begin();
        tx.require("RecordMirror2", &StorageKey::single("u-1"));
        tx.increment("Record", &StorageKey::single("u-1"), "count", &Row::new())
            .unwrap();
        let sql = tx.commit("$next").sql().to_string();

        assert!(sql.contains("THROW \"keyspread:not_found:0\""));
        assert!(sql.contains("LET $current = (SELECT VALUE `count` FROM $r1)[0];"));
        assert!(sql.contains("THROW \"keyspread:not_found:1\""));
        assert!(sql.contains("UPDATE $r1 SET `count` = $next RETURN NONE;"));
    }

    fn statement_errors(messages: &[&str]) -> HashMap<usize, surrealdb::Error> {
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| (i, surrealdb::Error::Api(surrealdb::error::Api::Query(m.to_string()))))
            .collect()
    }

    #[test]
    fn test_classify_markers_and_conflicts() {
        let guards = vec![
            ("Fence".to_string(), StorageKey::single("u-1")),
            ("Record".to_string(), StorageKey::single("u-1")),
        ];

        let err = classify("apply", statement_errors(&["An error occurred: keyspread:exists:1"]), &guards);
        assert!(err.is_uniqueness_violation(), "{err}");

        let err = classify("apply", statement_errors(&["An error occurred: keyspread:not_found:0"]), &guards);
        assert!(matches!(err, StoreError::NotFound { ref table, .. } if table == "Fence"));

        let conflict = "Failed to commit transaction due to a read or write conflict. This transaction can be retried";
        let err = classify("read_modify_write", statement_errors(&[conflict, conflict]), &guards);
        assert!(err.is_conflict(), "{err}");

        let err = classify("apply", statement_errors(&["connection reset"]), &guards);
        assert_eq!(err.kind(), keyspread_store::ErrorKind::Transport);
    }

    #[test]
    fn test_bad_column_rejected() {
        let mut tx = Transaction::begin();
        let err = tx
            .increment("Record", &StorageKey::single("x"), "count = 0; --", &Row::new())
            .unwrap_err();
        assert!(matches!(err, EncodingError::InvalidField { field: "column", .. }));
    }
}
