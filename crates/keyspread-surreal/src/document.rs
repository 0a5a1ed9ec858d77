//! Row to document conversion.
//!
//! SurrealDB reserves the `id` field for the record id, so the `id` column is
//! stored as `_id`. The encoded storage key is kept in `_key` for ordering.

use keyspread_core::{EncodingError, Row, StorageKey};
use serde_json::{Map, Value as Json};

pub(crate) const KEY_FIELD: &str = "_key";
const ID_COLUMN: &str = "id";
const ID_FIELD: &str = "_id";

pub(crate) fn field_name(column: &str) -> &str {
    if column == ID_COLUMN {
        ID_FIELD
    } else {
        column
    }
}

/// Backtick-quoted field name for use in SurrealQL text.
pub(crate) fn ident(column: &str) -> Result<String, EncodingError> {
    let field = field_name(column);
    if field.is_empty() || !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(EncodingError::invalid(
            "column",
            format!("'{column}' is not a plain identifier"),
        ));
    }
    Ok(format!("`{field}`"))
}

/// Document content for a row. Commit timestamp placeholders are left out;
/// the statement builder sets them from the transaction's commit time.
pub(crate) fn content(key: &StorageKey, row: &Row) -> Json {
    let mut map = Map::new();
    for (column, value) in row.iter() {
        if value.is_commit_timestamp() {
            continue;
        }
        map.insert(field_name(column).to_string(), value.to_json());
    }
    map.insert(KEY_FIELD.to_string(), Json::String(key.encoded()));
    Json::Object(map)
}

pub(crate) fn placeholder_columns(row: &Row) -> Vec<&str> {
    row.iter()
        .filter(|(_, v)| v.is_commit_timestamp())
        .map(|(c, _)| c)
        .collect()
}

pub(crate) fn row_from_document(document: Json) -> Result<Row, EncodingError> {
    let Json::Object(mut map) = document else {
        return Err(EncodingError::TypeMismatch {
            column: "<document>".to_string(),
            expected: "object",
            actual: "non-object",
        });
    };
    map.remove(KEY_FIELD);
    map.remove(ID_COLUMN);
    if let Some(id) = map.remove(ID_FIELD) {
        map.insert(ID_COLUMN.to_string(), id);
    }
    Row::from_json(Json::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyspread_core::Value;

    #[test]
    fn test_content_renames_id_and_skips_placeholders() {
        let row = Row::new()
            .with("id", "r-1")
            .with("count", 2_i64)
            .with("committed_at", Value::CommitTimestamp);
        let doc = content(&StorageKey::composite(["gold", "r-1"]), &row);

        assert_eq!(doc["_id"], "r-1");
        assert_eq!(doc["_key"], "gold/r-1");
        assert!(doc.get("id").is_none());
        assert!(doc.get("committed_at").is_none());
        assert_eq!(placeholder_columns(&row), vec!["committed_at"]);

        let back = row_from_document(doc).unwrap();
        assert_eq!(back.string("id").unwrap(), "r-1");
        assert!(!back.contains("_key"));
    }

    #[test]
    fn test_ident_rejects_non_identifiers() {
        assert_eq!(ident("sort_weight").unwrap(), "`sort_weight`");
        assert_eq!(ident("id").unwrap(), "`_id`");
        assert!(ident("a`; DELETE x").is_err());
    }
}
