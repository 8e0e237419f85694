//! Core data types shared by the upsert, search, and maintenance paths.
//!
//! Records are schemaless JSON objects. Two field names carry meaning: the
//! SKU field (unique per collection) and the concatenation field (search-only,
//! never returned to callers). Both names come from [`Config`](crate::config::Config).

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Name of the identifier field merged into every record read back.
pub const ID_FIELD: &str = "_id";

/// A schemaless record: field name to heterogeneous value.
pub type Record = Map<String, Value>;

/// A `(database, collection)` pair bounding uniqueness and queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub database: String,
    pub collection: String,
}

impl Scope {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Replace every empty-string value with null. Returns the number of
/// fields changed.
pub fn normalize_empty_strings(record: &mut Record) -> usize {
    let mut changed = 0;
    for value in record.values_mut() {
        if matches!(value, Value::String(s) if s.is_empty()) {
            *value = Value::Null;
            changed += 1;
        }
    }
    changed
}

/// Non-empty string value of `field`, if any.
pub fn string_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    match record.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.as_str()),
        _ => None,
    }
}

/// Case-insensitive substring test with Unicode lowercase folding.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// One entry of the append-only search history.
#[derive(Debug, Clone, Serialize)]
pub struct SearchQueryLogEntry {
    #[serde(rename = "Database")]
    pub database: String,
    #[serde(rename = "Query")]
    pub query: String,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

impl SearchQueryLogEntry {
    pub fn now(database: &str, query: &str) -> Self {
        Self {
            database: database.to_string(),
            query: query.to_string(),
            time: Utc::now(),
        }
    }

    /// Stored shape: `Time` is an RFC 3339 UTC string.
    pub fn to_record(&self) -> Result<Record> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(StoreError::NotAnObject),
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone, Serialize)]
pub struct UpsertOutcome {
    /// Identifier assigned to the stored record.
    pub id: String,
    /// SKU the record ended up with, if one was assigned.
    pub sku: Option<String>,
    /// The insert created the collection.
    pub created_collection: bool,
    /// The caller-supplied SKU was already in use when checked.
    pub duplicate_sku: bool,
}

/// Summary of a duplicate-pruning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    /// Distinct values of the grouping field that occurred more than once.
    pub groups: usize,
    /// Total rows belonging to those groups.
    pub duplicate_rows: usize,
    /// Rows removed.
    pub deleted: usize,
}

/// A ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub score: usize,
    pub record: Record,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_normalize_empty_strings() {
        let mut r = record(json!({"Name": "", "Brand": "Acme", "Price": 0, "Notes": " "}));
        assert_eq!(normalize_empty_strings(&mut r), 1);
        assert_eq!(r["Name"], Value::Null);
        assert_eq!(r["Brand"], json!("Acme"));
        assert_eq!(r["Notes"], json!(" "));
        assert_eq!(normalize_empty_strings(&mut r), 0);
    }

    #[test]
    fn test_string_field_skips_empty_and_non_strings() {
        let r = record(json!({"SKU": "", "A": 3, "B": "x"}));
        assert_eq!(string_field(&r, "SKU"), None);
        assert_eq!(string_field(&r, "A"), None);
        assert_eq!(string_field(&r, "B"), Some("x"));
        assert_eq!(string_field(&r, "missing"), None);
    }

    #[test]
    fn test_contains_ignore_case_folds_unicode() {
        assert!(contains_ignore_case("ÉCRAN Portable", "écran"));
        assert!(!contains_ignore_case("clavier", "écran"));
        assert!(contains_ignore_case("anything", ""));
    }

    #[test]
    fn test_log_entry_record_shape() {
        let entry = SearchQueryLogEntry::now("laptops", "thinkpad 16gb");
        let r = entry.to_record().unwrap();
        assert_eq!(r["Database"], json!("laptops"));
        assert_eq!(r["Query"], json!("thinkpad 16gb"));
        assert!(r["Time"].as_str().unwrap().contains('T'));
        assert_eq!(r.len(), 3);
    }
}
