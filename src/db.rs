//! Database sessions and collection primitives.
//!
//! Each database is a SQLite file `<db.root>/<database>.sqlite`; each
//! collection is a table holding one JSON object per row:
//!
//! ```text
//! CREATE TABLE "<collection>" (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)
//! ```
//!
//! A [`Session`] is opened per public operation and closed before the
//! operation returns. Everything above this module talks in [`Record`]s and
//! [`Filter`]s and never writes SQL.
//!
//! SQLite's `lower()` only folds ASCII, so [`Filter::Contains`] is sent to
//! the backend as a presence check and the substring test itself runs on the
//! decoded records.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::time::Duration;

use crate::config::Config;
use crate::error::{Result, StoreError};
use crate::models::{contains_ignore_case, Record, ID_FIELD};

const MAX_NAME_LEN: usize = 64;

/// An open handle on one database, released by [`Session::close`].
pub struct Session {
    pool: SqlitePool,
    database: String,
}

impl Session {
    /// Open `database` under the configured root, creating the file if
    /// needed, then ping it.
    ///
    /// A failed ping is logged and the session is still returned; callers
    /// see the problem on their next query.
    pub async fn open(config: &Config, database: &str) -> Result<Session> {
        validate_name("database", database)?;

        std::fs::create_dir_all(&config.db.root)?;
        let db_path = config.db.root.join(format!("{}.sqlite", database));

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(config.db.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|source| StoreError::ConnectionFailure {
                database: database.to_string(),
                source,
            })?;

        let session = Session {
            pool,
            database: database.to_string(),
        };

        if session.ping().await {
            tracing::debug!(database, path = %db_path.display(), "pinged database");
        }

        Ok(session)
    }

    pub async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(database = %self.database, error = %e, "unable to reach database");
                false
            }
        }
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    pub async fn collection_exists(&self, collection: &str) -> Result<bool> {
        validate_name("collection", collection)?;
        let exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name = ?",
        )
        .bind(collection)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Create the collection table if missing. With `unique_field`, a partial
    /// unique index over that field's non-null values is created alongside.
    pub async fn create_collection(&self, collection: &str, unique_field: Option<&str>) -> Result<()> {
        let table = quote_collection(collection)?;
        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (_id TEXT PRIMARY KEY, doc TEXT NOT NULL)",
            table
        ))
        .execute(&self.pool)
        .await?;

        if let Some(field) = unique_field {
            let path = json_path_expr(field)?;
            sqlx::query(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({}) WHERE {} IS NOT NULL",
                index_name("ux", collection, field),
                table,
                path,
                path
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Case-insensitive ascending index over one field.
    pub async fn create_nocase_index(&self, collection: &str, field: &str) -> Result<()> {
        let table = quote_collection(collection)?;
        let path = json_path_expr(field)?;
        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({} COLLATE NOCASE ASC)",
            index_name("ix", collection, field),
            table,
            path
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Insert a record, returning its identifier. A string `_id` already on
    /// the record is kept; otherwise a fresh UUID is assigned.
    pub async fn insert_one(&self, collection: &str, record: &Record) -> Result<String> {
        let table = quote_collection(collection)?;
        let mut body = record.clone();
        let id = match body.remove(ID_FIELD) {
            Some(serde_json::Value::String(id)) if !id.is_empty() => id,
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let doc = serde_json::to_string(&body)?;

        sqlx::query(&format!("INSERT INTO {} (_id, doc) VALUES (?, ?)", table))
            .bind(&id)
            .bind(&doc)
            .execute(&self.pool)
            .await?;

        Ok(id)
    }

    /// All matching records in natural (insertion) order.
    pub async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Record>> {
        self.select(collection, filter, None).await
    }

    pub async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Record>> {
        Ok(self.select(collection, filter, Some(1)).await?.into_iter().next())
    }

    pub async fn exists(&self, collection: &str, filter: &Filter) -> Result<bool> {
        if filter.needs_record_check() {
            return Ok(!self.select(collection, filter, Some(1)).await?.is_empty());
        }
        let table = quote_collection(collection)?;
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT EXISTS(SELECT 1 FROM {} WHERE ", table));
        push_filter(&mut qb, filter)?;
        qb.push(")");
        let exists = qb.build_query_scalar::<bool>().fetch_one(&self.pool).await?;
        Ok(exists)
    }

    pub async fn count(&self, collection: &str) -> Result<i64> {
        let table = quote_collection(collection)?;
        let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// Set a single field on the record with identifier `id`.
    pub async fn set_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        value: &serde_json::Value,
    ) -> Result<bool> {
        let table = quote_collection(collection)?;
        let path = json_path_literal(field)?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET doc = json_set(doc, {}, json(?)) WHERE _id = ?",
            table, path
        ))
        .bind(serde_json::to_string(value)?)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Overwrite the stored body of record `id` with `record` (minus `_id`).
    pub async fn replace_one(&self, collection: &str, id: &str, record: &Record) -> Result<bool> {
        let table = quote_collection(collection)?;
        let mut body = record.clone();
        body.remove(ID_FIELD);
        let result = sqlx::query(&format!("UPDATE {} SET doc = ? WHERE _id = ?", table))
            .bind(serde_json::to_string(&body)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_one(&self, collection: &str, id: &str) -> Result<bool> {
        let table = quote_collection(collection)?;
        let result = sqlx::query(&format!("DELETE FROM {} WHERE _id = ?", table))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn select(&self, collection: &str, filter: &Filter, limit: Option<i64>) -> Result<Vec<Record>> {
        let table = quote_collection(collection)?;
        let record_check = filter.needs_record_check();
        let mut qb = QueryBuilder::<Sqlite>::new(format!("SELECT _id, doc FROM {} WHERE ", table));
        push_filter(&mut qb, filter)?;
        qb.push(" ORDER BY rowid");
        if let (Some(limit), false) = (limit, record_check) {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("_id");
            let doc: String = row.get("doc");
            let record = decode_record(id, &doc)?;
            if record_check && !filter.matches(&record) {
                continue;
            }
            records.push(record);
            if limit.is_some_and(|n| records.len() as i64 >= n) {
                break;
            }
        }
        Ok(records)
    }
}

/// Row predicate over JSON fields.
#[derive(Debug, Clone)]
pub enum Filter {
    All,
    /// Record identifier equals this value.
    Id(String),
    /// Field holds exactly this string.
    Equals { field: String, value: String },
    /// Field contains `term` as a case-insensitive substring.
    Contains { field: String, term: String },
    /// Every sub-filter matches. Empty matches everything.
    And(Vec<Filter>),
    /// Any sub-filter matches. Empty matches everything.
    Or(Vec<Filter>),
}

impl Filter {
    pub fn equals(field: &str, value: &str) -> Self {
        Filter::Equals {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn contains(field: &str, term: &str) -> Self {
        Filter::Contains {
            field: field.to_string(),
            term: term.to_string(),
        }
    }

    /// Evaluate the filter against a decoded record.
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => record.get(ID_FIELD).and_then(|v| v.as_str()) == Some(id.as_str()),
            Filter::Equals { field, value } => {
                record.get(field).and_then(|v| v.as_str()) == Some(value.as_str())
            }
            Filter::Contains { field, term } => match record.get(field) {
                Some(serde_json::Value::String(s)) => contains_ignore_case(s, term),
                Some(serde_json::Value::Null) | None => false,
                Some(other) => contains_ignore_case(&other.to_string(), term),
            },
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.is_empty() || filters.iter().any(|f| f.matches(record)),
        }
    }

    /// Whether the SQL rendering only narrows the candidates and
    /// [`Filter::matches`] has to decide.
    fn needs_record_check(&self) -> bool {
        match self {
            Filter::Contains { .. } => true,
            Filter::And(filters) | Filter::Or(filters) => filters.iter().any(Filter::needs_record_check),
            _ => false,
        }
    }
}

fn push_filter(qb: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) -> Result<()> {
    match filter {
        Filter::All => {
            qb.push("1 = 1");
        }
        Filter::Id(id) => {
            qb.push("_id = ");
            qb.push_bind(id.clone());
        }
        Filter::Equals { field, value } => {
            qb.push(json_path_expr(field)?);
            qb.push(" = ");
            qb.push_bind(value.clone());
        }
        Filter::Contains { field, .. } => {
            qb.push(json_path_expr(field)?);
            qb.push(" IS NOT NULL");
        }
        Filter::And(filters) | Filter::Or(filters) => {
            if filters.is_empty() {
                qb.push("1 = 1");
                return Ok(());
            }
            let joiner = if matches!(filter, Filter::And(_)) { " AND " } else { " OR " };
            qb.push("(");
            for (i, f) in filters.iter().enumerate() {
                if i > 0 {
                    qb.push(joiner);
                }
                push_filter(qb, f)?;
            }
            qb.push(")");
        }
    }
    Ok(())
}

fn decode_record(id: String, doc: &str) -> Result<Record> {
    let mut record: Record = match serde_json::from_str(doc)? {
        serde_json::Value::Object(map) => map,
        _ => return Err(StoreError::NotAnObject),
    };
    record.insert(ID_FIELD.to_string(), serde_json::Value::String(id));
    Ok(record)
}

/// Database and collection names become SQL identifiers and file names.
pub fn validate_name(kind: &'static str, name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.to_ascii_lowercase().starts_with("sqlite_")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Field names become JSON paths inside SQL literals.
pub fn validate_field(field: &str) -> Result<()> {
    let valid = !field.is_empty()
        && field.len() <= MAX_NAME_LEN
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidName {
            kind: "field",
            name: field.to_string(),
        })
    }
}

fn quote_collection(collection: &str) -> Result<String> {
    validate_name("collection", collection)?;
    Ok(format!("\"{}\"", collection))
}

fn json_path_literal(field: &str) -> Result<String> {
    validate_field(field)?;
    Ok(format!("'$.\"{}\"'", field))
}

fn json_path_expr(field: &str) -> Result<String> {
    Ok(format!("json_extract(doc, {})", json_path_literal(field)?))
}

/// Collection and field names never contain `.`, so distinct pairs cannot
/// collide in the per-file index namespace.
fn index_name(prefix: &str, collection: &str, field: &str) -> String {
    format!("\"{}.{}.{}\"", prefix, collection, field)
}
