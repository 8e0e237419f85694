//! Collection maintenance: duplicate pruning, empty-string cleanup, and
//! index creation, plus the collection overview used by `cstore stats`.

use serde_json::Value;
use std::collections::HashMap;

use crate::config::Config;
use crate::db::{validate_field, Filter, Session};
use crate::error::Result;
use crate::models::{normalize_empty_strings, DedupReport, Record, Scope, ID_FIELD};

/// Per-collection record count.
#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub records: i64,
}

/// Keep one record per distinct `group_field` value and delete the rest.
///
/// Within a group the record stored first survives. Records missing the
/// field group together with records holding null.
pub async fn remove_duplicate_entries(
    config: &Config,
    scope: &Scope,
    group_field: &str,
) -> Result<DedupReport> {
    validate_field(group_field)?;

    let session = Session::open(config, &scope.database).await?;
    let result = remove_duplicates_in(&session, &scope.collection, group_field).await;
    session.close().await;

    let report = result?;
    tracing::info!(
        scope = %scope,
        field = group_field,
        duplicate_rows = report.duplicate_rows,
        groups = report.groups,
        deleted = report.deleted,
        "detected {} rows duplicating {} originals on [{}]; deleted {} and kept {}",
        report.duplicate_rows,
        report.groups,
        group_field,
        report.deleted,
        report.groups
    );
    Ok(report)
}

async fn remove_duplicates_in(session: &Session, collection: &str, group_field: &str) -> Result<DedupReport> {
    if !session.collection_exists(collection).await? {
        return Ok(DedupReport::default());
    }

    let records = session.find(collection, &Filter::All).await?;

    // Group key is the canonical JSON text of the value, in first-seen order.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    for record in &records {
        let key = serde_json::to_string(record.get(group_field).unwrap_or(&Value::Null))?;
        let Some(id) = record_id(record) else {
            continue;
        };
        groups
            .entry(key.clone())
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(id);
    }

    let mut report = DedupReport::default();
    for key in &order {
        let ids = &groups[key];
        if ids.len() < 2 {
            continue;
        }
        report.groups += 1;
        report.duplicate_rows += ids.len();
        for id in &ids[1..] {
            if session.delete_one(collection, id).await? {
                report.deleted += 1;
            }
        }
    }
    Ok(report)
}

/// Null out empty-string fields, rewriting only records that change.
/// Returns the number of records updated.
pub async fn replace_empty_strings_with_none(config: &Config, scope: &Scope) -> Result<usize> {
    let session = Session::open(config, &scope.database).await?;
    let result = replace_empty_strings_in(&session, &scope.collection).await;
    session.close().await;

    let updated = result?;
    tracing::info!(scope = %scope, updated, "replaced empty strings with null");
    Ok(updated)
}

async fn replace_empty_strings_in(session: &Session, collection: &str) -> Result<usize> {
    if !session.collection_exists(collection).await? {
        return Ok(0);
    }

    let mut updated = 0;
    for mut record in session.find(collection, &Filter::All).await? {
        if normalize_empty_strings(&mut record) == 0 {
            continue;
        }
        let Some(id) = record_id(&record) else {
            continue;
        };
        if session.replace_one(collection, &id, &record).await? {
            updated += 1;
        }
    }
    Ok(updated)
}

/// One case-insensitive ascending index per field. Creates the collection
/// if it does not exist yet.
pub async fn create_index(config: &Config, scope: &Scope, fields: &[String]) -> Result<()> {
    for field in fields {
        validate_field(field)?;
    }

    let session = Session::open(config, &scope.database).await?;
    let result = create_indexes_in(&session, config, &scope.collection, fields).await;
    session.close().await;

    if result.is_ok() {
        tracing::info!(scope = %scope, fields = ?fields, "created case-insensitive indexes");
    }
    result
}

async fn create_indexes_in(
    session: &Session,
    config: &Config,
    collection: &str,
    fields: &[String],
) -> Result<()> {
    if !session.collection_exists(collection).await? {
        let unique_field = config.sku.enforce_unique.then_some(config.sku.field.as_str());
        session.create_collection(collection, unique_field).await?;
    }
    for field in fields {
        session.create_nocase_index(collection, field).await?;
    }
    Ok(())
}

/// Collections of `database` with their record counts.
pub async fn collection_stats(config: &Config, database: &str) -> Result<Vec<CollectionStats>> {
    let session = Session::open(config, database).await?;
    let result = collection_stats_in(&session).await;
    session.close().await;
    result
}

async fn collection_stats_in(session: &Session) -> Result<Vec<CollectionStats>> {
    let mut stats = Vec::new();
    for name in session.list_collections().await? {
        let records = session.count(&name).await?;
        stats.push(CollectionStats { name, records });
    }
    Ok(stats)
}

fn record_id(record: &Record) -> Option<String> {
    record.get(ID_FIELD).and_then(Value::as_str).map(str::to_string)
}
