//! Record upsert pipeline and search-history logging.
//!
//! ```text
//! normalize "" -> null
//!        │
//!        ├── collection exists ──▶ duplicate check ──▶ SKU generation ──▶ insert
//!        │
//!        └── new collection ─────▶ create (+ unique SKU index) ──▶ insert
//!                                   ──▶ backfill SKU ──▶ NOCASE index on Concatenation
//! ```
//!
//! A caller-supplied SKU that is already taken is reported with a warning.
//! Whether the insert then goes ahead depends on `sku.enforce_unique`: with
//! the unique index in place the backend rejects it and the caller gets
//! [`StoreError::DuplicateSku`]; without it the record is stored anyway.

use serde_json::Value;

use crate::config::Config;
use crate::db::{Filter, Session};
use crate::error::{Result, StoreError};
use crate::models::{normalize_empty_strings, string_field, Record, Scope, SearchQueryLogEntry, UpsertOutcome};
use crate::sku::{backfill_missing_sku_in, generate_unique_sku_in, sku_in_use_in};

/// Normalize and store `record` in `scope`.
///
/// With `check_for_duplicate_sku`, a present SKU is looked up first. An
/// absent SKU is always generated when the collection already exists. The
/// session is closed on every exit path.
pub async fn upsert(
    config: &Config,
    scope: &Scope,
    mut record: Record,
    check_for_duplicate_sku: bool,
) -> Result<UpsertOutcome> {
    normalize_empty_strings(&mut record);

    let session = Session::open(config, &scope.database).await?;
    let result = upsert_in(&session, config, scope, record, check_for_duplicate_sku).await;
    session.close().await;

    match &result {
        Ok(outcome) => tracing::info!(
            scope = %scope,
            id = %outcome.id,
            sku = outcome.sku.as_deref().unwrap_or("-"),
            "record uploaded"
        ),
        Err(e) => tracing::error!(scope = %scope, error = %e, "error uploading record"),
    }
    result
}

/// Append a search-history entry. Duplicate checking is disabled.
pub async fn log_search_query(config: &Config, database: &str, query: &str) -> Result<UpsertOutcome> {
    let scope = Scope::new(
        config.query_log.database.clone(),
        config.query_log.collection.clone(),
    );
    let entry = SearchQueryLogEntry::now(database, query);
    upsert(config, &scope, entry.to_record()?, false).await
}

async fn upsert_in(
    session: &Session,
    config: &Config,
    scope: &Scope,
    mut record: Record,
    check_for_duplicate_sku: bool,
) -> Result<UpsertOutcome> {
    let collection = scope.collection.as_str();
    let sku_field = config.sku.field.as_str();

    if session.collection_exists(collection).await? {
        let mut duplicate_sku = false;
        let mut generated = false;

        match string_field(&record, sku_field) {
            Some(sku) => {
                if check_for_duplicate_sku && sku_in_use_in(session, config, collection, sku).await? {
                    tracing::warn!(
                        scope = %scope,
                        sku,
                        "SKU already exists; check whether this is a duplicate entry"
                    );
                    duplicate_sku = true;
                }
            }
            None => {
                let sku = generate_unique_sku_in(session, config, collection).await?;
                record.insert(sku_field.to_string(), Value::String(sku));
                generated = true;
            }
        }

        let id = insert_with_retry(session, config, collection, &mut record, generated).await?;
        return Ok(UpsertOutcome {
            id,
            sku: string_field(&record, sku_field).map(str::to_string),
            created_collection: false,
            duplicate_sku,
        });
    }

    let unique_field = config.sku.enforce_unique.then_some(sku_field);
    session.create_collection(collection, unique_field).await?;
    let id = insert_with_retry(session, config, collection, &mut record, false).await?;
    backfill_missing_sku_in(session, config, collection).await?;
    session
        .create_nocase_index(collection, &config.search.concatenation_field)
        .await?;
    tracing::debug!(scope = %scope, field = %config.search.concatenation_field, "created search index");

    let stored = session.find_one(collection, &Filter::Id(id.clone())).await?;
    let sku = stored
        .as_ref()
        .and_then(|r| string_field(r, sku_field))
        .map(str::to_string);

    Ok(UpsertOutcome {
        id,
        sku,
        created_collection: true,
        duplicate_sku: false,
    })
}

/// Insert, regenerating a generated SKU when the unique index rejects it.
///
/// A unique violation only counts as a SKU clash when the SKU index exists
/// and the SKU is actually taken; anything else (a reused `_id`) is passed
/// through as the backend error.
async fn insert_with_retry(
    session: &Session,
    config: &Config,
    collection: &str,
    record: &mut Record,
    sku_generated: bool,
) -> Result<String> {
    let sku_field = config.sku.field.as_str();
    let mut attempts = 0;
    loop {
        attempts += 1;
        let err = match session.insert_one(collection, record).await {
            Ok(id) => return Ok(id),
            Err(e) => e,
        };

        if !err.is_unique_violation() {
            return Err(err);
        }
        let Some(sku) = string_field(record, sku_field).map(str::to_string) else {
            return Err(err);
        };
        if !config.sku.enforce_unique || !sku_in_use_in(session, config, collection, &sku).await? {
            return Err(err);
        }

        if sku_generated && attempts < config.sku.max_insert_attempts {
            let fresh = generate_unique_sku_in(session, config, collection).await?;
            tracing::warn!(collection, rejected = %sku, retry = %fresh, "generated SKU lost a race, retrying");
            record.insert(sku_field.to_string(), Value::String(fresh));
            continue;
        }

        return Err(StoreError::DuplicateSku {
            sku,
            collection: collection.to_string(),
        });
    }
}
