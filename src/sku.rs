//! SKU registry: generation and lookup of per-collection identifiers.
//!
//! A SKU is a fixed-length token drawn from `A-Z0-9` (36^8 candidates at the
//! default length). Lookup is check-then-act and therefore not atomic across
//! processes; collections created with `sku.enforce_unique` carry a unique
//! index that makes the final decision, and the callers in [`crate::upsert`]
//! retry on rejection.

use rand::Rng;
use serde_json::Value;

use crate::config::Config;
use crate::db::{Filter, Session};
use crate::error::Result;
use crate::models::{string_field, Scope, ID_FIELD};

const SKU_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Sample one candidate token of `len` characters.
pub fn random_sku(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| SKU_ALPHABET[rng.gen_range(0..SKU_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
pub(crate) fn is_well_formed(sku: &str, len: usize) -> bool {
    sku.len() == len
        && sku
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

/// True iff a record in `scope` holds exactly `sku`.
pub async fn sku_in_use(config: &Config, scope: &Scope, sku: &str) -> Result<bool> {
    let session = Session::open(config, &scope.database).await?;
    let result = sku_in_use_in(&session, config, &scope.collection, sku).await;
    session.close().await;
    result
}

/// Sample candidates until one is unused in `scope`.
pub async fn generate_unique_sku(config: &Config, scope: &Scope) -> Result<String> {
    let session = Session::open(config, &scope.database).await?;
    let result = generate_unique_sku_in(&session, config, &scope.collection).await;
    session.close().await;
    result
}

/// Give the first record of `scope` a SKU if it has none.
///
/// Only the record returned first in natural order is inspected. Returns
/// `false` when the collection is empty.
pub async fn backfill_missing_sku(config: &Config, scope: &Scope) -> Result<bool> {
    let session = Session::open(config, &scope.database).await?;
    let result = backfill_missing_sku_in(&session, config, &scope.collection).await;
    session.close().await;
    result
}

pub(crate) async fn sku_in_use_in(
    session: &Session,
    config: &Config,
    collection: &str,
    sku: &str,
) -> Result<bool> {
    if !session.collection_exists(collection).await? {
        return Ok(false);
    }
    session
        .exists(collection, &Filter::equals(&config.sku.field, sku))
        .await
}

pub(crate) async fn generate_unique_sku_in(
    session: &Session,
    config: &Config,
    collection: &str,
) -> Result<String> {
    loop {
        let candidate = random_sku(config.sku.length);
        if !sku_in_use_in(session, config, collection, &candidate).await? {
            return Ok(candidate);
        }
        tracing::debug!(collection, candidate = %candidate, "SKU candidate already taken");
    }
}

pub(crate) async fn backfill_missing_sku_in(
    session: &Session,
    config: &Config,
    collection: &str,
) -> Result<bool> {
    let first = match session.find_one(collection, &Filter::All).await? {
        Some(record) => record,
        None => return Ok(false),
    };

    if string_field(&first, &config.sku.field).is_some() {
        return Ok(true);
    }

    let Some(id) = first.get(ID_FIELD).and_then(Value::as_str).map(str::to_string) else {
        return Ok(false);
    };

    let mut attempts = 0;
    loop {
        attempts += 1;
        let sku = generate_unique_sku_in(session, config, collection).await?;
        match session
            .set_field(collection, &id, &config.sku.field, &Value::String(sku.clone()))
            .await
        {
            Ok(_) => {
                tracing::info!(collection, sku = %sku, id = %id, "backfilled missing SKU");
                return Ok(true);
            }
            Err(e) if e.is_unique_violation() && attempts < config.sku.max_insert_attempts => {
                tracing::warn!(collection, sku = %sku, "generated SKU lost a race, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}
