//! Keyword search over the precomputed concatenation field.
//!
//! Two modes share the same query cleaning and tokenization:
//!
//! - **Boolean** ([`search`]): every term must occur (AND), backend order.
//! - **Ranked** ([`search_ranked`]): any term may occur (OR); each hit is
//!   scored by how many of the query terms appear in its concatenation
//!   text, and hits are returned by score, highest first.
//!
//! Matching is case-insensitive substring containment, not word-bounded.
//! The concatenation field is removed from every record handed back.

use regex::RegexBuilder;
use serde_json::Value;
use std::collections::HashSet;

use crate::config::Config;
use crate::db::{Filter, Session};
use crate::error::Result;
use crate::models::{contains_ignore_case, string_field, Record, Scope, SearchHit, ID_FIELD};

/// Strip noise tokens (case-insensitive, anywhere in the text) and collapse
/// whitespace.
///
/// Tokens are removed one after another in the order given, so removing one
/// token can join the surrounding text into an occurrence of a later one.
pub fn clean_search_query(keywords: &str, noise_tokens: &[String]) -> String {
    let mut cleaned = keywords.to_string();
    for token in noise_tokens.iter().filter(|t| !t.is_empty()) {
        let re = RegexBuilder::new(&regex::escape(token))
            .case_insensitive(true)
            .build();
        if let Ok(re) = re {
            cleaned = re.replace_all(&cleaned, "").into_owned();
        }
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Clean `keywords` with the configured noise list and split into terms.
pub fn search_terms(config: &Config, keywords: &str) -> Vec<String> {
    clean_search_query(keywords, &config.search.noise_tokens)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

/// Number of terms occurring in `text`, case-insensitively.
pub fn score_concatenation(terms: &[String], text: &str) -> usize {
    terms
        .iter()
        .filter(|term| contains_ignore_case(text, term))
        .count()
}

/// Records whose concatenation field contains every term.
pub async fn search(config: &Config, scope: &Scope, keywords: &str) -> Result<Vec<Record>> {
    let terms = search_terms(config, keywords);
    tracing::debug!(scope = %scope, terms = ?terms, "boolean search");

    let field = &config.search.concatenation_field;
    let filter = Filter::And(terms.iter().map(|t| Filter::contains(field, t)).collect());

    let session = Session::open(config, &scope.database).await?;
    let result = find_matching(&session, &scope.collection, &filter).await;
    session.close().await;

    let records: Vec<Record> = result?
        .into_iter()
        .map(|record| strip_search_fields(record, config))
        .collect();

    tracing::info!(scope = %scope, found = records.len(), "search finished");
    Ok(records)
}

/// Records whose concatenation field contains any term, best first.
///
/// Hits are keyed by SKU: when several records share one, the first in
/// backend order represents it. Records without a SKU are keyed by their
/// identifier and never merged. Equal scores keep backend order.
pub async fn search_ranked(config: &Config, scope: &Scope, keywords: &str) -> Result<Vec<SearchHit>> {
    let terms = search_terms(config, keywords);
    tracing::debug!(scope = %scope, terms = ?terms, "ranked search");

    let field = &config.search.concatenation_field;
    let filter = Filter::Or(terms.iter().map(|t| Filter::contains(field, t)).collect());

    let session = Session::open(config, &scope.database).await?;
    let result = find_matching(&session, &scope.collection, &filter).await;
    session.close().await;

    let hits = rank(config, &terms, result?);
    tracing::info!(scope = %scope, found = hits.len(), "ranked search finished");
    Ok(hits)
}

fn rank(config: &Config, terms: &[String], records: Vec<Record>) -> Vec<SearchHit> {
    let field = &config.search.concatenation_field;
    let mut seen: HashSet<String> = HashSet::new();
    let mut hits: Vec<SearchHit> = Vec::new();

    for record in records {
        let key = match string_field(&record, &config.sku.field) {
            Some(sku) => format!("sku:{}", sku),
            None => format!("id:{}", id_string(&record)),
        };
        if !seen.insert(key) {
            continue;
        }

        let score = score_concatenation(terms, &concatenation_text(record.get(field)));
        hits.push(SearchHit {
            score,
            record: strip_search_fields(record, config),
        });
    }

    hits.sort_by(|a, b| b.score.cmp(&a.score));
    hits
}

async fn find_matching(session: &Session, collection: &str, filter: &Filter) -> Result<Vec<Record>> {
    if !session.collection_exists(collection).await? {
        return Ok(Vec::new());
    }
    session.find(collection, filter).await
}

fn concatenation_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn id_string(record: &Record) -> String {
    match record.get(ID_FIELD) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Drop the concatenation field and make sure the identifier is a string.
fn strip_search_fields(mut record: Record, config: &Config) -> Record {
    record.remove(&config.search.concatenation_field);
    let id = id_string(&record);
    record.insert(ID_FIELD.to_string(), Value::String(id));
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noise() -> Vec<String> {
        Config::with_root(".").search.noise_tokens
    }

    fn terms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_removes_noise_tokens() {
        assert_eq!(clean_search_query("8GB RAM 256 SSD laptop", &noise()), "8 256 laptop");
    }

    #[test]
    fn test_clean_is_not_word_bounded() {
        // "ram" inside "program" goes too.
        assert_eq!(clean_search_query("program hddock", &noise()), "prog ock");
    }

    #[test]
    fn test_clean_only_noise_yields_empty() {
        assert_eq!(clean_search_query("  RAM gb  Ssd hDD ", &noise()), "");
    }

    #[test]
    fn test_clean_applies_tokens_in_order() {
        // Removing "ram" exposes a "gb" that the next pass removes.
        assert_eq!(clean_search_query("gramb", &noise()), "");
    }

    #[test]
    fn test_clean_with_empty_noise_list_only_collapses_whitespace() {
        assert_eq!(clean_search_query(" 16GB   ram ", &[]), "16GB ram");
    }

    #[test]
    fn test_score_counts_terms_case_insensitively() {
        let t = terms(&["blue", "SHOES"]);
        assert_eq!(score_concatenation(&t, "Blue shoes size 10"), 2);
        assert_eq!(score_concatenation(&t, "red shoes size 9"), 1);
        assert_eq!(score_concatenation(&t, "green hat"), 0);
        assert_eq!(score_concatenation(&[], "anything"), 0);
    }

    #[test]
    fn test_rank_orders_by_score_and_strips_concatenation() {
        let config = Config::with_root(".");
        let records: Vec<Record> = vec![
            json!({"_id": "1", "SKU": "AAAA0001", "Concatenation": "red shoes size 9"}),
            json!({"_id": "2", "SKU": "AAAA0002", "Concatenation": "blue shoes size 10"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        let hits = rank(&config, &terms(&["blue", "shoes"]), records);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].record["SKU"], json!("AAAA0002"));
        assert_eq!(hits[0].score, 2);
        assert_eq!(hits[1].score, 1);
        assert!(hits.iter().all(|h| !h.record.contains_key("Concatenation")));
    }

    #[test]
    fn test_rank_collapses_shared_sku_to_first_match() {
        let config = Config::with_root(".");
        let records: Vec<Record> = vec![
            json!({"_id": "1", "SKU": "SAME0001", "Concatenation": "shoes"}),
            json!({"_id": "2", "SKU": "SAME0001", "Concatenation": "blue shoes"}),
            json!({"_id": "3", "Concatenation": "blue"}),
            json!({"_id": "4", "Concatenation": "blue"}),
        ]
        .into_iter()
        .map(|v| v.as_object().cloned().unwrap())
        .collect();

        let hits = rank(&config, &terms(&["blue", "shoes"]), records);
        let ids: Vec<&str> = hits.iter().map(|h| h.record["_id"].as_str().unwrap()).collect();
        // Ties keep backend order.
        assert_eq!(ids, vec!["1", "3", "4"]);
    }
}
