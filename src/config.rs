use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, StoreError};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub sku: SkuConfig,
    #[serde(default)]
    pub query_log: QueryLogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    /// Directory holding one `<database>.sqlite` file per database.
    pub root: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_noise_tokens")]
    pub noise_tokens: Vec<String>,
    #[serde(default = "default_concatenation_field")]
    pub concatenation_field: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            noise_tokens: default_noise_tokens(),
            concatenation_field: default_concatenation_field(),
        }
    }
}

fn default_noise_tokens() -> Vec<String> {
    ["ram", "gb", "ssd", "hdd"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_concatenation_field() -> String {
    "Concatenation".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct SkuConfig {
    #[serde(default = "default_sku_field")]
    pub field: String,
    #[serde(default = "default_sku_length")]
    pub length: usize,
    /// Back SKU uniqueness with a partial unique index on the collection.
    #[serde(default = "default_enforce_unique")]
    pub enforce_unique: bool,
    #[serde(default = "default_max_insert_attempts")]
    pub max_insert_attempts: u32,
}

impl Default for SkuConfig {
    fn default() -> Self {
        Self {
            field: default_sku_field(),
            length: default_sku_length(),
            enforce_unique: default_enforce_unique(),
            max_insert_attempts: default_max_insert_attempts(),
        }
    }
}

fn default_sku_field() -> String {
    "SKU".to_string()
}
fn default_sku_length() -> usize {
    8
}
fn default_enforce_unique() -> bool {
    true
}
fn default_max_insert_attempts() -> u32 {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryLogConfig {
    #[serde(default = "default_log_database")]
    pub database: String,
    #[serde(default = "default_log_collection")]
    pub collection: String,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        Self {
            database: default_log_database(),
            collection: default_log_collection(),
        }
    }
}

fn default_log_database() -> String {
    "search_history".to_string()
}
fn default_log_collection() -> String {
    "search_queries".to_string()
}

impl Config {
    /// Default configuration rooted at `root`, for callers that do not
    /// keep a config file around.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                root: root.into(),
                busy_timeout_ms: default_busy_timeout_ms(),
            },
            search: SearchConfig::default(),
            sku: SkuConfig::default(),
            query_log: QueryLogConfig::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sku.length == 0 || self.sku.length > 64 {
            return Err(StoreError::InvalidConfig(
                "sku.length must be in 1..=64".to_string(),
            ));
        }
        if self.sku.max_insert_attempts == 0 {
            return Err(StoreError::InvalidConfig(
                "sku.max_insert_attempts must be >= 1".to_string(),
            ));
        }
        crate::db::validate_field(&self.sku.field)?;
        crate::db::validate_field(&self.search.concatenation_field)?;
        crate::db::validate_name("database", &self.query_log.database)?;
        crate::db::validate_name("collection", &self.query_log.collection)?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.is_file() {
        return Err(StoreError::ConfigurationMissing {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)
        .map_err(|e| StoreError::InvalidConfig(format!("failed to parse config file: {}", e)))?;

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_configuration_missing() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, StoreError::ConfigurationMissing { .. }));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cstore.toml");
        std::fs::write(&path, "[db]\nroot = \"./data\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.db.root, PathBuf::from("./data"));
        assert_eq!(config.db.busy_timeout_ms, 5000);
        assert_eq!(config.sku.field, "SKU");
        assert_eq!(config.sku.length, 8);
        assert!(config.sku.enforce_unique);
        assert_eq!(config.search.concatenation_field, "Concatenation");
        assert_eq!(config.search.noise_tokens, vec!["ram", "gb", "ssd", "hdd"]);
        assert_eq!(config.query_log.database, "search_history");
        assert_eq!(config.query_log.collection, "search_queries");
    }

    #[test]
    fn test_example_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/cstore.example.toml");
        let config = load_config(&path).unwrap();
        assert_eq!(config.sku.max_insert_attempts, 8);
        assert_eq!(config.query_log.collection, "search_queries");
    }

    #[test]
    fn test_rejects_zero_sku_length() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cstore.toml");
        std::fs::write(&path, "[db]\nroot = \"./data\"\n\n[sku]\nlength = 0\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(matches!(err, StoreError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_unparseable_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cstore.toml");
        std::fs::write(&path, "[db\nroot = ").unwrap();

        assert!(matches!(
            load_config(&path).unwrap_err(),
            StoreError::InvalidConfig(_)
        ));
    }
}
