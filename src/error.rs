//! Error kinds surfaced by every public operation.
//!
//! Failures never abort the process from inside the library: each operation
//! hands back a [`StoreError`] and the caller decides whether it is fatal.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the store, search, and maintenance operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("configuration file not found: {}", path.display())]
    ConfigurationMissing { path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid {kind} name '{name}'")]
    InvalidName { kind: &'static str, name: String },

    #[error("unable to connect to database '{database}': {source}")]
    ConnectionFailure {
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("backend operation failed: {0}")]
    Backend(#[from] sqlx::Error),

    #[error("SKU '{sku}' already exists in collection '{collection}'")]
    DuplicateSku { sku: String, collection: String },

    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True when the backend rejected a write because of a unique index.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            StoreError::Backend(sqlx::Error::Database(db_err)) => db_err.is_unique_violation(),
            StoreError::DuplicateSku { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
