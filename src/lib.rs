//! # Catalog Store
//!
//! SKU-tagged record storage with keyword and relevance-ranked search over
//! an embedded document store.
//!
//! Records are schemaless JSON objects kept one-per-row in SQLite tables
//! (one file per database, one table per collection). Every record carries a
//! collection-unique `SKU` and, for searchable collections, a precomputed
//! `Concatenation` text field that backs substring search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  upsert  │──▶│  sku registry │──▶│              │
//! └──────────┘   └──────────────┘   │   db::Session │──▶ <root>/<db>.sqlite
//! ┌──────────┐                      │  (per call)   │
//! │  search  │─────────────────────▶│              │
//! └──────────┘   ┌──────────────┐   │              │
//!                │  maintenance │──▶│              │
//!                └──────────────┘   └──────────────┘
//! ```
//!
//! Each public operation opens its own session, does its work, and closes
//! the session before returning, on error paths too.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error kinds returned by every operation |
//! | [`models`] | Records, scopes, log entries, outcomes |
//! | [`db`] | Sessions and collection primitives |
//! | [`sku`] | SKU generation and lookup |
//! | [`upsert`] | Record upsert pipeline and query logging |
//! | [`search`] | Boolean and ranked keyword search |
//! | [`maintenance`] | Dedup, empty-string cleanup, indexes |

pub mod config;
pub mod db;
pub mod error;
pub mod maintenance;
pub mod models;
pub mod search;
pub mod sku;
pub mod upsert;

pub use error::{Result, StoreError};
pub use models::{Record, Scope};
