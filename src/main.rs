//! # Catalog Store CLI (`cstore`)
//!
//! Command-line front end for the catalog store library: upload records,
//! run boolean or ranked keyword searches, and run collection maintenance.
//!
//! ## Usage
//!
//! ```bash
//! cstore --config ./config/cstore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cstore ping <db>` | Open a database and check that it answers |
//! | `cstore upsert <db> <coll> '<json>'` | Normalize, assign a SKU, and store a record |
//! | `cstore search <db> <coll> "<keywords>"` | Boolean (AND) keyword search |
//! | `cstore search ... --ranked` | Relevance-ranked (OR) keyword search |
//! | `cstore sku-check <db> <coll> <sku>` | Report whether a SKU is taken |
//! | `cstore sku-new <db> <coll>` | Print an unused SKU |
//! | `cstore backfill-sku <db> <coll>` | Give the first record a SKU if missing |
//! | `cstore dedupe <db> <coll> <field>` | Keep one record per field value |
//! | `cstore normalize <db> <coll>` | Replace empty strings with null |
//! | `cstore index <db> <coll> <field>...` | Create case-insensitive indexes |
//! | `cstore stats <db>` | List collections and record counts |
//!
//! Records are printed as one JSON object per line. Diagnostics go to
//! stderr through `tracing`; set `RUST_LOG` to change verbosity.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;

use catalog_store::config;
use catalog_store::db::Session;
use catalog_store::{maintenance, search, sku, upsert, Record, Scope};

/// Catalog Store CLI: SKU-tagged records with keyword search.
#[derive(Parser)]
#[command(
    name = "cstore",
    about = "Catalog Store — SKU-tagged records with keyword and ranked search",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cstore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a database and check that it answers.
    Ping { database: String },

    /// Store a record.
    ///
    /// Empty strings become null, a SKU is generated when missing, and the
    /// first insert into a new collection sets up its search index.
    Upsert {
        database: String,
        collection: String,
        /// Record as a JSON object, or `-` to read it from stdin.
        record: String,
        /// Skip the duplicate-SKU check.
        #[arg(long)]
        no_sku_check: bool,
    },

    /// Search the concatenation field.
    Search {
        database: String,
        collection: String,
        keywords: String,
        /// Match any term and order by relevance instead of requiring all terms.
        #[arg(long)]
        ranked: bool,
        /// Append the query to the search history.
        #[arg(long)]
        log: bool,
    },

    /// Report whether a SKU is already taken.
    SkuCheck {
        database: String,
        collection: String,
        sku: String,
    },

    /// Print a SKU not yet used in the collection.
    SkuNew { database: String, collection: String },

    /// Give the first record of the collection a SKU if it has none.
    BackfillSku { database: String, collection: String },

    /// Delete all but the first record for every duplicated field value.
    Dedupe {
        database: String,
        collection: String,
        field: String,
    },

    /// Replace empty-string fields with null.
    Normalize { database: String, collection: String },

    /// Create case-insensitive ascending indexes.
    Index {
        database: String,
        collection: String,
        #[arg(required = true)]
        fields: Vec<String>,
    },

    /// List collections and their record counts.
    Stats { database: String },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_record(raw: &str) -> anyhow::Result<Record> {
    let text = if raw == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read record from stdin")?;
        buf
    } else {
        raw.to_string()
    };

    let value: serde_json::Value =
        serde_json::from_str(&text).context("Record is not valid JSON")?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("Record must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Ping { database } => {
            let session = Session::open(&cfg, &database).await?;
            let alive = session.ping().await;
            session.close().await;
            if !alive {
                bail!("database '{}' did not answer", database);
            }
            println!("ok");
        }
        Commands::Upsert {
            database,
            collection,
            record,
            no_sku_check,
        } => {
            let record = parse_record(&record)?;
            let scope = Scope::new(database, collection);
            let outcome = upsert::upsert(&cfg, &scope, record, !no_sku_check).await?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Search {
            database,
            collection,
            keywords,
            ranked,
            log,
        } => {
            let scope = Scope::new(database, collection);
            if log {
                upsert::log_search_query(&cfg, &scope.database, &keywords).await?;
            }
            if ranked {
                let hits = search::search_ranked(&cfg, &scope, &keywords).await?;
                if hits.is_empty() {
                    eprintln!("No results.");
                }
                for hit in hits {
                    println!("{}", serde_json::to_string(&hit)?);
                }
            } else {
                let records = search::search(&cfg, &scope, &keywords).await?;
                if records.is_empty() {
                    eprintln!("No results.");
                }
                for record in records {
                    println!("{}", serde_json::to_string(&record)?);
                }
            }
        }
        Commands::SkuCheck {
            database,
            collection,
            sku,
        } => {
            let scope = Scope::new(database, collection);
            let in_use = sku::sku_in_use(&cfg, &scope, &sku).await?;
            println!("{}", if in_use { "in use" } else { "available" });
        }
        Commands::SkuNew {
            database,
            collection,
        } => {
            let scope = Scope::new(database, collection);
            println!("{}", sku::generate_unique_sku(&cfg, &scope).await?);
        }
        Commands::BackfillSku {
            database,
            collection,
        } => {
            let scope = Scope::new(database, collection);
            if !sku::backfill_missing_sku(&cfg, &scope).await? {
                bail!("collection {} is empty", scope);
            }
            println!("ok");
        }
        Commands::Dedupe {
            database,
            collection,
            field,
        } => {
            let scope = Scope::new(database, collection);
            let report = maintenance::remove_duplicate_entries(&cfg, &scope, &field).await?;
            println!(
                "duplicate rows: {}\ngroups: {}\ndeleted: {}",
                report.duplicate_rows, report.groups, report.deleted
            );
        }
        Commands::Normalize {
            database,
            collection,
        } => {
            let scope = Scope::new(database, collection);
            let updated = maintenance::replace_empty_strings_with_none(&cfg, &scope).await?;
            println!("updated records: {}", updated);
        }
        Commands::Index {
            database,
            collection,
            fields,
        } => {
            let scope = Scope::new(database, collection);
            maintenance::create_index(&cfg, &scope, &fields).await?;
            println!("ok");
        }
        Commands::Stats { database } => {
            let stats = maintenance::collection_stats(&cfg, &database).await?;
            println!("Catalog Store — {}", database);
            println!("================================");
            if stats.is_empty() {
                println!("  (no collections)");
            }
            for s in &stats {
                println!("  {:<24} {}", s.name, s.records);
            }
        }
    }

    Ok(())
}
