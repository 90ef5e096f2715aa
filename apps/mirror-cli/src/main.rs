//! # Droid Mirror CLI
//!
//! Opens a mirror, runs one query, prints every row as a JSON object on its
//! own line, and closes the mirror.
//!
//! ## Startup Sequence
//! 1. Initialize tracing (stderr, `RUST_LOG` aware)
//! 2. Load configuration (defaults → TOML → environment)
//! 3. Open the mirror named by the connection string
//!    - data mirror: waits for the first copy
//!    - metadata mirror: waits for the first crawl
//! 4. Run the query (or list the index) and print the rows

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use mirror_sync::{AdbClient, DataMirror, MetadataMirror, Mirror, MirrorConfig, TaskState};

const USAGE: &str = "usage: mirror-cli [--config <path>] <connection string> [sql]";

const DEFAULT_DATA_QUERY: &str =
    "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name";

/// Parsed command line.
#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    connection: String,
    sql: Option<String>,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut config = None;
        let mut positional = Vec::new();

        while let Some(arg) = raw.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = raw.next().context("--config needs a path")?;
                    config = Some(PathBuf::from(path));
                }
                "--help" | "-h" => bail!(USAGE),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let Some(connection) = positional.next() else {
            bail!(USAGE);
        };
        let sql = positional.next();
        if positional.next().is_some() {
            bail!(USAGE);
        }

        Ok(Args {
            config,
            connection,
            sql,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse(std::env::args().skip(1))?;
    let config = MirrorConfig::load(args.config.clone()).context("Failed to load configuration")?;
    debug!(?config, "Configuration loaded");

    let gateway = Arc::new(AdbClient::from_settings(&config.adb));
    info!(adb = %gateway.address(), connection = %args.connection, "Opening mirror");

    let mirror = Mirror::open(&args.connection, config, gateway)
        .await
        .context("Failed to open mirror")?;

    let outcome = match &mirror {
        Mirror::Data(data) => {
            let sql = args.sql.as_deref().unwrap_or(DEFAULT_DATA_QUERY);
            print_data(data, sql).await
        }
        Mirror::Metadata(metadata) => print_metadata(metadata, args.sql.as_deref()).await,
    };

    mirror.close().await;
    outcome
}

/// Initializes the tracing subscriber. Logs go to stderr so stdout stays JSON.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mirror_sync=debug,mirror_db=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn print_data(data: &DataMirror, sql: &str) -> anyhow::Result<()> {
    let guard = data.acquire().await?;
    info!(
        serial = %guard.serial(),
        timestamp = %guard.timestamp(),
        "Querying mirror"
    );

    let mut conn = guard.connection().await?;
    let rows = sqlx::query(sql)
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("Query failed: {}", sql))?;
    print_rows(&rows);
    Ok(())
}

async fn print_metadata(metadata: &MetadataMirror, sql: Option<&str>) -> anyhow::Result<()> {
    let scheduler = metadata.scheduler();
    scheduler.wait_for_cycles(1).await;
    let state = scheduler.wait_for_state(|s| *s != TaskState::Running).await;
    if let TaskState::Halted(reason) = state {
        bail!("metadata crawl failed: {}", reason);
    }

    if let Some(sql) = sql {
        let rows = sqlx::query(sql)
            .fetch_all(metadata.database().pool())
            .await
            .with_context(|| format!("Query failed: {}", sql))?;
        print_rows(&rows);
        return Ok(());
    }

    for row in metadata.devices().await? {
        println!("{}", serde_json::json!({ "table": "devices", "row": row }));
    }
    for row in metadata.packages().await? {
        println!("{}", serde_json::json!({ "table": "packages", "row": row }));
    }
    for row in metadata.files().await? {
        println!("{}", serde_json::json!({ "table": "files", "row": row }));
    }
    Ok(())
}

fn print_rows(rows: &[SqliteRow]) {
    for row in rows {
        println!("{}", Value::Object(row_to_json(row)));
    }
    info!(rows = rows.len(), "Query complete");
}

/// Converts one row by its runtime column types. Blobs are base64.
fn row_to_json(row: &SqliteRow) -> Map<String, Value> {
    let mut object = Map::new();

    for column in row.columns() {
        let index = column.ordinal();
        let value = match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => Value::Null,
            Ok(raw) => {
                let type_name = raw.type_info().name().to_string();
                match type_name.as_str() {
                    "INTEGER" => row.try_get::<i64, _>(index).map(Value::from).unwrap_or(Value::Null),
                    "REAL" => row.try_get::<f64, _>(index).map(Value::from).unwrap_or(Value::Null),
                    "BLOB" => row
                        .try_get::<Vec<u8>, _>(index)
                        .map(|bytes| Value::from(STANDARD.encode(bytes)))
                        .unwrap_or(Value::Null),
                    _ => row.try_get::<String, _>(index).map(Value::from).unwrap_or(Value::Null),
                }
            }
            Err(_) => Value::Null,
        };
        object.insert(column.name().to_string(), value);
    }

    object
}
