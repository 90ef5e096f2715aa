//! # Metadata Index Repository
//!
//! Stores the devices, packages and files found by a metadata crawl.
//!
//! ## Replace Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     replace(&snapshot)                                  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. DELETE FROM files                                          │   │
//! │  │  2. DELETE FROM packages                                       │   │
//! │  │  3. DELETE FROM devices                                        │   │
//! │  │                                                                 │   │
//! │  │  4. INSERT devices   ── rejected row? log, skip its packages   │   │
//! │  │  5. INSERT packages  ── rejected row? log, skip its files      │   │
//! │  │  6. INSERT files     ── rejected row? log, continue            │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← readers see the old index or the new one, never a mix        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use sqlx::SqlitePool;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use mirror_core::{DeviceRow, FileRow, IndexSnapshot, PackageRow};

/// Row counts written by one `replace()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub devices: usize,
    pub packages: usize,
    pub files: usize,
    /// Rows rejected by the database or dropped because their parent was.
    pub skipped: usize,
}

/// Repository for the metadata index tables.
#[derive(Debug, Clone)]
pub struct IndexRepository {
    pool: SqlitePool,
}

impl IndexRepository {
    /// Creates a new IndexRepository.
    pub fn new(pool: SqlitePool) -> Self {
        IndexRepository { pool }
    }

    /// Replaces the whole index with `snapshot`.
    ///
    /// A row the database rejects (duplicate key, dangling parent) is logged
    /// and skipped, and so is everything below it: a rejected device drops
    /// its packages, a rejected package drops its files. Any other failure
    /// rolls the transaction back and leaves the previous index in place.
    pub async fn replace(&self, snapshot: &IndexSnapshot) -> DbResult<ReplaceSummary> {
        let mut summary = ReplaceSummary::default();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM files").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM packages").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM devices").execute(&mut *tx).await?;

        let mut live_devices: HashSet<&str> = HashSet::new();
        for device in &snapshot.devices {
            let result = sqlx::query("INSERT INTO devices (serial, name) VALUES (?1, ?2)")
                .bind(&device.serial)
                .bind(&device.name)
                .execute(&mut *tx)
                .await;

            if row_inserted(result)? {
                live_devices.insert(device.serial.as_str());
                summary.devices += 1;
            } else {
                warn!(serial = %device.serial, "Device row rejected, skipping");
                summary.skipped += 1;
            }
        }

        let mut live_packages: HashSet<(&str, &str)> = HashSet::new();
        for package in &snapshot.packages {
            if !live_devices.contains(package.serial.as_str()) {
                summary.skipped += 1;
                continue;
            }

            let result = sqlx::query(
                "INSERT INTO packages (serial, name, data_path) VALUES (?1, ?2, ?3)",
            )
            .bind(&package.serial)
            .bind(&package.name)
            .bind(&package.data_path)
            .execute(&mut *tx)
            .await;

            if row_inserted(result)? {
                live_packages.insert((package.serial.as_str(), package.name.as_str()));
                summary.packages += 1;
            } else {
                warn!(
                    serial = %package.serial,
                    package = %package.name,
                    "Package row rejected, skipping"
                );
                summary.skipped += 1;
            }
        }

        for file in &snapshot.files {
            if !live_packages.contains(&(file.serial.as_str(), file.package_name.as_str())) {
                summary.skipped += 1;
                continue;
            }

            let result = sqlx::query(
                r#"
                INSERT INTO files (serial, package_name, dir_path, file_name, full_path)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&file.serial)
            .bind(&file.package_name)
            .bind(&file.dir_path)
            .bind(&file.file_name)
            .bind(&file.full_path)
            .execute(&mut *tx)
            .await;

            if row_inserted(result)? {
                summary.files += 1;
            } else {
                warn!(path = %file.full_path, "File row rejected, skipping");
                summary.skipped += 1;
            }
        }

        tx.commit().await?;

        debug!(
            devices = summary.devices,
            packages = summary.packages,
            files = summary.files,
            skipped = summary.skipped,
            "Metadata index replaced"
        );

        Ok(summary)
    }

    /// All devices, ordered by serial.
    pub async fn devices(&self) -> DbResult<Vec<DeviceRow>> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT serial, name FROM devices ORDER BY serial")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(serial, name)| DeviceRow { serial, name })
            .collect())
    }

    /// All packages, ordered by device then name.
    pub async fn packages(&self) -> DbResult<Vec<PackageRow>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT serial, name, data_path FROM packages ORDER BY serial, name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(package_row).collect())
    }

    /// Packages installed on one device.
    pub async fn packages_for(&self, serial: &str) -> DbResult<Vec<PackageRow>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT serial, name, data_path FROM packages WHERE serial = ?1 ORDER BY name",
        )
        .bind(serial)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(package_row).collect())
    }

    /// All files, ordered by device, package, then path.
    pub async fn files(&self) -> DbResult<Vec<FileRow>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT serial, package_name, dir_path, file_name, full_path
            FROM files
            ORDER BY serial, package_name, full_path
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(file_row).collect())
    }

    /// Files belonging to one package on one device.
    pub async fn files_for(&self, serial: &str, package: &str) -> DbResult<Vec<FileRow>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT serial, package_name, dir_path, file_name, full_path
            FROM files
            WHERE serial = ?1 AND package_name = ?2
            ORDER BY full_path
            "#,
        )
        .bind(serial)
        .bind(package)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(file_row).collect())
    }

    /// Returns `(devices, packages, files)` row counts.
    pub async fn counts(&self) -> DbResult<(i64, i64, i64)> {
        let counts: (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM devices),
                (SELECT COUNT(*) FROM packages),
                (SELECT COUNT(*) FROM files)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(counts)
    }
}

/// `Ok(true)` when the row went in, `Ok(false)` when the database rejected
/// just that row, `Err` for anything that poisons the transaction.
fn row_inserted(result: Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>) -> DbResult<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            let err = DbError::from(e);
            if err.is_row_level() {
                debug!(error = %err, "Row-level insert failure");
                Ok(false)
            } else {
                Err(err)
            }
        }
    }
}

fn package_row((serial, name, data_path): (String, String, String)) -> PackageRow {
    PackageRow {
        serial,
        name,
        data_path,
    }
}

fn file_row(
    (serial, package_name, dir_path, file_name, full_path): (String, String, String, String, String),
) -> FileRow {
    FileRow {
        serial,
        package_name,
        dir_path,
        file_name,
        full_path,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
