//! # Mirror Database
//!
//! A connection pool over a local copy of a database pulled from a device.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  puller writes <scratch>/main.db.XXXX                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  MirrorDatabase::open(path, options)  ← file must already exist        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  installed behind the swap gate, queried through MirrorGuard           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  replaced by a newer copy → close() → copy deleted by its owner        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No migrations run here: the schema belongs to the app on the device.
//!
//! ## Borrowed Connections
//! The pool is never handed out. Queries run on a [`MirrorConnection`],
//! which borrows the `MirrorDatabase` it came from, so no connection can be
//! kept past the point where the owner closes the pool.
//!
//! ```rust,compile_fail
//! # async fn demo(path: std::path::PathBuf) -> mirror_db::DbResult<()> {
//! let options = mirror_db::MirrorOptions::default();
//! let conn = {
//!     let mirror = mirror_db::MirrorDatabase::open(path, &options).await?;
//!     mirror.connection().await?
//! };
//! # drop(conn);
//! # Ok(())
//! # }
//! ```
//!
//! ```rust,compile_fail
//! fn keep(mirror: &mirror_db::MirrorDatabase) -> mirror_db::MirrorDatabase {
//!     mirror_db::MirrorDatabase::clone(mirror)
//! }
//! ```

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};

/// Pool settings for a mirror copy.
#[derive(Debug, Clone)]
pub struct MirrorOptions {
    /// Maximum number of connections in the pool.
    /// Default: 4
    pub max_connections: u32,

    /// Connection timeout duration.
    /// Default: 30 seconds
    pub connect_timeout: Duration,
}

impl Default for MirrorOptions {
    fn default() -> Self {
        MirrorOptions {
            max_connections: 4,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle on one pulled database copy. Not `Clone`: one owner closes it.
#[derive(Debug)]
pub struct MirrorDatabase {
    pool: SqlitePool,
    path: PathBuf,
}

impl MirrorDatabase {
    /// Opens a pool over an existing SQLite file.
    ///
    /// ## Returns
    /// * `Ok(MirrorDatabase)` - The copy answered a `sqlite_master` query
    /// * `Err(DbError::ConnectionFailed)` - Missing file, or not a database
    pub async fn open(path: impl Into<PathBuf>, options: &MirrorOptions) -> DbResult<Self> {
        let path = path.into();

        debug!(path = %path.display(), "Opening mirror copy");

        let connect_options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(false)
            // Keep the copy a single file; no -wal/-shm siblings to clean up.
            .journal_mode(SqliteJournalMode::Delete);

        let pool = SqlitePoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.connect_timeout)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        // A pulled file that is not a database only fails on first read.
        let check: Result<i64, sqlx::Error> =
            sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master")
                .fetch_one(&pool)
                .await;
        if let Err(e) = check {
            pool.close().await;
            return Err(DbError::ConnectionFailed(format!(
                "{} is not a readable database: {}",
                path.display(),
                e
            )));
        }

        info!(path = %path.display(), "Mirror copy opened");

        Ok(MirrorDatabase { pool, path })
    }

    /// Checks out a connection that cannot outlive `self`.
    pub async fn connection(&self) -> DbResult<MirrorConnection<'_>> {
        let conn = self.pool.acquire().await?;
        Ok(MirrorConnection {
            conn,
            _mirror: PhantomData,
        })
    }

    /// Local path of the copy this pool reads.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Closes the pool. Waits for checked-out connections to come back.
    pub async fn close(&self) {
        debug!(path = %self.path.display(), "Closing mirror copy");
        self.pool.close().await;
    }

    /// Returns true once `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Checks if the copy is still queryable.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Borrowed Connection
// =============================================================================

/// A pooled connection tied to the [`MirrorDatabase`] it was taken from.
///
/// Derefs to `SqliteConnection`; run queries with `&mut *conn`. Dropping it
/// returns the connection to the pool.
#[derive(Debug)]
pub struct MirrorConnection<'a> {
    conn: PoolConnection<Sqlite>,
    _mirror: PhantomData<&'a MirrorDatabase>,
}

impl Deref for MirrorConnection<'_> {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        &self.conn
    }
}

impl DerefMut for MirrorConnection<'_> {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(path: &Path) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO notes (body) VALUES ('hello')")
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    #[tokio::test]
    async fn test_open_existing_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.db");
        seed(&path).await;

        let mirror = MirrorDatabase::open(&path, &MirrorOptions::default())
            .await
            .unwrap();

        assert_eq!(mirror.path(), path.as_path());

        let mut conn = mirror.connection().await.unwrap();
        let body: String = sqlx::query_scalar("SELECT body FROM notes")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(body, "hello");
        drop(conn);

        mirror.close().await;
        assert!(mirror.is_closed());
        assert!(!mirror.health_check().await);
    }

    #[tokio::test]
    async fn test_missing_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = MirrorDatabase::open(dir.path().join("absent.db"), &MirrorOptions::default()).await;

        assert!(matches!(result, Err(DbError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_garbage_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.db");
        std::fs::write(&path, b"this is definitely not a sqlite database, just text padding it out").unwrap();

        let result = MirrorDatabase::open(&path, &MirrorOptions::default()).await;
        assert!(matches!(result, Err(DbError::ConnectionFailed(_))));
    }

    #[tokio::test]
    async fn test_close_waits_for_borrowed_connection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.db");
        seed(&path).await;

        let mirror = MirrorDatabase::open(&path, &MirrorOptions::default())
            .await
            .unwrap();

        {
            let mut conn = mirror.connection().await.unwrap();
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
            assert_eq!(count, 1);
        }

        // Every connection is back, so close() returns.
        tokio::time::timeout(Duration::from_secs(5), mirror.close())
            .await
            .unwrap();
        assert!(mirror.is_closed());
        assert!(mirror.connection().await.is_err());
    }
}
