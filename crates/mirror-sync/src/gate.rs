//! # Mirror Swap Gate
//!
//! Holds the one active mirror and serialises everyone who touches it.
//!
//! ## Swap Protocol
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  consumer A ──► lock ─► query ─► unlock                                 │
//! │  consumer B ─────────────────────► lock ─► query ─► unlock              │
//! │  refresh    ──────────────► (queued) ─────────────────────► lock        │
//! │                                                     take old, put new   │
//! │                                                     unlock              │
//! │                                                     close old pool      │
//! │                                                     delete old file     │
//! │                                                                         │
//! │  tokio::sync::Mutex grants the lock in request order, so a refresh     │
//! │  waits behind consumers that asked first and is never starved.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The old copy is closed and deleted after the lock is released. Nobody can
//! reach it by then: the only path to a mirror goes through the lock, and
//! the slot already holds the new one. Queries run on a [`MirrorConnection`]
//! borrowed from the guard, so no connection survives the unlock.
//!
//! ## Readiness
//!
//! The slot starts empty. The first install flips a `watch` flag once;
//! [`SwapGate::wait_ready`] waits for it with no timeout.

use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::TempPath;
use tokio::sync::{watch, MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::puller::PulledCopy;
use mirror_core::RemoteTimestamp;
use mirror_db::{MirrorConnection, MirrorDatabase, MirrorOptions};

// =============================================================================
// Active Mirror
// =============================================================================

/// An installed mirror: an open pool plus the scratch file it reads.
#[derive(Debug)]
pub struct ActiveMirror {
    database: MirrorDatabase,
    file: TempPath,
    timestamp: RemoteTimestamp,
    serial: String,
}

impl ActiveMirror {
    /// Opens a pool over a pulled copy. On failure the copy is deleted.
    pub async fn open(copy: PulledCopy, serial: &str, options: &MirrorOptions) -> SyncResult<Self> {
        let database = MirrorDatabase::open(copy.path.to_path_buf(), options).await?;

        Ok(ActiveMirror {
            database,
            file: copy.path,
            timestamp: copy.timestamp,
            serial: serial.to_string(),
        })
    }

    pub fn database(&self) -> &MirrorDatabase {
        &self.database
    }

    /// Connection to the local copy. Borrows the guard, so it is returned
    /// to the pool before the lock is released.
    pub async fn connection(&self) -> SyncResult<MirrorConnection<'_>> {
        Ok(self.database.connection().await?)
    }

    /// Local path of the copy.
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Remote modification time the copy was taken at.
    pub fn timestamp(&self) -> &RemoteTimestamp {
        &self.timestamp
    }

    /// Serial of the device the copy came from.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Closes the pool, then deletes the file.
    pub async fn dispose(self) {
        self.database.close().await;

        let path = self.file.to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Removed retired mirror copy"),
            Err(e) => warn!(path = %path.display(), error = %e, "Could not remove mirror copy"),
        }
    }
}

// =============================================================================
// Guard
// =============================================================================

/// Exclusive access to the active mirror. Other consumers and the refresh
/// path wait until it is dropped.
pub struct MirrorGuard<'a> {
    inner: MappedMutexGuard<'a, ActiveMirror>,
}

impl Deref for MirrorGuard<'_> {
    type Target = ActiveMirror;

    fn deref(&self) -> &ActiveMirror {
        &self.inner
    }
}

// =============================================================================
// Swap Gate
// =============================================================================

/// Single-slot holder of the active mirror.
#[derive(Debug)]
pub struct SwapGate {
    slot: Mutex<Option<ActiveMirror>>,
    ready_tx: watch::Sender<bool>,
    installs: AtomicU64,
}

impl Default for SwapGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SwapGate {
    pub fn new() -> Self {
        let (ready_tx, _) = watch::channel(false);
        SwapGate {
            slot: Mutex::new(None),
            ready_tx,
            installs: AtomicU64::new(0),
        }
    }

    /// Locks the gate for a consumer.
    ///
    /// Waits for the lock in FIFO order. Fails with `HandleUnavailable`
    /// instead of waiting when nothing has been installed yet.
    pub async fn acquire(&self) -> SyncResult<MirrorGuard<'_>> {
        let guard = self.slot.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut())
            .map(|inner| MirrorGuard { inner })
            .map_err(|_| SyncError::HandleUnavailable)
    }

    /// Installs `mirror` and returns the one it replaced, still open.
    ///
    /// The caller disposes of the returned mirror; [`SwapGate::swap`] does
    /// both steps.
    pub async fn install(&self, mirror: ActiveMirror) -> Option<ActiveMirror> {
        let previous = {
            let mut slot = self.slot.lock().await;
            slot.replace(mirror)
        };

        let count = self.installs.fetch_add(1, Ordering::SeqCst) + 1;
        self.ready_tx.send_replace(true);
        debug!(installs = count, "Mirror installed");

        previous
    }

    /// Installs `mirror`, then closes and deletes the previous one.
    pub async fn swap(&self, mirror: ActiveMirror) {
        info!(
            serial = %mirror.serial(),
            timestamp = %mirror.timestamp(),
            "Swapping in new mirror"
        );

        if let Some(previous) = self.install(mirror).await {
            previous.dispose().await;
        }
    }

    /// Empties the slot. Used on close.
    pub async fn take(&self) -> Option<ActiveMirror> {
        self.slot.lock().await.take()
    }

    /// Waits until the first mirror has been installed. No timeout.
    pub async fn wait_ready(&self) {
        let mut ready_rx = self.ready_tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = ready_rx.wait_for(|ready| *ready).await;
    }

    pub fn is_ready(&self) -> bool {
        *self.ready_tx.borrow()
    }

    /// Number of installs so far.
    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    async fn mirror_in(dir: &Path, minute: u32) -> ActiveMirror {
        // A zero-length file is a valid, empty SQLite database.
        let path = tempfile::Builder::new()
            .prefix("main.db.")
            .tempfile_in(dir)
            .unwrap()
            .into_temp_path();
        let timestamp =
            RemoteTimestamp::parse(&format!("2024-01-01 10:{:02}:00 +0000", minute)).unwrap();

        ActiveMirror::open(PulledCopy { path, timestamp }, "emulator-5554", &MirrorOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_gate_is_unavailable() {
        let gate = SwapGate::new();

        assert!(!gate.is_ready());
        assert!(matches!(gate.acquire().await, Err(SyncError::HandleUnavailable)));
    }

    #[tokio::test]
    async fn test_swap_retires_previous_copy() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SwapGate::new();

        gate.swap(mirror_in(dir.path(), 0).await).await;
        let first_path = gate.acquire().await.unwrap().path().to_path_buf();
        assert!(gate.is_ready());

        gate.swap(mirror_in(dir.path(), 1).await).await;

        let guard = gate.acquire().await.unwrap();
        assert_ne!(guard.path(), first_path.as_path());
        assert_eq!(guard.timestamp().to_string(), "2024-01-01 10:01:00.000000000 +0000");
        assert!(!first_path.exists());
        assert!(guard.path().exists());
        assert_eq!(gate.installs(), 2);
    }

    #[tokio::test]
    async fn test_wait_ready_returns_after_first_install() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(SwapGate::new());

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_ready().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.swap(mirror_in(dir.path(), 0).await).await;
        waiter.await.unwrap();

        // Already ready: returns at once.
        gate.wait_ready().await;
    }

    #[tokio::test]
    async fn test_consumers_never_see_a_closed_pool() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(SwapGate::new());
        gate.swap(mirror_in(dir.path(), 0).await).await;

        let mut consumers = Vec::new();
        for _ in 0..4 {
            let gate = gate.clone();
            consumers.push(tokio::spawn(async move {
                for _ in 0..25 {
                    let guard = gate.acquire().await.unwrap();
                    assert!(!guard.database().is_closed());
                    assert!(guard.path().exists());
                    let mut conn = guard.connection().await.unwrap();
                    let one: i64 = sqlx::query_scalar("SELECT 1")
                        .fetch_one(&mut *conn)
                        .await
                        .unwrap();
                    assert_eq!(one, 1);
                    drop(conn);
                    drop(guard);
                    tokio::task::yield_now().await;
                }
            }));
        }

        for minute in 1..10 {
            gate.swap(mirror_in(dir.path(), minute).await).await;
            tokio::task::yield_now().await;
        }

        for consumer in consumers {
            consumer.await.unwrap();
        }

        // Only the last copy is left on disk.
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_lock_is_granted_in_request_order() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(SwapGate::new());
        gate.swap(mirror_in(dir.path(), 0).await).await;

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let held = gate.acquire().await.unwrap();

        let mut waiters = Vec::new();
        for id in 0..5 {
            let gate = gate.clone();
            let order = order.clone();
            waiters.push(tokio::spawn(async move {
                let _guard = gate.acquire().await.unwrap();
                order.lock().unwrap().push(id);
            }));
            // Let the task run until it queues on the lock.
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
        }

        drop(held);
        for waiter in waiters {
            waiter.await.unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_take_empties_slot() {
        let dir = tempfile::tempdir().unwrap();
        let gate = SwapGate::new();
        gate.swap(mirror_in(dir.path(), 0).await).await;

        let taken = gate.take().await.unwrap();
        assert!(matches!(gate.acquire().await, Err(SyncError::HandleUnavailable)));

        let path = taken.path().to_path_buf();
        taken.dispose().await;
        assert!(!path.exists());
    }
}
