//! # Mirror Handles
//!
//! What a consumer holds after opening a connection string.
//!
//! ```text
//! adb://<device>/<package>/<db path>   ──►  DataMirror
//!                                             SwapGate + DataSyncTask
//!                                             connect() waits for the first copy
//!
//! adb://<device>/<package>             ──►  MetadataMirror
//!                                             in-memory index + MetadataCrawler
//!                                             connect() returns at once
//! ```
//!
//! Both own a [`SchedulerHandle`]; `close()` shuts it down.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::MirrorConfig;
use crate::connection::{ConnectionTarget, MirrorKind};
use crate::crawler::MetadataCrawler;
use crate::data_task::DataSyncTask;
use crate::error::{SyncError, SyncResult};
use crate::gate::{MirrorGuard, SwapGate};
use crate::gateway::ShellGateway;
use crate::scheduler::{PollScheduler, ScheduleConfig, SchedulerHandle, TaskState};
use crate::task::TaskSpec;
use mirror_core::{DeviceRow, FileRow, PackageRow};
use mirror_db::{Database, DbConfig};

fn schedule_for(spec: &TaskSpec) -> ScheduleConfig {
    ScheduleConfig {
        initial_delay: spec.config.polling.initial_delay(),
        period: spec.config.polling.period(),
    }
}

// =============================================================================
// Data Mirror
// =============================================================================

/// A local, periodically refreshed copy of one device database.
#[derive(Debug)]
pub struct DataMirror {
    gate: Arc<SwapGate>,
    scheduler: SchedulerHandle,
    remote_path: String,
}

impl DataMirror {
    /// Starts the refresh task and waits for the first copy.
    ///
    /// There is no timeout: with no matching device this waits until one
    /// shows up. If the first cycles fail instead, the scheduler halts and
    /// this returns `Halted` with the cause.
    pub async fn connect(spec: TaskSpec, gateway: Arc<dyn ShellGateway>) -> SyncResult<Self> {
        let gate = Arc::new(SwapGate::new());
        let task = DataSyncTask::new(&spec, gateway, gate.clone())?;
        let remote_path = task.remote_path().to_string();

        info!(device = %spec.device, remote = %remote_path, "Starting data mirror");
        let mut scheduler = PollScheduler::start(Box::new(task), schedule_for(&spec));

        let outcome = tokio::select! {
            biased;
            _ = gate.wait_ready() => Ok(()),
            state = scheduler.wait_for_state(|s| s.is_halted() || *s == TaskState::Stopped) => {
                Err(match state {
                    TaskState::Halted(reason) => SyncError::Halted(reason),
                    _ => SyncError::ShuttingDown,
                })
            }
        };

        if let Err(e) = outcome {
            warn!(remote = %remote_path, error = %e, "Data mirror failed before its first copy");
            scheduler.shutdown().await;
            return Err(e);
        }

        Ok(DataMirror {
            gate,
            scheduler,
            remote_path,
        })
    }

    /// Locks the active copy. Swaps wait until the guard is dropped.
    pub async fn acquire(&self) -> SyncResult<MirrorGuard<'_>> {
        self.gate.acquire().await
    }

    pub fn gate(&self) -> &Arc<SwapGate> {
        &self.gate
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Stops refreshing, then closes and deletes the active copy.
    pub async fn close(mut self) {
        self.scheduler.shutdown().await;
        if let Some(active) = self.gate.take().await {
            active.dispose().await;
        }
        info!(remote = %self.remote_path, "Data mirror closed");
    }
}

// =============================================================================
// Metadata Mirror
// =============================================================================

/// An in-memory index of devices, packages and files, rebuilt every period.
#[derive(Debug)]
pub struct MetadataMirror {
    db: Database,
    scheduler: SchedulerHandle,
}

impl MetadataMirror {
    /// Creates the index and starts the crawler. Does not wait for a crawl;
    /// the tables are empty until the first one finishes.
    pub async fn connect(spec: TaskSpec, gateway: Arc<dyn ShellGateway>) -> SyncResult<Self> {
        let db = Database::new(DbConfig::in_memory()).await?;
        let schedule = schedule_for(&spec);

        info!(device = %spec.device, package = %spec.package, "Starting metadata mirror");
        let crawler = MetadataCrawler::new(spec, gateway, db.clone());
        let scheduler = PollScheduler::start(Box::new(crawler), schedule);

        Ok(MetadataMirror { db, scheduler })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    pub async fn devices(&self) -> SyncResult<Vec<DeviceRow>> {
        Ok(self.db.index().devices().await?)
    }

    pub async fn packages(&self) -> SyncResult<Vec<PackageRow>> {
        Ok(self.db.index().packages().await?)
    }

    pub async fn files(&self) -> SyncResult<Vec<FileRow>> {
        Ok(self.db.index().files().await?)
    }

    /// Stops crawling and drops the index.
    pub async fn close(mut self) {
        self.scheduler.shutdown().await;
        self.db.close().await;
        info!("Metadata mirror closed");
    }
}

// =============================================================================
// Mirror
// =============================================================================

/// Either kind of mirror, chosen by the connection string.
#[derive(Debug)]
pub enum Mirror {
    Data(DataMirror),
    Metadata(MetadataMirror),
}

impl Mirror {
    /// Parses `connection_string`, layers its parameters over `config`, and
    /// connects the matching mirror.
    pub async fn open(
        connection_string: &str,
        config: MirrorConfig,
        gateway: Arc<dyn ShellGateway>,
    ) -> SyncResult<Self> {
        let target = ConnectionTarget::parse(connection_string)?;
        let spec = target.task_spec(config)?;

        match target.kind() {
            MirrorKind::Data => Ok(Mirror::Data(DataMirror::connect(spec, gateway).await?)),
            MirrorKind::Metadata => Ok(Mirror::Metadata(MetadataMirror::connect(spec, gateway).await?)),
        }
    }

    pub fn kind(&self) -> MirrorKind {
        match self {
            Mirror::Data(_) => MirrorKind::Data,
            Mirror::Metadata(_) => MirrorKind::Metadata,
        }
    }

    pub fn scheduler(&self) -> &SchedulerHandle {
        match self {
            Mirror::Data(m) => m.scheduler(),
            Mirror::Metadata(m) => m.scheduler(),
        }
    }

    pub async fn close(self) {
        match self {
            Mirror::Data(m) => m.close().await,
            Mirror::Metadata(m) => m.close().await,
        }
    }
}
