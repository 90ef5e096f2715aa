//! # mirror-sync: Sync Engine for Droid Mirror
//!
//! Keeps local copies of on-device SQLite databases fresh, and keeps an
//! index of what each debuggable package stores.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Droid Mirror Sync Engine                         │
//! │                                                                         │
//! │   connection string ──► ConnectionTarget ──► TaskSpec                   │
//! │                                                  │                      │
//! │                      ┌───────────────────────────┴──────────┐           │
//! │                      ▼                                      ▼           │
//! │  ┌──────────────────────────────────┐  ┌──────────────────────────────┐ │
//! │  │ DataMirror                       │  │ MetadataMirror               │ │
//! │  │                                  │  │                              │ │
//! │  │  PollScheduler                   │  │  PollScheduler               │ │
//! │  │    └─ DataSyncTask               │  │    └─ MetadataCrawler        │ │
//! │  │         staleness ─► puller      │  │         devices, packages,   │ │
//! │  │              └─► SwapGate ◄──────┼──┼─ consumers   files          │ │
//! │  │                                  │  │              └─► index db    │ │
//! │  └──────────────────────────────────┘  └──────────────────────────────┘ │
//! │                      │                                      │           │
//! │                      └──────────────┬───────────────────────┘           │
//! │                                     ▼                                   │
//! │                        dyn ShellGateway (AdbClient)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Plumbing
//! - [`adb`] - Minimal adb host protocol client
//! - [`gateway`] - `ShellGateway` trait and command builders
//! - [`config`] - Mirror configuration (TOML, env, connection parameters)
//! - [`connection`] - `adb://` connection strings
//! - [`error`] - Sync error types
//!
//! ### Refresh
//! - [`staleness`] - Remote modification time tracking
//! - [`puller`] - Copies a remote database into a scratch file
//! - [`gate`] - Single-slot, FIFO swap gate for the active copy
//! - [`scheduler`] - Fixed-delay runner with halt/resume
//! - [`task`] - `SyncTask` trait and `TaskSpec`
//! - [`data_task`] - Refresh of one database
//! - [`crawler`] - Rebuild of the metadata index
//!
//! ### Consumers
//! - [`mirror`] - `DataMirror`, `MetadataMirror` and `Mirror::open`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mirror_sync::{AdbClient, Mirror, MirrorConfig};
//!
//! let config = MirrorConfig::load_or_default(None);
//! let gateway = Arc::new(AdbClient::from_settings(&config.adb));
//!
//! let mirror = Mirror::open("adb://*/com.example.app/databases/main.db", config, gateway).await?;
//! if let Mirror::Data(data) = &mirror {
//!     let guard = data.acquire().await?;
//!     let mut conn = guard.connection().await?;
//!     let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notes")
//!         .fetch_one(&mut *conn)
//!         .await?;
//! }
//! mirror.close().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Plumbing
pub mod adb;
pub mod config;
pub mod connection;
pub mod error;
pub mod gateway;

// Refresh
pub mod crawler;
pub mod data_task;
pub mod gate;
pub mod puller;
pub mod scheduler;
pub mod staleness;
pub mod task;

// Consumers
pub mod mirror;

// =============================================================================
// Re-exports
// =============================================================================

pub use adb::AdbClient;
pub use config::{AdbSettings, DeviceSettings, MirrorConfig, PollingSettings};
pub use connection::{ConnectionTarget, MirrorKind};
pub use error::{SyncError, SyncResult};
pub use gateway::{DeviceHandle, ShellGateway};

pub use crawler::MetadataCrawler;
pub use data_task::DataSyncTask;
pub use gate::{ActiveMirror, MirrorGuard, SwapGate};
pub use puller::{PulledCopy, RemotePuller};
pub use scheduler::{PollScheduler, ScheduleConfig, SchedulerHandle, TaskState};
pub use staleness::StalenessDetector;
pub use task::{SyncTask, TaskSpec};

pub use mirror::{DataMirror, MetadataMirror, Mirror};
