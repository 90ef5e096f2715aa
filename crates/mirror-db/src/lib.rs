//! # mirror-db: Database Layer for Droid Mirror
//!
//! This crate owns the two kinds of local SQLite database the engine deals
//! with.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Droid Mirror Data Flow                           │
//! │                                                                         │
//! │  mirror-sync (crawler / data task)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     mirror-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  (index.rs)   │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ metadata      │◄───│ IndexRepo     │    │ 001_metadata │  │   │
//! │  │   │ index pool    │    │ replace/read  │    │   _index.sql │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────────────────────────────────────────────┐    │   │
//! │  │   │ MirrorDatabase (mirror.rs)                            │    │   │
//! │  │   │ pool over a pulled copy of the device's database      │    │   │
//! │  │   └───────────────────────────────────────────────────────┘    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Metadata index pool creation and configuration
//! - [`migrations`] - Embedded schema migrations
//! - [`mirror`] - Handles over pulled database copies
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mirror_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::in_memory()).await?;
//! db.index().replace(&snapshot).await?;
//! let devices = db.index().devices().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod mirror;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use mirror::{MirrorConnection, MirrorDatabase, MirrorOptions};
pub use pool::{Database, DbConfig};

pub use repository::index::{IndexRepository, ReplaceSummary};
