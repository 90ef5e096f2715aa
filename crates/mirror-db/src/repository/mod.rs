//! # Repository Module
//!
//! Database repository implementations for the metadata index.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  MetadataCrawler                       MetadataMirror readers          │
//! │       │                                     │                           │
//! │       │  db.index().replace(&snapshot)      │  db.index().files_for(..) │
//! │       ▼                                     ▼                           │
//! │  IndexRepository                                                       │
//! │  ├── replace(&self, snapshot)   one transaction, per-row skips         │
//! │  ├── devices / packages / files                                        │
//! │  └── packages_for / files_for / counts                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (in-memory)                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`IndexRepository`](index::IndexRepository) - Devices, packages and files seen by the last crawl

pub mod index;
