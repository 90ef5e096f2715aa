//! # mirror-core: Pure Domain Logic for Droid Mirror
//!
//! This crate holds everything about the mirror that can be expressed
//! without touching a device, a socket or a database.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Droid Mirror Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 mirror-sync (engine)                            │   │
//! │  │   adb gateway ──► staleness ──► puller ──► swap gate           │   │
//! │  │   crawler ─────────────────────────────► metadata index        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ raw shell output                       │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ mirror-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌─────────────┐               │   │
//! │  │   │   types   │  │   parse   │  │  timestamp  │               │   │
//! │  │   │ DeviceRow │  │ pm list   │  │ stat -c %y  │               │   │
//! │  │   │ FileRow   │  │ dumpsys   │  │             │               │   │
//! │  │   │ Selectors │  │ ls -R     │  │             │               │   │
//! │  │   └───────────┘  └───────────┘  └─────────────┘               │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Index rows, snapshots and selectors
//! - [`parse`] - Parsers for the free-text output of device commands
//! - [`timestamp`] - Remote file modification timestamps
//! - [`error`] - Parse error types
//!
//! ## Example Usage
//!
//! ```rust
//! use mirror_core::parse::parse_package_list;
//!
//! let packages = parse_package_list("package:com.example.app\npackage:org.demo\n");
//! assert_eq!(packages, vec!["com.example.app", "org.demo"]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod parse;
pub mod timestamp;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreResult, ParseError};
pub use timestamp::RemoteTimestamp;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Selector value matching every device or every package.
pub const WILDCARD: &str = "*";

/// Default remote prefix under which application private storage lives.
///
/// The package name is appended directly, so the trailing slash matters.
pub const DEFAULT_APPLICATION_DATA_ROOT: &str = "/data/data/";
