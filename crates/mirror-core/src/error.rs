//! # Error Types
//!
//! Parse errors raised while interpreting device command output.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  mirror-core errors (this file)                                        │
//! │  └── ParseError       - Unparsable shell output                        │
//! │                                                                         │
//! │  mirror-db errors (separate crate)                                     │
//! │  └── DbError          - SQLite failures                                │
//! │                                                                         │
//! │  mirror-sync errors (separate crate)                                   │
//! │  └── SyncError        - What the scheduler and consumers see           │
//! │                                                                         │
//! │  Flow: ParseError → SyncError::Parse → per-item skip or halted cycle   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Failure to interpret the output of a remote command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// `stat -c %y` answered with something that is not a timestamp.
    ///
    /// ## When This Occurs
    /// - The file does not exist (stat prints an error instead)
    /// - `run-as` refused the package
    #[error("Invalid modification timestamp '{input}': {reason}")]
    InvalidTimestamp { input: String, reason: String },

    /// No line of `dumpsys package` contains the `dataDir` marker.
    #[error("dataDir not found in package dump")]
    DataDirNotFound,

    /// The `dataDir` line could not be split into a key and a path.
    #[error("Malformed dataDir line: '{0}'")]
    MalformedDataDir(String),

    /// A `host:devices` line did not have the `serial<TAB>state` shape.
    #[error("Malformed device line: '{0}'")]
    MalformedDeviceLine(String),

    /// A base64 dump could not be decoded.
    #[error("Invalid base64 payload: {0}")]
    InvalidPayload(String),
}

/// Result type for parsing operations.
pub type CoreResult<T> = Result<T, ParseError>;
