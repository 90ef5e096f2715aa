//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Remote        │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Transport      │  │  Parse                  │ │
//! │  │  InvalidConn... │  │  RemoteExec...  │  │  Storage                │ │
//! │  │  ConfigLoad...  │  │                 │  │  Io                     │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │  Consumer       │  │  Lifecycle                                  │  │
//! │  │                 │  │                                             │  │
//! │  │  HandleUnavail. │  │  ShuttingDown, Halted                       │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Propagation
//!
//! The metadata crawler isolates [`SyncError::is_item_local`] failures to the
//! package they occurred in. Everything else, and every failure inside the
//! data task, ends the cycle and halts the scheduler.

use mirror_core::ParseError;
use mirror_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid mirror configuration.
    #[error("Invalid mirror configuration: {0}")]
    InvalidConfig(String),

    /// Connection string could not be parsed.
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The device bridge could not be reached or spoke nonsense.
    ///
    /// ## When This Occurs
    /// - The adb server is not running
    /// - The device listing reply is malformed
    #[error("Transport error: {0}")]
    Transport(String),

    /// A shell command could not be run on a device.
    #[error("Command `{command}` failed on {serial}: {message}")]
    RemoteExecution {
        serial: String,
        command: String,
        message: String,
    },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Command output did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Local database failure.
    #[error("Storage error: {0}")]
    Storage(#[from] DbError),

    /// Local filesystem failure (scratch files).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Consumer Errors
    // =========================================================================
    /// No mirror has been installed yet.
    #[error("No mirror handle is available yet")]
    HandleUnavailable,

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// The mirror is closing.
    #[error("Mirror is shutting down")]
    ShuttingDown,

    /// The scheduler stopped after a failed cycle.
    #[error("Sync halted: {0}")]
    Halted(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<base64::DecodeError> for SyncError {
    fn from(err: base64::DecodeError) -> Self {
        SyncError::Parse(ParseError::InvalidPayload(err.to_string()))
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Builds a [`SyncError::RemoteExecution`].
    pub fn remote(serial: &str, command: &str, message: impl Into<String>) -> Self {
        SyncError::RemoteExecution {
            serial: serial.to_string(),
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// Returns true if the failure concerns one package or file and the
    /// crawler may log it and move on.
    pub fn is_item_local(&self) -> bool {
        matches!(self, SyncError::RemoteExecution { .. } | SyncError::Parse(_))
    }

    /// Returns true if retrying the same operation later may succeed.
    ///
    /// ## Retryable Errors
    /// - No handle installed yet
    /// - Bridge unreachable
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::HandleUnavailable | SyncError::Transport(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidConnectionString(_)
                | SyncError::ConfigLoadFailed(_)
        )
    }
}
