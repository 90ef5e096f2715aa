//! # Staleness Detector
//!
//! Decides whether the remote database on one device changed since the
//! last install from that device.
//!
//! ```text
//! run-as <pkg> stat -c %y <path>
//!        │
//!        ▼
//! RemoteTimestamp ──► needs_refresh(ts)?  ── last is None        → yes
//!                                         ── ts != last           → yes
//!                                         ── ts == last           → no
//!
//! record(ts) ◄── only after the pulled copy is installed
//! ```
//!
//! The comparison is plain inequality: a timestamp that moves backwards
//! (restored backup, clock change) also counts as a change.

use tracing::debug;

use crate::error::SyncResult;
use crate::gateway::{commands, DeviceHandle, ShellGateway};
use mirror_core::RemoteTimestamp;

/// Tracks the last installed remote timestamp of one device's database.
#[derive(Debug, Clone, Default)]
pub struct StalenessDetector {
    last_observed: Option<RemoteTimestamp>,
}

impl StalenessDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the remote modification time of `path`.
    ///
    /// ## Errors
    /// - `RemoteExecution` if `stat` could not run
    /// - `Parse` if its output is not a timestamp (missing file, denied)
    pub async fn fetch_timestamp(
        &self,
        gateway: &dyn ShellGateway,
        device: &DeviceHandle,
        package: &str,
        path: &str,
    ) -> SyncResult<RemoteTimestamp> {
        let output = gateway
            .execute_shell(device, &commands::stat_mtime(package, path))
            .await?;
        let timestamp = RemoteTimestamp::parse(&output)?;

        debug!(serial = %device, path = %path, %timestamp, "Remote timestamp");
        Ok(timestamp)
    }

    /// True if a copy with `timestamp` should replace the installed one.
    pub fn needs_refresh(&self, timestamp: &RemoteTimestamp) -> bool {
        self.last_observed.as_ref() != Some(timestamp)
    }

    /// Remembers `timestamp` as installed.
    pub fn record(&mut self, timestamp: RemoteTimestamp) {
        self.last_observed = Some(timestamp);
    }

    pub fn last_observed(&self) -> Option<&RemoteTimestamp> {
        self.last_observed.as_ref()
    }
}
