//! # Sync Tasks
//!
//! One config value ([`TaskSpec`]) and one capability ([`SyncTask`]) shared
//! by both kinds of mirror.

use async_trait::async_trait;

use crate::config::MirrorConfig;
use crate::error::SyncResult;
use mirror_core::{DeviceSelector, PackageSelector};

/// Something the scheduler runs once per cycle.
#[async_trait]
pub trait SyncTask: Send {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Runs one refresh. An error halts the scheduler.
    async fn run_cycle(&mut self) -> SyncResult<()>;
}

/// What to mirror and how often.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSpec {
    /// Which devices the task reads: a serial, a display name, or `*`.
    ///
    /// `*` matches every attached device. A data task then keeps one mirror
    /// fed from all of them: each device's timestamp is tracked on its own,
    /// and when several changed in the same cycle the copy comes from the
    /// last one in `host:devices` order. A cycle where no device changed
    /// installs nothing.
    pub device: DeviceSelector,
    pub package: PackageSelector,
    /// Database path relative to the package root (`/databases/main.db`).
    /// `None` for the metadata crawl.
    pub db_path: Option<String>,
    pub config: MirrorConfig,
}

impl TaskSpec {
    /// Remote path of the mirrored database:
    /// `<data root><package><db path>`.
    pub fn remote_db_path(&self) -> Option<String> {
        let package = self.package.name()?;
        let db_path = self.db_path.as_deref()?;
        Some(format!(
            "{}{}{}",
            self.config.device.application_data_root_path, package, db_path
        ))
    }

    /// Directory a crawl lists to check that `package` is debuggable.
    pub fn package_root(&self, package: &str) -> String {
        format!("{}{}", self.config.device.application_data_root_path, package)
    }
}
