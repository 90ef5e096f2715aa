//! # Data Sync Task
//!
//! Keeps one local copy of one on-device database current.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list_devices()                                                         │
//! │       │                                                                 │
//! │       ▼  for each device the selector allows                           │
//! │  stat -c %y <root><pkg><db path>                                       │
//! │       │                                                                 │
//! │       ├── same as this device's last timestamp → next device           │
//! │       ▼                                                                 │
//! │  changed: remember (serial, ts); this device is the candidate          │
//! │       │                                                                 │
//! │       ▼  after the last device, if any device changed                  │
//! │  base64 -w 0 … from the candidate → open pool → gate.swap()            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  record ts for every changed device                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Timestamps are tracked per device serial. With several matching devices
//! the copy comes from the last changed device in enumeration order, and a
//! cycle in which no device changed leaves the mirror alone.
//!
//! Any failure ends the cycle with an error, which halts the scheduler.
//! The installed mirror is left as it was and nothing is recorded.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::gate::{ActiveMirror, SwapGate};
use crate::gateway::{DeviceHandle, ShellGateway};
use crate::puller::RemotePuller;
use crate::staleness::StalenessDetector;
use crate::task::{SyncTask, TaskSpec};
use mirror_core::{DeviceSelector, RemoteTimestamp};
use mirror_db::MirrorOptions;

/// Refreshes the mirror behind a [`SwapGate`].
pub struct DataSyncTask {
    label: String,
    device: DeviceSelector,
    package: String,
    remote_path: String,
    gateway: Arc<dyn ShellGateway>,
    gate: Arc<SwapGate>,
    detectors: HashMap<String, StalenessDetector>,
    puller: RemotePuller,
}

impl DataSyncTask {
    /// Builds the task. `spec` must name one package and a db path.
    pub fn new(
        spec: &TaskSpec,
        gateway: Arc<dyn ShellGateway>,
        gate: Arc<SwapGate>,
    ) -> SyncResult<Self> {
        let package = spec.package.name().ok_or_else(|| {
            SyncError::InvalidConfig("a data mirror needs an explicit package name".into())
        })?;
        let remote_path = spec.remote_db_path().ok_or_else(|| {
            SyncError::InvalidConfig("a data mirror needs a database path".into())
        })?;

        Ok(DataSyncTask {
            label: format!("data {}:{}", spec.device, remote_path),
            device: spec.device.clone(),
            package: package.to_string(),
            remote_path,
            gateway,
            gate,
            detectors: HashMap::new(),
            puller: RemotePuller::new(spec.config.device.scratch_dir()),
        })
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Last installed timestamp seen on `serial`, if any.
    pub fn last_observed(&self, serial: &str) -> Option<&RemoteTimestamp> {
        self.detectors.get(serial).and_then(|d| d.last_observed())
    }

    async fn is_selected(&self, device: &DeviceHandle) -> bool {
        if !self.device.needs_display_name(device.serial()) {
            return self.device.allows(device.serial(), None);
        }
        let name = self.gateway.identify(device).await;
        self.device.allows(device.serial(), name.as_deref())
    }
}

#[async_trait]
impl SyncTask for DataSyncTask {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run_cycle(&mut self) -> SyncResult<()> {
        let devices = self.gateway.list_devices().await?;

        let mut changed: Vec<(String, RemoteTimestamp)> = Vec::new();
        let mut candidate: Option<(&DeviceHandle, RemoteTimestamp)> = None;

        for device in &devices {
            if !self.is_selected(device).await {
                continue;
            }

            let detector = self.detectors.entry(device.serial().to_string()).or_default();
            let timestamp = detector
                .fetch_timestamp(self.gateway.as_ref(), device, &self.package, &self.remote_path)
                .await?;

            if !detector.needs_refresh(&timestamp) {
                debug!(serial = %device, %timestamp, "Remote database unchanged");
                continue;
            }

            changed.push((device.serial().to_string(), timestamp));
            candidate = Some((device, timestamp));
        }

        let Some((device, timestamp)) = candidate else {
            return Ok(());
        };

        let copy = self
            .puller
            .pull(self.gateway.as_ref(), device, &self.package, &self.remote_path, timestamp)
            .await?;
        let mirror = ActiveMirror::open(copy, device.serial(), &MirrorOptions::default()).await?;
        self.gate.swap(mirror).await;

        for (serial, seen) in changed {
            if let Some(detector) = self.detectors.get_mut(&serial) {
                detector.record(seen);
            }
        }

        info!(
            serial = %device,
            remote = %self.remote_path,
            %timestamp,
            "Mirror refreshed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MirrorConfig;
    use mirror_core::PackageSelector;

    struct NoDevices;

    #[async_trait]
    impl ShellGateway for NoDevices {
        async fn list_devices(&self) -> SyncResult<Vec<DeviceHandle>> {
            Ok(vec![])
        }

        async fn execute_shell(&self, device: &DeviceHandle, command: &str) -> SyncResult<String> {
            Err(SyncError::remote(device.serial(), command, "unexpected"))
        }
    }

    fn spec(package: &str, db_path: Option<&str>) -> TaskSpec {
        TaskSpec {
            device: DeviceSelector::Any,
            package: PackageSelector::parse(package),
            db_path: db_path.map(str::to_string),
            config: MirrorConfig::default(),
        }
    }

    #[test]
    fn test_requires_package_and_path() {
        let gateway: Arc<dyn ShellGateway> = Arc::new(NoDevices);
        let gate = Arc::new(SwapGate::new());

        assert!(DataSyncTask::new(&spec("*", Some("/databases/a.db")), gateway.clone(), gate.clone()).is_err());
        assert!(DataSyncTask::new(&spec("com.x", None), gateway.clone(), gate.clone()).is_err());

        let task = DataSyncTask::new(&spec("com.x", Some("/databases/a.db")), gateway, gate).unwrap();
        assert_eq!(task.remote_path(), "/data/data/com.x/databases/a.db");
    }

    #[tokio::test]
    async fn test_no_devices_is_a_quiet_cycle() {
        let gate = Arc::new(SwapGate::new());
        let mut task =
            DataSyncTask::new(&spec("com.x", Some("/databases/a.db")), Arc::new(NoDevices), gate.clone())
                .unwrap();

        task.run_cycle().await.unwrap();
        assert!(!gate.is_ready());
        assert!(task.detectors.is_empty());
    }
}
