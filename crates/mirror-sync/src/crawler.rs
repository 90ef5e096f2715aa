//! # Metadata Crawler
//!
//! Rebuilds the device / package / file index from shell output.
//!
//! ## Cycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  gather()                                    (no database access)       │
//! │    every device      → DeviceRow (display name, best effort)           │
//! │    allowed devices   → packages: explicit name | pm list packages -3   │
//! │      each package    → ls -R <root><pkg>   empty / not debuggable: skip │
//! │                      → dumpsys package     no dataDir: skip             │
//! │                      → PackageRow                                       │
//! │                      → ls -R <dataDir>     failure: no files            │
//! │                      → FileRow*                                         │
//! │                                                                         │
//! │  replace(snapshot)                           (one transaction)          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Failures tied to one package or one device are logged and skipped.
//! Failing to enumerate devices, or to write the index, ends the cycle.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SyncResult;
use crate::gateway::{commands, DeviceHandle, ShellGateway};
use crate::task::{SyncTask, TaskSpec};
use mirror_core::parse::{is_not_debuggable, parse_data_dir, parse_file_listing, parse_package_list};
use mirror_core::{DeviceRow, FileRow, IndexSnapshot, PackageRow, PackageSelector};
use mirror_db::Database;

/// Periodic rebuild of the metadata index.
pub struct MetadataCrawler {
    label: String,
    spec: TaskSpec,
    gateway: Arc<dyn ShellGateway>,
    db: Database,
}

impl MetadataCrawler {
    pub fn new(spec: TaskSpec, gateway: Arc<dyn ShellGateway>, db: Database) -> Self {
        MetadataCrawler {
            label: format!("metadata {}/{}", spec.device, spec.package),
            spec,
            gateway,
            db,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Collects one snapshot from the attached devices.
    pub async fn gather(&self) -> SyncResult<IndexSnapshot> {
        let devices = self.gateway.list_devices().await?;
        let mut snapshot = IndexSnapshot::default();

        for device in &devices {
            let name = self.gateway.identify(device).await;
            let allowed = self.spec.device.allows(device.serial(), name.as_deref());

            snapshot.devices.push(DeviceRow {
                serial: device.serial().to_string(),
                name,
            });

            if !allowed {
                debug!(serial = %device, "Device not selected, indexing the row only");
                continue;
            }

            for package in self.packages_on(device).await? {
                match self.crawl_package(device, &package).await {
                    Ok(Some((row, files))) => {
                        snapshot.packages.push(row);
                        snapshot.files.extend(files);
                    }
                    Ok(None) => {}
                    Err(e) if e.is_item_local() => {
                        warn!(serial = %device, package = %package, error = %e, "Skipping package");
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(snapshot)
    }

    async fn packages_on(&self, device: &DeviceHandle) -> SyncResult<Vec<String>> {
        match &self.spec.package {
            PackageSelector::Exact(name) => Ok(vec![name.clone()]),
            PackageSelector::Any => {
                match self
                    .gateway
                    .execute_shell(device, commands::LIST_THIRD_PARTY_PACKAGES)
                    .await
                {
                    Ok(output) => Ok(parse_package_list(&output)),
                    Err(e) if e.is_item_local() => {
                        warn!(serial = %device, error = %e, "Could not list packages");
                        Ok(Vec::new())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Indexes one package. `Ok(None)` means the package is not readable
    /// through `run-as` and is left out.
    async fn crawl_package(
        &self,
        device: &DeviceHandle,
        package: &str,
    ) -> SyncResult<Option<(PackageRow, Vec<FileRow>)>> {
        let root = self.spec.package_root(package);
        let listing = self
            .gateway
            .execute_shell(device, &commands::list_recursive(package, &root))
            .await?;

        if listing.trim().is_empty() || is_not_debuggable(&listing) {
            debug!(serial = %device, package = %package, "Package not debuggable");
            return Ok(None);
        }

        let dump = self
            .gateway
            .execute_shell(device, &commands::dump_package(package))
            .await?;
        let data_dir = parse_data_dir(&dump)?;

        let files = if self.spec.config.device.show_all_files_in_package {
            self.list_files(device, package, &data_dir).await?
        } else {
            Vec::new()
        };

        let row = PackageRow {
            serial: device.serial().to_string(),
            name: package.to_string(),
            data_path: data_dir,
        };
        Ok(Some((row, files)))
    }

    async fn list_files(
        &self,
        device: &DeviceHandle,
        package: &str,
        data_dir: &str,
    ) -> SyncResult<Vec<FileRow>> {
        match self
            .gateway
            .execute_shell(device, &commands::list_recursive(package, data_dir))
            .await
        {
            Ok(output) => Ok(parse_file_listing(device.serial(), package, data_dir, &output)),
            Err(e) if e.is_item_local() => {
                warn!(serial = %device, package = %package, error = %e, "Could not list files");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl SyncTask for MetadataCrawler {
    fn name(&self) -> &str {
        &self.label
    }

    async fn run_cycle(&mut self) -> SyncResult<()> {
        let snapshot = self.gather().await?;
        let summary = self.db.index().replace(&snapshot).await?;

        info!(
            devices = summary.devices,
            packages = summary.packages,
            files = summary.files,
            skipped = summary.skipped,
            "Metadata index rebuilt"
        );
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
