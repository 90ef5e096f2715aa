//! # Remote Shell Gateway
//!
//! The seam between the engine and whatever runs commands on devices.
//!
//! ```text
//! ┌──────────────────┐      list_devices()       ┌──────────────────────┐
//! │  DataSyncTask    │ ────────────────────────► │  dyn ShellGateway    │
//! │  MetadataCrawler │      execute_shell(d, c)  │                      │
//! │                  │ ────────────────────────► │  AdbClient (TCP)     │
//! │                  │ ◄──────────────────────── │  test fakes          │
//! └──────────────────┘      stdout as String     └──────────────────────┘
//! ```
//!
//! Commands are opaque strings. The builders in [`commands`] are the only
//! command shapes the engine issues.

use async_trait::async_trait;
use std::fmt;
use tracing::debug;

use crate::error::SyncResult;
use mirror_core::parse::parse_display_name;

/// An attached device, identified by its serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceHandle {
    serial: String,
}

impl DeviceHandle {
    pub fn new(serial: impl Into<String>) -> Self {
        DeviceHandle {
            serial: serial.into(),
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }
}

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serial)
    }
}

/// Runs shell commands on attached devices.
#[async_trait]
pub trait ShellGateway: Send + Sync {
    /// Lists attached, usable devices. An empty list is not an error.
    ///
    /// ## Errors
    /// `SyncError::Transport` when the bridge cannot be reached.
    async fn list_devices(&self) -> SyncResult<Vec<DeviceHandle>>;

    /// Runs `command` on `device` and returns its standard output.
    ///
    /// ## Errors
    /// `SyncError::RemoteExecution` when the command cannot be run.
    async fn execute_shell(&self, device: &DeviceHandle, command: &str) -> SyncResult<String>;

    /// Best-effort display name (`ro.product.model`). Failures are logged and
    /// reported as `None`.
    async fn identify(&self, device: &DeviceHandle) -> Option<String> {
        match self.execute_shell(device, commands::PRODUCT_MODEL).await {
            Ok(output) => parse_display_name(&output),
            Err(e) => {
                debug!(serial = %device, error = %e, "Could not resolve display name");
                None
            }
        }
    }
}

/// Builders for every command the engine sends to a device.
pub mod commands {
    /// Device model, used as the display name.
    pub const PRODUCT_MODEL: &str = "getprop ro.product.model";

    /// Third-party packages, one `package:<name>` per line.
    pub const LIST_THIRD_PARTY_PACKAGES: &str = "pm list packages -3";

    pub fn dump_package(package: &str) -> String {
        format!("dumpsys package {}", package)
    }

    /// Modification time of `path`, as seen by the package's own user.
    pub fn stat_mtime(package: &str, path: &str) -> String {
        format!("run-as {} stat -c %y {}", package, path)
    }

    /// Contents of `path` as one unwrapped base64 line.
    pub fn base64_dump(package: &str, path: &str) -> String {
        format!("run-as {} base64 -w 0 {}", package, path)
    }

    /// Recursive, comma-separated listing with `/` after directories.
    pub fn list_recursive(package: &str, path: &str) -> String {
        format!("run-as {} ls -R -C -m -p {}", package, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;

    struct Scripted {
        model: SyncResult<String>,
    }

    #[async_trait]
    impl ShellGateway for Scripted {
        async fn list_devices(&self) -> SyncResult<Vec<DeviceHandle>> {
            Ok(vec![DeviceHandle::new("emulator-5554")])
        }

        async fn execute_shell(&self, device: &DeviceHandle, command: &str) -> SyncResult<String> {
            assert_eq!(command, commands::PRODUCT_MODEL);
            match &self.model {
                Ok(out) => Ok(out.clone()),
                Err(_) => Err(SyncError::remote(device.serial(), command, "closed")),
            }
        }
    }

    #[tokio::test]
    async fn test_identify_trims_model() {
        let gateway = Scripted {
            model: Ok("Pixel 7\r\n".into()),
        };
        let name = gateway.identify(&DeviceHandle::new("emulator-5554")).await;
        assert_eq!(name.as_deref(), Some("Pixel 7"));
    }

    #[tokio::test]
    async fn test_identify_swallows_failures() {
        let empty = Scripted { model: Ok("  \n".into()) };
        assert_eq!(empty.identify(&DeviceHandle::new("a")).await, None);

        let failing = Scripted {
            model: Err(SyncError::Transport("down".into())),
        };
        assert_eq!(failing.identify(&DeviceHandle::new("a")).await, None);
    }

    #[test]
    fn test_command_shapes() {
        assert_eq!(commands::dump_package("com.x"), "dumpsys package com.x");
        assert_eq!(
            commands::stat_mtime("com.x", "/data/data/com.x/databases/main.db"),
            "run-as com.x stat -c %y /data/data/com.x/databases/main.db"
        );
        assert_eq!(
            commands::base64_dump("com.x", "/d"),
            "run-as com.x base64 -w 0 /d"
        );
        assert_eq!(
            commands::list_recursive("com.x", "/data/data/com.x"),
            "run-as com.x ls -R -C -m -p /data/data/com.x"
        );
    }
}
