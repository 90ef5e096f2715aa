//! # Remote Data Puller
//!
//! Copies a database off the device through the shell.
//!
//! ```text
//! run-as <pkg> base64 -w 0 <path>
//!        │  one line of base64 on stdout
//!        ▼
//! trim → decode → <scratch>/<db name>.XXXXXX   (TempPath, removed on drop)
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

use crate::error::SyncResult;
use crate::gateway::{commands, DeviceHandle, ShellGateway};
use mirror_core::{ParseError, RemoteTimestamp};

/// A database copy on local disk that has not been installed yet.
///
/// Dropping it deletes the file.
#[derive(Debug)]
pub struct PulledCopy {
    pub path: TempPath,
    pub timestamp: RemoteTimestamp,
}

/// Pulls remote files into a scratch directory.
#[derive(Debug, Clone)]
pub struct RemotePuller {
    scratch_dir: PathBuf,
}

impl RemotePuller {
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        RemotePuller {
            scratch_dir: scratch_dir.into(),
        }
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Pulls `remote_path` and writes it to a fresh scratch file.
    ///
    /// ## Errors
    /// - `RemoteExecution` if the dump command could not run
    /// - `Parse` for an empty or undecodable payload
    /// - `Io` if the scratch file cannot be written
    pub async fn pull(
        &self,
        gateway: &dyn ShellGateway,
        device: &DeviceHandle,
        package: &str,
        remote_path: &str,
        timestamp: RemoteTimestamp,
    ) -> SyncResult<PulledCopy> {
        let output = gateway
            .execute_shell(device, &commands::base64_dump(package, remote_path))
            .await?;

        let payload = output.trim();
        if payload.is_empty() {
            return Err(ParseError::InvalidPayload(format!("empty dump of {}", remote_path)).into());
        }
        let bytes = STANDARD.decode(payload)?;

        let path = self.write_scratch(remote_path, &bytes)?;

        debug!(
            serial = %device,
            remote = %remote_path,
            local = %path.display(),
            bytes = bytes.len(),
            "Pulled remote database"
        );

        Ok(PulledCopy { path, timestamp })
    }

    fn write_scratch(&self, remote_path: &str, bytes: &[u8]) -> SyncResult<TempPath> {
        std::fs::create_dir_all(&self.scratch_dir)?;

        let prefix = file_name(remote_path);
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}.", prefix))
            .tempfile_in(&self.scratch_dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(file.into_temp_path())
    }
}

/// Last path segment, used to name scratch files.
fn file_name(remote_path: &str) -> &str {
    remote_path
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("mirror")
}
