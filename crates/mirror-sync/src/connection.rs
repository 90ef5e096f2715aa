//! # Connection Strings
//!
//! Parses `adb://<device>/<package>[/<db path>][?k=v&...]`.
//!
//! ```text
//! adb://emulator-5554/com.example.app/databases/main.db?period=5000
//!       └─────┬─────┘ └──────┬──────┘└────────┬────────┘ └───┬───┘
//!          device         package          db path        params
//!
//! db path present → data mirror
//! db path absent  → metadata mirror
//! ```
//!
//! The device part is taken verbatim, so network serials such as
//! `192.168.1.20:5555` work. A leading `jdbc:` is accepted and dropped.

use std::fmt;

use tracing::debug;

use crate::config::MirrorConfig;
use crate::error::{SyncError, SyncResult};
use crate::task::TaskSpec;
use mirror_core::{DeviceSelector, PackageSelector};

const SCHEME: &str = "adb://";
const LEGACY_PREFIX: &str = "jdbc:";

/// Which kind of mirror a connection string asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorKind {
    Data,
    Metadata,
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub device: DeviceSelector,
    pub package: PackageSelector,
    /// Path of the database relative to the package root, with its leading
    /// slash (`/databases/main.db`).
    pub db_path: Option<String>,
    /// Query parameters in the order given, percent-decoded.
    pub params: Vec<(String, String)>,
}

impl ConnectionTarget {
    /// Parses a connection string.
    pub fn parse(input: &str) -> SyncResult<Self> {
        let input = input.trim();
        let input = input.strip_prefix(LEGACY_PREFIX).unwrap_or(input);
        let rest = input.strip_prefix(SCHEME).ok_or_else(|| {
            SyncError::InvalidConnectionString(format!("expected {}..., got: {}", SCHEME, input))
        })?;

        let (location, query) = match rest.split_once('?') {
            Some((location, query)) => (location, Some(query)),
            None => (rest, None),
        };

        let (device, path) = location.split_once('/').ok_or_else(|| {
            SyncError::InvalidConnectionString(format!("missing package in: {}", input))
        })?;
        if device.is_empty() {
            return Err(SyncError::InvalidConnectionString(format!(
                "missing device in: {}",
                input
            )));
        }

        let (package, db_path) = match path.split_once('/') {
            Some((package, tail)) if !tail.is_empty() => (package, Some(format!("/{}", tail))),
            Some((package, _)) => (package, None),
            None => (path, None),
        };
        if package.is_empty() {
            return Err(SyncError::InvalidConnectionString(format!(
                "missing package in: {}",
                input
            )));
        }

        let params = match query {
            Some(query) if !query.is_empty() => parse_params(query)?,
            _ => Vec::new(),
        };

        let target = ConnectionTarget {
            device: DeviceSelector::parse(device),
            package: PackageSelector::parse(package),
            db_path,
            params,
        };

        debug!(target = %target, "Parsed connection string");
        Ok(target)
    }

    pub fn kind(&self) -> MirrorKind {
        match self.db_path {
            Some(_) => MirrorKind::Data,
            None => MirrorKind::Metadata,
        }
    }

    /// Layers the connection parameters over `base` and builds the task spec.
    pub fn task_spec(&self, base: MirrorConfig) -> SyncResult<TaskSpec> {
        let mut config = base;
        config.apply_params(self.params.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        Ok(TaskSpec {
            device: self.device.clone(),
            package: self.package.clone(),
            db_path: self.db_path.clone(),
            config,
        })
    }
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}/{}{}",
            SCHEME,
            self.device,
            self.package,
            self.db_path.as_deref().unwrap_or("")
        )
    }
}

impl std::str::FromStr for ConnectionTarget {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConnectionTarget::parse(s)
    }
}

/// Splits `k=v&k=v`. Every pair needs exactly one `=`; keys may not repeat.
fn parse_params(query: &str) -> SyncResult<Vec<(String, String)>> {
    let mut params: Vec<(String, String)> = Vec::new();

    for pair in query.split('&') {
        if pair.matches('=').count() != 1 {
            return Err(SyncError::InvalidConnectionString(format!(
                "broken parameter [{}]",
                pair
            )));
        }

        let (key, value) = url::form_urlencoded::parse(pair.as_bytes())
            .next()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .ok_or_else(|| {
                SyncError::InvalidConnectionString(format!("broken parameter [{}]", pair))
            })?;

        if key.is_empty() {
            return Err(SyncError::InvalidConnectionString(format!(
                "broken parameter [{}]",
                pair
            )));
        }
        if params.iter().any(|(k, _)| *k == key) {
            return Err(SyncError::InvalidConnectionString(format!(
                "duplicate parameter [{}]",
                key
            )));
        }

        params.push((key, value));
    }

    Ok(params)
}
