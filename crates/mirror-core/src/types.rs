//! # Domain Types
//!
//! Rows of the metadata index and the selectors that decide which devices
//! and packages a task looks at.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Index Rows                                      │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │   DeviceRow     │   │   PackageRow    │   │      FileRow        │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  serial (PK)    │◄──│  serial         │◄──│  serial             │   │
//! │  │  name (opt.)    │ 1:N  name           │ 1:N  package_name       │   │
//! │  └─────────────────┘   │  data_path      │   │  dir_path           │   │
//! │                        └─────────────────┘   │  file_name          │   │
//! │                                              │  full_path          │   │
//! │                                              └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ DeviceSelector  │   │ PackageSelector │                             │
//! │  │  Any  ("*")     │   │  Any  ("*")     │                             │
//! │  │  Exact(name|ser)│   │  Exact(name)    │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::WILDCARD;

// =============================================================================
// Index Rows
// =============================================================================

/// A device seen during a crawl.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceRow {
    /// Stable adb serial.
    pub serial: String,

    /// `ro.product.model`, when the device answered.
    pub name: Option<String>,
}

/// A package whose private storage is reachable through `run-as`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageRow {
    pub serial: String,
    pub name: String,
    /// Private data directory reported by `dumpsys package`.
    pub data_path: String,
}

/// A regular file found under a package's private storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileRow {
    pub serial: String,
    pub package_name: String,
    pub dir_path: String,
    pub file_name: String,
    pub full_path: String,
}

impl FileRow {
    /// Builds a row, deriving `full_path` as `dir_path/file_name`.
    pub fn new(
        serial: impl Into<String>,
        package_name: impl Into<String>,
        dir_path: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        let dir_path = dir_path.into();
        let file_name = file_name.into();
        let full_path = format!("{}/{}", dir_path, file_name);
        FileRow {
            serial: serial.into(),
            package_name: package_name.into(),
            dir_path,
            file_name,
            full_path,
        }
    }
}

/// Everything one crawl cycle observed.
///
/// Written to the index as a whole; the previous snapshot is discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub devices: Vec<DeviceRow>,
    pub packages: Vec<PackageRow>,
    pub files: Vec<FileRow>,
}

impl IndexSnapshot {
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty() && self.packages.is_empty() && self.files.is_empty()
    }
}

// =============================================================================
// Selectors
// =============================================================================

/// Which devices a task is interested in.
///
/// ## Matching Rule
/// A device is in scope iff the selector is `*`, or equals the device's
/// display name, or equals its serial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceSelector {
    /// `*` - every attached device.
    Any,
    /// A display name (`ro.product.model`) or a serial.
    Exact(String),
}

impl DeviceSelector {
    /// Parses a selector; `*` is the wildcard, anything else is literal.
    pub fn parse(value: &str) -> Self {
        if value == WILDCARD {
            DeviceSelector::Any
        } else {
            DeviceSelector::Exact(value.to_string())
        }
    }

    /// Returns true if the device with this serial and display name is in scope.
    pub fn allows(&self, serial: &str, display_name: Option<&str>) -> bool {
        match self {
            DeviceSelector::Any => true,
            DeviceSelector::Exact(wanted) => {
                display_name == Some(wanted.as_str()) || serial == wanted
            }
        }
    }

    /// Returns true if the serial alone does not settle [`allows`](Self::allows),
    /// so the device has to be asked for its display name.
    pub fn needs_display_name(&self, serial: &str) -> bool {
        match self {
            DeviceSelector::Any => false,
            DeviceSelector::Exact(wanted) => wanted != serial,
        }
    }
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Any => write!(f, "{}", WILDCARD),
            DeviceSelector::Exact(value) => write!(f, "{}", value),
        }
    }
}

/// Which packages a crawl enumerates on an allowed device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageSelector {
    /// `*` - every third-party package (`pm list packages -3`).
    Any,
    /// A single package name.
    Exact(String),
}

impl PackageSelector {
    pub fn parse(value: &str) -> Self {
        if value == WILDCARD {
            PackageSelector::Any
        } else {
            PackageSelector::Exact(value.to_string())
        }
    }

    /// The concrete package name, if this selector names one.
    pub fn name(&self) -> Option<&str> {
        match self {
            PackageSelector::Any => None,
            PackageSelector::Exact(name) => Some(name),
        }
    }
}

impl fmt::Display for PackageSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageSelector::Any => write!(f, "{}", WILDCARD),
            PackageSelector::Exact(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_allows_everything() {
        let selector = DeviceSelector::parse("*");
        assert_eq!(selector, DeviceSelector::Any);
        assert!(selector.allows("emulator-5554", None));
        assert!(selector.allows("R58M123", Some("SM-G973F")));
    }

    #[test]
    fn test_exact_matches_name_or_serial() {
        let by_name = DeviceSelector::parse("SM-G973F");
        assert!(by_name.allows("R58M123", Some("SM-G973F")));
        assert!(!by_name.allows("R58M123", None));
        assert!(!by_name.allows("R58M123", Some("Pixel 5")));

        let by_serial = DeviceSelector::parse("emulator-5554");
        assert!(by_serial.allows("emulator-5554", None));
        assert!(by_serial.allows("emulator-5554", Some("sdk_gphone64")));
    }

    #[test]
    fn test_needs_display_name() {
        assert!(!DeviceSelector::Any.needs_display_name("x"));
        assert!(!DeviceSelector::parse("x").needs_display_name("x"));
        assert!(DeviceSelector::parse("Pixel 5").needs_display_name("x"));
    }

    #[test]
    fn test_package_selector() {
        assert_eq!(PackageSelector::parse("*").name(), None);
        assert_eq!(
            PackageSelector::parse("com.example.app").name(),
            Some("com.example.app")
        );
        assert_eq!(PackageSelector::Any.to_string(), "*");
    }

    #[test]
    fn test_file_row_full_path() {
        let row = FileRow::new("A", "com.example.app", "/data/user/0/com.example.app/databases", "main.db");
        assert_eq!(row.full_path, "/data/user/0/com.example.app/databases/main.db");
    }

    #[test]
    fn test_rows_serialize_as_plain_objects() {
        let row = DeviceRow {
            serial: "emulator-5554".into(),
            name: Some("sdk_gphone64".into()),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"serial":"emulator-5554","name":"sdk_gphone64"}"#);
    }
}
