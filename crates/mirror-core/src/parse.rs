//! # Shell Output Parsers
//!
//! Every remote command the engine issues answers in free text. This module
//! turns that text into rows.
//!
//! ## Commands and Their Parsers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Command                                  Parser                        │
//! │  ───────────────────────────────────────  ──────────────────────────   │
//! │  adb host:devices                         parse_device_list            │
//! │  getprop ro.product.model                 parse_display_name           │
//! │  pm list packages -3                      parse_package_list           │
//! │  run-as <pkg> ls -R -C -m -p <dir>        is_not_debuggable            │
//! │                                           parse_file_listing           │
//! │  dumpsys package <pkg>                    parse_data_dir               │
//! │  run-as <pkg> stat -c %y <path>           RemoteTimestamp::parse       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## `ls -R -C -m -p` Output
//! ```text
//! /data/user/0/com.example.app:                ◄── directory header
//! cache/, databases/, shared_prefs/            ◄── entries (dirs end in /)
//!
//! /data/user/0/com.example.app/databases:
//! main.db, main.db-journal                     ◄── two FileRows
//! ```

use crate::error::{CoreResult, ParseError};
use crate::types::FileRow;

/// First line printed by `run-as` for a release build.
pub const NOT_DEBUGGABLE_PREFIX: &str = "run-as: package not debuggable";

/// Suffix of the line printed when a listed path does not exist.
pub const NO_SUCH_FILE_SUFFIX: &str = "No such file or directory";

/// Prefix of every line of `pm list packages`.
pub const PACKAGE_PREFIX: &str = "package:";

/// Key of the private storage line in `dumpsys package`.
pub const DATA_DIR_MARKER: &str = "dataDir";

/// adb state of a device that accepts shell commands.
pub const DEVICE_STATE_ONLINE: &str = "device";

// =============================================================================
// Devices
// =============================================================================

/// One line of the adb server's device list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceListing {
    pub serial: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub state: String,
}

impl DeviceListing {
    pub fn is_online(&self) -> bool {
        self.state == DEVICE_STATE_ONLINE
    }
}

/// Parses the body of a `host:devices` reply (`serial\tstate` per line).
pub fn parse_device_list(body: &str) -> CoreResult<Vec<DeviceListing>> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(serial), Some(state)) => Ok(DeviceListing {
                    serial: serial.to_string(),
                    state: state.to_string(),
                }),
                _ => Err(ParseError::MalformedDeviceLine(line.to_string())),
            }
        })
        .collect()
}

/// Trims `getprop` output; an empty answer means "no name".
pub fn parse_display_name(output: &str) -> Option<String> {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// =============================================================================
// Packages
// =============================================================================

/// Strips the `package:` prefix from each line of `pm list packages`.
///
/// Blank lines and lines without the prefix are ignored.
pub fn parse_package_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix(PACKAGE_PREFIX))
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns true if a `run-as` listing says the package cannot be inspected.
///
/// Only the first line is consulted.
pub fn is_not_debuggable(listing: &str) -> bool {
    listing
        .lines()
        .next()
        .is_some_and(|first| first.trim_start().starts_with(NOT_DEBUGGABLE_PREFIX))
}

/// Extracts the private data directory from `dumpsys package` output.
///
/// ## Example
/// ```text
///     dataDir=/data/user/0/com.example.app   →   /data/user/0/com.example.app
/// ```
pub fn parse_data_dir(dump: &str) -> CoreResult<String> {
    let line = dump
        .lines()
        .find(|line| line.contains(DATA_DIR_MARKER))
        .ok_or(ParseError::DataDirNotFound)?;

    match line.split_once('=') {
        Some((_, value)) if !value.trim().is_empty() && !value.contains('=') => {
            Ok(value.trim().to_string())
        }
        _ => Err(ParseError::MalformedDataDir(line.trim().to_string())),
    }
}

// =============================================================================
// Files
// =============================================================================

/// Returns true for the two error lines `run-as`/`ls` mix into a listing.
fn is_sentinel(line: &str) -> bool {
    line.starts_with(NOT_DEBUGGABLE_PREFIX) || line.ends_with(NO_SUCH_FILE_SUFFIX)
}

/// Parses recursive `ls -R -C -m -p` output rooted at `data_dir`.
///
/// Lines that start with `data_dir` and end with `:` switch the current
/// directory. Every other non-blank line is a comma-separated list of
/// entries in the current directory; entries ending in `/` are directories
/// and are skipped. Entries seen before any header belong to `data_dir`.
pub fn parse_file_listing(serial: &str, package: &str, data_dir: &str, output: &str) -> Vec<FileRow> {
    let mut rows = Vec::new();
    let mut current_dir = data_dir.trim_end_matches('/').to_string();

    for line in output.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() || is_sentinel(line) {
            continue;
        }

        if line.starts_with(data_dir) && line.ends_with(':') {
            current_dir = line[..line.len() - 1].to_string();
            continue;
        }

        rows.extend(
            line.split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty() && !name.ends_with('/'))
                .map(|name| FileRow::new(serial, package, current_dir.as_str(), name)),
        );
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATA_DIR: &str = "/data/user/0/com.example.app";

    #[test]
    fn test_parse_device_list() {
        let body = "emulator-5554\tdevice\nR58M123\tunauthorized\n\n";
        let devices = parse_device_list(body).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].serial, "emulator-5554");
        assert!(devices[0].is_online());
        assert!(!devices[1].is_online());
    }

    #[test]
    fn test_parse_device_list_rejects_garbage() {
        assert!(matches!(
            parse_device_list("lonely-serial"),
            Err(ParseError::MalformedDeviceLine(_))
        ));
        assert!(parse_device_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_display_name() {
        assert_eq!(parse_display_name("  SM-G973F\r\n"), Some("SM-G973F".to_string()));
        assert_eq!(parse_display_name("\n"), None);
    }

    #[test]
    fn test_parse_package_list() {
        let output = "package:com.example.app\r\npackage:org.demo.notes\n\nWARNING: linker\n";
        assert_eq!(
            parse_package_list(output),
            vec!["com.example.app".to_string(), "org.demo.notes".to_string()]
        );
    }

    #[test]
    fn test_is_not_debuggable() {
        assert!(is_not_debuggable(
            "run-as: package not debuggable: com.example.app\n"
        ));
        assert!(!is_not_debuggable("/data/data/com.example.app:\ncache/\n"));
        assert!(!is_not_debuggable(""));
    }

    #[test]
    fn test_parse_data_dir() {
        let dump = "Packages:\n  Package [com.example.app] (1a2b3c):\n    codePath=/data/app/x\n    dataDir=/data/user/0/com.example.app\n    dataDir=/ignored\n";
        assert_eq!(parse_data_dir(dump).unwrap(), DATA_DIR);
    }

    #[test]
    fn test_parse_data_dir_failures() {
        assert_eq!(
            parse_data_dir("Unable to find package: nope\n"),
            Err(ParseError::DataDirNotFound)
        );
        assert!(matches!(
            parse_data_dir("    dataDir:/data/user/0/x\n"),
            Err(ParseError::MalformedDataDir(_))
        ));
        assert!(matches!(
            parse_data_dir("    dataDir=a=b\n"),
            Err(ParseError::MalformedDataDir(_))
        ));
    }

    #[test]
    fn test_file_listing_discards_sentinels() {
        let output = format!(
            "{dir}/databases:\n\
             main.db, main.db-journal, backups/\n\
             run-as: package not debuggable: com.example.app\n\
             ls: {dir}/missing: No such file or directory\n",
            dir = DATA_DIR
        );
        let rows = parse_file_listing("A", "com.example.app", DATA_DIR, &output);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dir_path, format!("{}/databases", DATA_DIR));
        assert_eq!(rows[0].file_name, "main.db");
        assert_eq!(rows[1].full_path, format!("{}/databases/main.db-journal", DATA_DIR));
    }

    #[test]
    fn test_file_listing_tracks_directories() {
        let output = format!(
            "{dir}:\ncache/, notes.txt\n\n{dir}/cache:\n\n{dir}/shared_prefs:\nprefs.xml,\nsettings.xml\n",
            dir = DATA_DIR
        );
        let rows = parse_file_listing("A", "com.example.app", DATA_DIR, &output);
        let paths: Vec<_> = rows.iter().map(|r| r.full_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/data/user/0/com.example.app/notes.txt",
                "/data/user/0/com.example.app/shared_prefs/prefs.xml",
                "/data/user/0/com.example.app/shared_prefs/settings.xml",
            ]
        );
    }

    #[test]
    fn test_file_listing_before_header_uses_data_dir() {
        let rows = parse_file_listing("A", "p", "/data/data/p/", "top.db\n");
        assert_eq!(rows[0].dir_path, "/data/data/p");
        assert_eq!(rows[0].full_path, "/data/data/p/top.db");
    }
}
