//! # Remote Timestamps
//!
//! Modification times reported by `stat -c %y` on the device.
//!
//! ## Format
//! ```text
//! 2021-05-01 22:07:31.961255952 +0200
//! └──date──┘ └──time + nanos──┘ └offset┘
//! ```
//!
//! Toybox prints the offset as `+HHMM`; some builds print `+HH:MM`. Both are
//! accepted. The fractional part is optional.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CoreResult, ParseError};

const STAT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z";

/// A remote file modification time.
///
/// Equality is instant equality: the same moment written with two different
/// offsets compares equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteTimestamp(DateTime<FixedOffset>);

impl RemoteTimestamp {
    /// Parses the trimmed output of `stat -c %y`.
    pub fn parse(input: &str) -> CoreResult<Self> {
        let trimmed = input.trim();
        DateTime::parse_from_str(trimmed, STAT_FORMAT)
            .map(RemoteTimestamp)
            .map_err(|e| ParseError::InvalidTimestamp {
                input: trimmed.to_string(),
                reason: e.to_string(),
            })
    }

    /// Returns the underlying date-time.
    pub fn as_datetime(&self) -> &DateTime<FixedOffset> {
        &self.0
    }
}

impl From<DateTime<FixedOffset>> for RemoteTimestamp {
    fn from(value: DateTime<FixedOffset>) -> Self {
        RemoteTimestamp(value)
    }
}

impl FromStr for RemoteTimestamp {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RemoteTimestamp::parse(s)
    }
}

impl fmt::Display for RemoteTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.9f %z"))
    }
}
