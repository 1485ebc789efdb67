use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fingerprint::fingerprint;

/// Placeholder for metadata the vendor line did not carry.
pub const UNKNOWN: &str = "Unknown";

/// License-server action recognised in a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Grant,
    Detachment,
    TimeOut,
    NotGranted,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Grant => "Grant",
            Action::Detachment => "Detachment",
            Action::TimeOut => "TimeOut",
            Action::NotGranted => "NotGranted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown license action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    /// Accepts both the vendor keywords (`grant`, `not granted`, any case) and
    /// the canonical names used on the wire (`NotGranted`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "grant" => Ok(Action::Grant),
            "detachment" => Ok(Action::Detachment),
            "timeout" => Ok(Action::TimeOut),
            "not granted" | "notgranted" => Ok(Action::NotGranted),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

/// One license-server action extracted from one log line.
///
/// This is also the queue wire format: one JSON object per event, without the
/// storage fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseEvent {
    /// Vendor-native timestamp, kept verbatim (`2024/01/15 09:30:00:123`).
    pub timestamp: String,
    pub log_level: String,
    pub component: String,
    pub action: Action,
    pub license_type: String,
    pub user_name: String,
    pub client_ip: String,
    /// Full original line without its trailing newline.
    pub raw_message: String,
}

/// A [`LicenseEvent`] paired with the content hash used as its archive key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEvent {
    pub event: LicenseEvent,
    fingerprint: String,
}

impl ParsedEvent {
    /// Wrap an event, hashing its `raw_message` once.
    pub fn new(event: LicenseEvent) -> Self {
        let fingerprint = fingerprint(&event.raw_message);
        Self { event, fingerprint }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Serialize the queue payload. The fingerprint is storage-only and is not included.
    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.event)
    }
}
