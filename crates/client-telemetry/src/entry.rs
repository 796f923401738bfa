// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log entry data model.
//!
//! A [`LogEntry`] is one immutable, captured application event. Entries are
//! persisted and shipped as JSON objects with camelCase field names:
//!
//! ```json
//! {
//!   "timestamp": 1760870400000,
//!   "sessionId": "mgx2k1c0-4f9a2b",
//!   "userId": "tech-42",
//!   "route": "/schedule",
//!   "version": "0.1.0",
//!   "deviceClass": "desktop",
//!   "level": "error",
//!   "component": "api",
//!   "action": "save_job",
//!   "message": "Request failed",
//!   "details": {"status": 500}
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Optional structured payload attached to an entry.
pub type Details = serde_json::Map<String, serde_json::Value>;

/// Severity/category tag of an entry.
///
/// Variants are declared from least to most severe so that the derived
/// ordering can be used for "minimum level" filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// A discrete user operation. Never deduplicated, always delivered.
    Action,
    /// Informational event. Retained locally, never delivered.
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub const ALL: [Level; 5] = [
        Level::Action,
        Level::Info,
        Level::Warn,
        Level::Error,
        Level::Fatal,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Action => "action",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }

    /// Whether repeated entries of this level collapse inside the dedup window.
    #[must_use]
    pub fn is_deduplicated(self) -> bool {
        matches!(self, Level::Warn | Level::Error | Level::Fatal)
    }

    /// Whether entries of this level go to the pending delivery queue.
    #[must_use]
    pub fn is_delivered(self) -> bool {
        !matches!(self, Level::Info)
    }

    /// Whether entries of this level count as incidents in the digest.
    #[must_use]
    pub fn is_incident(self) -> bool {
        self.is_deduplicated()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "action" => Ok(Level::Action),
            "info" => Ok(Level::Info),
            "warn" | "warning" => Ok(Level::Warn),
            "error" => Ok(Level::Error),
            "fatal" => Ok(Level::Fatal),
            other => Err(format!("unknown level '{other}'")),
        }
    }
}

/// Class of device the application runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Mobile,
    #[default]
    Desktop,
}

/// Substrings of a client descriptor that identify a mobile device.
const MOBILE_TOKENS: [&str; 9] = [
    "android",
    "webos",
    "iphone",
    "ipad",
    "ipod",
    "blackberry",
    "iemobile",
    "opera mini",
    "mobile",
];

impl DeviceClass {
    /// Classifies a client descriptor (user agent string) by case-insensitive
    /// substring match against known mobile tokens.
    #[must_use]
    pub fn from_descriptor(descriptor: &str) -> Self {
        let descriptor = descriptor.to_ascii_lowercase();
        if MOBILE_TOKENS.iter().any(|token| descriptor.contains(token)) {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Mobile => "mobile",
            DeviceClass::Desktop => "desktop",
        }
    }
}

/// One captured application event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub session_id: String,
    pub user_id: Option<String>,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub device_class: DeviceClass,
    pub level: Level,
    pub component: String,
    pub action: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Details>,
}

impl LogEntry {
    /// Size in bytes of the compact JSON encoding of this entry.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}
