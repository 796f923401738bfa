// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk exports of the retained log.
//!
//! Both formats list entries in the order the log store returns them (newest
//! first) and never drop any.

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::analytics::format_timestamp;
use crate::entry::LogEntry;

/// Column order of the delimited export.
pub const DELIMITED_COLUMNS: [&str; 10] = [
    "timestamp",
    "session",
    "user",
    "route",
    "version",
    "level",
    "component",
    "action",
    "message",
    "details",
];

/// A downloadable export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

fn file_name(taken_at: i64, extension: &str) -> String {
    let stamp = DateTime::<Utc>::from_timestamp_millis(taken_at)
        .map_or_else(|| taken_at.to_string(), |ts| ts.format("%Y%m%d-%H%M%S").to_string());
    format!("telemetry-{stamp}.{extension}")
}

/// Tabs and line breaks would break the row structure.
fn cell(value: &str) -> String {
    value.replace(['\t', '\r', '\n'], " ")
}

/// Tab-separated rows under a fixed header; details are JSON-encoded.
#[must_use]
pub fn export_delimited(entries: &[LogEntry], taken_at: i64) -> Artifact {
    let mut body = DELIMITED_COLUMNS.join("\t");
    body.push('\n');
    for entry in entries {
        let details = entry
            .details
            .as_ref()
            .and_then(|details| serde_json::to_string(details).ok())
            .unwrap_or_default();
        let row = [
            format_timestamp(entry.timestamp),
            cell(&entry.session_id),
            cell(entry.user_id.as_deref().unwrap_or_default()),
            cell(&entry.route),
            cell(&entry.version),
            entry.level.as_str().to_string(),
            cell(&entry.component),
            cell(&entry.action),
            cell(&entry.message),
            cell(&details),
        ];
        body.push_str(&row.join("\t"));
        body.push('\n');
    }
    Artifact {
        file_name: file_name(taken_at, "tsv"),
        content_type: "text/tab-separated-values",
        body: body.into_bytes(),
    }
}

/// Indented JSON array of the entries, in the same encoding they are stored in.
#[must_use]
pub fn export_structured(entries: &[LogEntry], taken_at: i64) -> Artifact {
    let body = serde_json::to_vec_pretty(entries).unwrap_or_else(|e| {
        warn!("Failed to serialize structured export: {}", e);
        b"[]".to_vec()
    });
    Artifact {
        file_name: file_name(taken_at, "json"),
        content_type: "application/json",
        body,
    }
}
