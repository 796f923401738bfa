// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::entry::{Level, LogEntry};
use crate::export::{self, Artifact};
use crate::filter::EntryFilter;
use crate::log_store::serialized_size;

/// Default look-back window of the incident digest, in hours.
pub const DEFAULT_DIGEST_HOURS: u32 = 48;

/// Maximum number of entry blocks in one digest.
pub const MAX_DIGEST_ENTRIES: usize = 40;

/// Maximum length, in characters, of the details rendered per digest block.
pub const MAX_DIGEST_DETAILS_CHARS: usize = 200;

/// Digest returned when nothing qualifies.
pub const NO_ISSUES: &str = "No issues found.";

const HOUR_MS: i64 = 60 * 60 * 1000;

/// Aggregate counters over the retained log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub actions: usize,
    pub infos: usize,
    pub warnings: usize,
    pub errors: usize,
    pub fatals: usize,
    /// Number of distinct session identifiers.
    pub session_count: usize,
    /// Serialized size of the retained log.
    pub approx_bytes: usize,
    pub oldest_timestamp: Option<i64>,
}

impl Stats {
    #[must_use]
    pub fn count(&self, level: Level) -> usize {
        match level {
            Level::Action => self.actions,
            Level::Info => self.infos,
            Level::Warn => self.warnings,
            Level::Error => self.errors,
            Level::Fatal => self.fatals,
        }
    }
}

#[must_use]
pub fn compute_stats(entries: &[LogEntry]) -> Stats {
    let mut stats = Stats {
        total: entries.len(),
        approx_bytes: serialized_size(entries),
        ..Stats::default()
    };
    let mut sessions = HashSet::new();
    for entry in entries {
        match entry.level {
            Level::Action => stats.actions += 1,
            Level::Info => stats.infos += 1,
            Level::Warn => stats.warnings += 1,
            Level::Error => stats.errors += 1,
            Level::Fatal => stats.fatals += 1,
        }
        sessions.insert(entry.session_id.as_str());
        stats.oldest_timestamp = Some(
            stats
                .oldest_timestamp
                .map_or(entry.timestamp, |oldest| oldest.min(entry.timestamp)),
        );
    }
    stats.session_count = sessions.len();
    stats
}

pub(crate) fn format_timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis).map_or_else(
        || millis.to_string(),
        |ts| ts.to_rfc3339_opts(SecondsFormat::Millis, true),
    )
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(3)).collect();
    truncated.push_str("...");
    truncated
}

/// Builds the human-readable troubleshooting digest.
///
/// `entries` is the retained log, newest first. An entry qualifies when it is
/// a warning, error or fatal younger than `hours`, or an action of the most
/// recent session. Only the newest [`MAX_DIGEST_ENTRIES`] qualifying entries
/// are rendered, oldest first.
#[must_use]
pub fn build_incident_digest(entries: &[LogEntry], now_millis: i64, hours: u32) -> String {
    let cutoff = now_millis.saturating_sub(i64::from(hours) * HOUR_MS);
    // The newest entry carries the last session seen in append order.
    let current_session = entries.first().map(|entry| entry.session_id.as_str());

    let mut selected: Vec<&LogEntry> = entries
        .iter()
        .filter(|entry| {
            (entry.level.is_incident() && entry.timestamp >= cutoff)
                || (entry.level == Level::Action
                    && Some(entry.session_id.as_str()) == current_session)
        })
        .take(MAX_DIGEST_ENTRIES)
        .collect();

    if selected.is_empty() {
        return NO_ISSUES.to_string();
    }
    selected.reverse();

    let mut report = String::new();
    let _ = writeln!(report, "=== Incident digest ===");
    let _ = writeln!(report, "Generated: {}", format_timestamp(now_millis));
    let _ = writeln!(report, "Window: last {hours} hours");
    if let Some(session) = current_session {
        let _ = writeln!(report, "Current session: {session}");
    }
    let _ = writeln!(report, "Entries: {}", selected.len());

    for entry in &selected {
        let _ = writeln!(report);
        let _ = writeln!(
            report,
            "[{}] {} @ {}",
            format_timestamp(entry.timestamp),
            entry.level.as_str().to_ascii_uppercase(),
            if entry.route.is_empty() { "-" } else { entry.route.as_str() }
        );
        let _ = writeln!(report, "  {} \u{203a} {}", entry.component, entry.action);
        let _ = writeln!(report, "  {}", entry.message);
        if let Some(details) = &entry.details {
            let rendered = serde_json::to_string(details).unwrap_or_default();
            let _ = writeln!(
                report,
                "  details: {}",
                truncate_chars(&rendered, MAX_DIGEST_DETAILS_CHARS)
            );
        }
    }

    let _ = writeln!(report);
    let _ = write!(report, "=== End of digest ===");
    report
}

/// Read-consistent view of the retained log.
///
/// Everything derived from one snapshot (stats, digest, exports, filtered
/// lists) describes exactly the same entry set, whatever gets appended in the
/// meantime.
#[derive(Clone, Debug, PartialEq)]
pub struct LogSnapshot {
    entries: Vec<LogEntry>,
    taken_at: i64,
}

impl LogSnapshot {
    /// `entries` must be newest first, as returned by the log store.
    #[must_use]
    pub fn new(entries: Vec<LogEntry>, taken_at: i64) -> Self {
        Self { entries, taken_at }
    }

    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    #[must_use]
    pub fn taken_at(&self) -> i64 {
        self.taken_at
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        compute_stats(&self.entries)
    }

    #[must_use]
    pub fn digest(&self, hours: u32) -> String {
        build_incident_digest(&self.entries, self.taken_at, hours)
    }

    #[must_use]
    pub fn filtered(&self, filter: &EntryFilter) -> Vec<LogEntry> {
        filter.apply(&self.entries)
    }

    #[must_use]
    pub fn export_delimited(&self) -> Artifact {
        export::export_delimited(&self.entries, self.taken_at)
    }

    #[must_use]
    pub fn export_structured(&self) -> Artifact {
        export::export_structured(&self.entries, self.taken_at)
    }
}
