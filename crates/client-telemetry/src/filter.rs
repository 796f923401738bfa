// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::entry::{Level, LogEntry};

/// Criteria applied by the read-side panel when listing entries.
///
/// Every criterion that is set must match. The default filter matches
/// everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EntryFilter {
    /// Accepted levels. Empty accepts every level.
    pub levels: Vec<Level>,
    pub min_level: Option<Level>,
    pub component: Option<String>,
    pub session_id: Option<String>,
    /// Inclusive lower bound on the timestamp, in milliseconds.
    pub since: Option<i64>,
    /// Case-insensitive substring searched in component, action, message and
    /// details.
    pub query: Option<String>,
}

impl EntryFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_levels(mut self, levels: &[Level]) -> Self {
        self.levels = levels.to_vec();
        self
    }

    #[must_use]
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = Some(level);
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: &str) -> Self {
        self.component = Some(component.to_string());
        self
    }

    #[must_use]
    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }

    #[must_use]
    pub fn since(mut self, timestamp: i64) -> Self {
        self.since = Some(timestamp);
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: &str) -> Self {
        let query = query.trim();
        self.query = (!query.is_empty()).then(|| query.to_lowercase());
        self
    }

    #[must_use]
    pub fn matches(&self, entry: &LogEntry) -> bool {
        if !self.levels.is_empty() && !self.levels.contains(&entry.level) {
            return false;
        }
        if self.min_level.is_some_and(|min| entry.level < min) {
            return false;
        }
        if self
            .component
            .as_ref()
            .is_some_and(|component| *component != entry.component)
        {
            return false;
        }
        if self
            .session_id
            .as_ref()
            .is_some_and(|session| *session != entry.session_id)
        {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        match &self.query {
            Some(query) => Self::contains_text(entry, &query.to_lowercase()),
            None => true,
        }
    }

    /// Matching entries, order preserved.
    #[must_use]
    pub fn apply(&self, entries: &[LogEntry]) -> Vec<LogEntry> {
        entries
            .iter()
            .filter(|entry| self.matches(entry))
            .cloned()
            .collect()
    }

    fn contains_text(entry: &LogEntry, query: &str) -> bool {
        [&entry.component, &entry.action, &entry.message]
            .iter()
            .any(|field| field.to_lowercase().contains(query))
            || entry.details.as_ref().is_some_and(|details| {
                serde_json::to_string(details)
                    .is_ok_and(|text| text.to_lowercase().contains(query))
            })
    }
}
