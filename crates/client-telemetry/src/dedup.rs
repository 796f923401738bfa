// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Suppression of repeated warnings and errors.
//!
//! Entries of level warn, error or fatal that share a [`DedupKey`] collapse to
//! the first occurrence while they fall inside the dedup window. The window is
//! anchored at the first occurrence: suppressed repeats do not extend it.
//! Action and info entries are never suppressed.
//!
//! The recency table lives in memory only. It is bounded: when it reaches its
//! capacity, keys whose window already expired are dropped first, then the
//! oldest tenth of the remaining keys.

use hashbrown::HashMap;
use tracing::debug;

use crate::entry::Level;

/// Default dedup window in milliseconds.
pub const DEFAULT_DEDUP_WINDOW_MS: i64 = 5_000;

/// Default maximum number of keys remembered by the recency table.
pub const DEFAULT_DEDUP_CAPACITY: usize = 4_096;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub level: Level,
    pub component: String,
    pub action: String,
    pub message: String,
}

#[derive(Debug)]
pub struct DedupFilter {
    window_ms: i64,
    capacity: usize,
    last_seen: HashMap<DedupKey, i64>,
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(DEFAULT_DEDUP_WINDOW_MS, DEFAULT_DEDUP_CAPACITY)
    }
}

impl DedupFilter {
    #[must_use]
    pub fn new(window_ms: i64, capacity: usize) -> Self {
        Self {
            window_ms,
            capacity: capacity.max(1),
            last_seen: HashMap::new(),
        }
    }

    /// Returns `true` when the event should be dropped.
    ///
    /// Recording happens as a side effect: the first occurrence of a key
    /// inside a window is remembered at `now_millis`.
    pub fn is_duplicate(
        &mut self,
        level: Level,
        component: &str,
        action: &str,
        message: &str,
        now_millis: i64,
    ) -> bool {
        if !level.is_deduplicated() {
            return false;
        }

        let key = DedupKey {
            level,
            component: component.to_string(),
            action: action.to_string(),
            message: message.to_string(),
        };

        if let Some(&seen) = self.last_seen.get(&key) {
            if now_millis - seen < self.window_ms {
                return true;
            }
        }

        if !self.last_seen.contains_key(&key) && self.last_seen.len() >= self.capacity {
            self.evict(now_millis);
        }
        self.last_seen.insert(key, now_millis);
        false
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    fn evict(&mut self, now_millis: i64) {
        let window_ms = self.window_ms;
        self.last_seen
            .retain(|_, seen| now_millis - *seen < window_ms);

        if self.last_seen.len() < self.capacity {
            return;
        }

        let mut by_age: Vec<(i64, DedupKey)> = self
            .last_seen
            .iter()
            .map(|(key, seen)| (*seen, key.clone()))
            .collect();
        by_age.sort_by_key(|(seen, _)| *seen);

        let evict_count = (self.capacity / 10).max(1);
        for (_, key) in by_age.into_iter().take(evict_count) {
            self.last_seen.remove(&key);
        }
        debug!(
            "Dedup table full, evicted {} keys still inside the window",
            evict_count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_error_is_suppressed_inside_window() {
        let mut filter = DedupFilter::default();
        assert!(!filter.is_duplicate(Level::Error, "api", "save", "boom", 0));
        assert!(filter.is_duplicate(Level::Error, "api", "save", "boom", 1_000));
        assert!(filter.is_duplicate(Level::Error, "api", "save", "boom", 4_999));
    }

    #[test]
    fn test_window_is_anchored_at_first_occurrence() {
        let mut filter = DedupFilter::default();
        assert!(!filter.is_duplicate(Level::Warn, "a", "b", "c", 0));
        assert!(filter.is_duplicate(Level::Warn, "a", "b", "c", 4_000));
        // 5s after the first occurrence, not after the suppressed repeat.
        assert!(!filter.is_duplicate(Level::Warn, "a", "b", "c", 5_000));
        assert!(filter.is_duplicate(Level::Warn, "a", "b", "c", 6_000));
    }

    #[test]
    fn test_action_and_info_are_never_duplicates() {
        let mut filter = DedupFilter::default();
        for _ in 0..10 {
            assert!(!filter.is_duplicate(Level::Action, "ui", "click", "X", 0));
            assert!(!filter.is_duplicate(Level::Info, "ui", "load", "X", 0));
        }
        assert!(filter.is_empty());
    }

    #[test]
    fn test_key_includes_every_field() {
        let mut filter = DedupFilter::default();
        assert!(!filter.is_duplicate(Level::Error, "api", "save", "boom", 0));
        assert!(!filter.is_duplicate(Level::Fatal, "api", "save", "boom", 0));
        assert!(!filter.is_duplicate(Level::Error, "ui", "save", "boom", 0));
        assert!(!filter.is_duplicate(Level::Error, "api", "load", "boom", 0));
        assert!(!filter.is_duplicate(Level::Error, "api", "save", "bang", 0));
        assert_eq!(filter.len(), 5);
    }

    #[test]
    fn test_table_is_bounded() {
        let mut filter = DedupFilter::new(5_000, 100);
        for i in 0..1_000 {
            filter.is_duplicate(Level::Error, "api", "save", &format!("boom {i}"), 0);
            assert!(filter.len() <= 100);
        }
    }

    #[test]
    fn test_expired_keys_are_evicted_first() {
        let mut filter = DedupFilter::new(1_000, 3);
        filter.is_duplicate(Level::Error, "a", "a", "old", 0);
        filter.is_duplicate(Level::Error, "a", "a", "fresh-1", 1_500);
        filter.is_duplicate(Level::Error, "a", "a", "fresh-2", 1_600);

        // Table is full; "old" is outside its window and goes first.
        filter.is_duplicate(Level::Error, "a", "a", "fresh-3", 1_700);
        assert_eq!(filter.len(), 3);
        assert!(filter.is_duplicate(Level::Error, "a", "a", "fresh-1", 1_800));
        assert!(filter.is_duplicate(Level::Error, "a", "a", "fresh-2", 1_800));
    }
}
