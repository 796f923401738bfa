// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod common;

use std::time::Duration;

use client_telemetry::analytics::{MAX_DIGEST_ENTRIES, NO_ISSUES};
use client_telemetry::log_store::serialized_size;
use client_telemetry::{EntryFilter, FlushOutcome, Level, LogEntry, TelemetryConfig};
use common::{eventually, start_pipeline};
use serde_json::json;

#[tokio::test]
async fn test_repeated_fatals_are_suppressed_but_actions_are_not() {
    let p = start_pipeline(TelemetryConfig::default());

    p.telemetry.fatal("app", "render", "X", None);
    for _ in 0..9 {
        p.clock.advance(100);
        p.telemetry.fatal("app", "render", "X", None);
    }
    for _ in 0..10 {
        p.clock.advance(50);
        p.telemetry.action("app", "render", "X", None);
    }

    let stats = p.telemetry.get_stats();
    assert_eq!(stats.fatals, 1);
    assert_eq!(stats.actions, 10);
    assert_eq!(stats.total, 11);
}

#[tokio::test]
async fn test_clear_empties_the_retained_log() {
    let p = start_pipeline(TelemetryConfig::default());
    p.telemetry.info("ui", "load", "ready", None);
    p.telemetry.error("api", "save", "failed", None);

    p.telemetry.clear();
    assert!(p.telemetry.list_entries().is_empty());
    assert_eq!(p.telemetry.get_stats().total, 0);
}

#[tokio::test]
async fn test_failed_flush_keeps_pending_entries() {
    let p = start_pipeline(TelemetryConfig::default());
    p.collector.set_failing(true);
    p.telemetry.warn("sync", "upload", "slow", None);

    let outcome = p.telemetry.flush_now().await;
    assert!(matches!(outcome, FlushOutcome::Failed { count: 1, .. }));
    assert!(p.telemetry.pending_len() >= 1);

    p.collector.set_failing(false);
    let outcome = p.telemetry.flush_now().await;
    assert!(outcome.is_success());
    assert_eq!(p.telemetry.pending_len(), 0);

    // The second batch carries the original warning first.
    let batches = p.collector.batches();
    assert_eq!(batches[1][0].message, "slow");
}

#[tokio::test]
async fn test_reaching_the_batch_threshold_flushes_automatically() {
    let p = start_pipeline(TelemetryConfig::default());
    for i in 0..20 {
        p.telemetry.action("ui", "tap", &format!("button {i}"), None);
    }

    let collector = p.collector.clone();
    eventually(move || !collector.batches().is_empty()).await;
    assert_eq!(p.collector.batches()[0].len(), 20);
}

#[tokio::test]
async fn test_small_byte_budget_bounds_the_log() {
    let p = start_pipeline(TelemetryConfig {
        max_log_bytes: 100,
        ..Default::default()
    });
    for i in 0..5 {
        p.telemetry.info("c", "a", &format!("m{i}"), None);
    }

    let entries = p.telemetry.list_entries();
    assert!(entries.len() < 5);
    assert!(serialized_size(&entries) <= 100);
}

#[tokio::test]
async fn test_entries_older_than_retention_are_pruned() {
    let p = start_pipeline(TelemetryConfig {
        retention_days: 1,
        ..Default::default()
    });
    p.telemetry.info("c", "a", "old", None);
    p.clock.advance(25 * 60 * 60 * 1000);
    p.telemetry.info("c", "a", "new", None);

    let messages: Vec<_> = p
        .telemetry
        .list_entries()
        .into_iter()
        .map(|e| e.message)
        .collect();
    assert_eq!(messages, vec!["new"]);
}

#[tokio::test]
async fn test_structured_export_matches_read_all() {
    let p = start_pipeline(TelemetryConfig::default());
    p.telemetry.set_route("/schedule");
    p.telemetry.action("calendar", "open", "Opened week view", None);
    p.clock.advance(10);
    p.telemetry.error(
        "api",
        "fetch",
        "Request failed",
        json!({"status": 500, "token": "abc"}).as_object().cloned(),
    );

    let snapshot = p.telemetry.snapshot();
    let parsed: Vec<LogEntry> =
        serde_json::from_slice(&snapshot.export_structured().body).unwrap();
    assert_eq!(parsed, p.telemetry.list_entries());
    assert_eq!(parsed, snapshot.entries());
    assert_eq!(parsed[0].details.as_ref().unwrap()["token"], "[redacted]");

    let tsv = String::from_utf8(snapshot.export_delimited().body).unwrap();
    assert_eq!(tsv.lines().count(), 3);
    assert!(tsv.lines().nth(1).unwrap().contains("\terror\tapi\tfetch\t"));
}

#[tokio::test]
async fn test_digest_sentinel_and_cap() {
    let p = start_pipeline(TelemetryConfig::default());
    p.telemetry.info("ui", "load", "ready", None);
    assert_eq!(p.telemetry.build_incident_digest(), NO_ISSUES);

    for i in 0..60 {
        p.clock.advance(10);
        p.telemetry.error("api", "save", &format!("failure {i}"), None);
    }
    let digest = p.telemetry.build_incident_digest();
    let blocks = digest.lines().filter(|l| l.starts_with('[')).count();
    assert_eq!(blocks, MAX_DIGEST_ENTRIES);
    assert!(digest.contains("failure 59"));
}

#[tokio::test]
async fn test_panel_filtering() {
    let p = start_pipeline(TelemetryConfig::default());
    p.telemetry.action("ui", "tap", "Tapped save", None);
    p.telemetry.warn("sync", "upload", "Slow upload", None);
    p.telemetry.error("sync", "upload", "Upload failed", None);

    let sync_problems = p.telemetry.list_filtered(
        &EntryFilter::new()
            .with_component("sync")
            .with_min_level(Level::Error),
    );
    assert_eq!(sync_problems.len(), 1);
    assert_eq!(sync_problems[0].message, "Upload failed");

    let search = p
        .telemetry
        .list_filtered(&EntryFilter::new().with_query("upload"));
    assert_eq!(search.len(), 2);
}

#[tokio::test]
async fn test_shutdown_waits_for_the_final_flush() {
    let p = start_pipeline(TelemetryConfig {
        flush_interval_secs: 3600,
        ..Default::default()
    });
    p.telemetry.fatal("app", "exit", "crashed", None);

    let outcome = tokio::time::timeout(Duration::from_secs(2), p.telemetry.shutdown())
        .await
        .unwrap();
    assert_eq!(outcome, FlushOutcome::Delivered(1));
    assert_eq!(p.collector.batches().len(), 1);
}
