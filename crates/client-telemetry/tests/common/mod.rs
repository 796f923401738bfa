// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use client_telemetry::clock::ManualClock;
use client_telemetry::credential::CredentialFactory;
use client_telemetry::delivery::Transport;
use client_telemetry::error::TransportError;
use client_telemetry::storage::MemoryStore;
use client_telemetry::{LogEntry, Telemetry, TelemetryConfig};

pub const NOW: i64 = 1_760_870_400_000;

/// Collector double that records batches and can be switched to fail.
#[derive(Default)]
pub struct MockCollector {
    batches: Mutex<Vec<Vec<LogEntry>>>,
    failing: Mutex<bool>,
}

impl MockCollector {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }

    pub fn batches(&self) -> Vec<Vec<LogEntry>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockCollector {
    async fn send(&self, _credential: &str, batch: &[LogEntry]) -> Result<(), TransportError> {
        self.batches.lock().unwrap().push(batch.to_vec());
        if *self.failing.lock().unwrap() {
            Err(TransportError::Status(502))
        } else {
            Ok(())
        }
    }
}

pub struct Pipeline {
    pub telemetry: Telemetry,
    pub collector: Arc<MockCollector>,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

pub fn start_pipeline(config: TelemetryConfig) -> Pipeline {
    let collector = Arc::new(MockCollector::default());
    let clock = Arc::new(ManualClock::new(NOW));
    let store = Arc::new(MemoryStore::new());
    let telemetry = Telemetry::builder(config)
        .store(store.clone())
        .transport(collector.clone())
        .clock(clock.clone())
        .credential_factory(CredentialFactory::new_from_static("test-token"))
        .start()
        .expect("failed to start telemetry");
    Pipeline {
        telemetry,
        collector,
        clock,
        store,
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn eventually(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
