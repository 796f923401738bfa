// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::credential::CredentialFactory;
use crate::delivery::transport::Transport;
use crate::delivery::FlushOutcome;
use crate::log_store::LogStore;

pub struct FlusherConfig {
    pub log_store: Arc<LogStore>,
    /// `None` when no collector is configured; flushes are then skipped.
    pub transport: Option<Arc<dyn Transport>>,
    pub credential_factory: Arc<CredentialFactory>,
    pub timeout: Duration,
}

/// Ships the pending queue in one batch.
///
/// The queue is snapshotted before sending and only entries of that snapshot
/// are removed after the collector acknowledges it, so entries enqueued
/// during the request survive. Callers must not run two flushes concurrently.
pub struct Flusher {
    log_store: Arc<LogStore>,
    transport: Option<Arc<dyn Transport>>,
    credential_factory: Arc<CredentialFactory>,
    timeout: Duration,
}

impl Flusher {
    #[must_use]
    pub fn new(config: FlusherConfig) -> Self {
        Flusher {
            log_store: config.log_store,
            transport: config.transport,
            credential_factory: config.credential_factory,
            timeout: config.timeout,
        }
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.log_store.pending_len() > 0
    }

    pub async fn flush(&self) -> FlushOutcome {
        let batch = self.log_store.pending();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }

        let Some(transport) = &self.transport else {
            debug!("No collector configured, keeping {} pending entries", batch.len());
            return FlushOutcome::Skipped;
        };

        // Resolved on every flush: the credential follows login and logout.
        let Some(credential) = self.credential_factory.get_credential().await else {
            debug!("No collector credential, keeping {} pending entries", batch.len());
            return FlushOutcome::Skipped;
        };

        let count = batch.len();
        debug!("Flushing {} pending entries", count);

        match tokio::time::timeout(self.timeout, transport.send(&credential, &batch)).await {
            Ok(Ok(())) => {
                self.log_store.remove_delivered(&batch);
                debug!("Delivered {} entries", count);
                FlushOutcome::Delivered(count)
            }
            Ok(Err(e)) => FlushOutcome::Failed {
                count,
                reason: e.to_string(),
            },
            Err(_) => FlushOutcome::Failed {
                count,
                reason: format!("request timed out after {}ms", self.timeout.as_millis()),
            },
        }
    }
}
