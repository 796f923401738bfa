// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Public facade.
//!
//! Call sites use the leveled operations ([`Telemetry::action`],
//! [`Telemetry::info`], [`Telemetry::warn`], [`Telemetry::error`],
//! [`Telemetry::fatal`]). They never fail and never block on the network.
//!
//! The read-side panel uses [`Telemetry::list_entries`],
//! [`Telemetry::get_stats`], [`Telemetry::clear`], the exports, the digest
//! and [`Telemetry::flush_now`]. For several views of one user action, take a
//! [`LogSnapshot`] once and derive them all from it.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analytics::{LogSnapshot, Stats, DEFAULT_DIGEST_HOURS};
use crate::clock::{Clock, SystemClock};
use crate::config::TelemetryConfig;
use crate::context::{Anonymous, ContextEnricher, IdentitySource};
use crate::credential::CredentialFactory;
use crate::dedup::DedupFilter;
use crate::delivery::flusher::{Flusher, FlusherConfig};
use crate::delivery::transport::{HttpTransport, Transport};
use crate::delivery::{DeliveryHandle, DeliveryService, FlushOutcome};
use crate::entry::{Details, Level, LogEntry};
use crate::error::TelemetryError;
use crate::export::Artifact;
use crate::filter::EntryFilter;
use crate::log_store::LogStore;
use crate::storage::{KeyValueStore, MemoryStore, SledStore};

/// Write path shared by the facade and the delivery service: enrich, drop
/// repeats, retain, and queue for delivery.
pub struct Recorder {
    enricher: ContextEnricher,
    dedup: Mutex<DedupFilter>,
    log_store: Arc<LogStore>,
}

impl Recorder {
    #[must_use]
    pub fn new(enricher: ContextEnricher, dedup: DedupFilter, log_store: Arc<LogStore>) -> Self {
        Self {
            enricher,
            dedup: Mutex::new(dedup),
            log_store,
        }
    }

    /// Records one event. Returns the pending queue length when the entry was
    /// queued for delivery, `None` when it was dropped or stays local.
    pub fn record(
        &self,
        level: Level,
        component: &str,
        action: &str,
        message: &str,
        details: Option<Details>,
    ) -> Option<usize> {
        let entry = self
            .enricher
            .enrich(level, component, action, message, details);

        let duplicate = self
            .dedup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_duplicate(
                entry.level,
                &entry.component,
                &entry.action,
                &entry.message,
                entry.timestamp,
            );
        if duplicate {
            return None;
        }

        if level.is_delivered() {
            self.log_store.append(entry.clone());
            Some(self.log_store.enqueue_pending(entry))
        } else {
            self.log_store.append(entry);
            None
        }
    }

    #[must_use]
    pub fn enricher(&self) -> &ContextEnricher {
        &self.enricher
    }
}

#[must_use]
pub struct TelemetryBuilder {
    config: TelemetryConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    identity: Option<Arc<dyn IdentitySource>>,
    clock: Option<Arc<dyn Clock>>,
    credential_factory: Option<CredentialFactory>,
    cancel_token: Option<CancellationToken>,
}

impl TelemetryBuilder {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            store: None,
            transport: None,
            identity: None,
            clock: None,
            credential_factory: None,
            cancel_token: None,
        }
    }

    /// Substrate to use instead of the one derived from the configuration.
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Collector seam to use instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn identity(mut self, identity: Arc<dyn IdentitySource>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn credential_factory(mut self, credential_factory: CredentialFactory) -> Self {
        self.credential_factory = Some(credential_factory);
        self
    }

    /// Cancelling this token stops delivery after a final flush.
    pub fn cancel_token(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = Some(cancel_token);
        self
    }

    /// Opens storage and spawns the delivery service on the current runtime.
    pub fn start(self) -> Result<Telemetry, TelemetryError> {
        let config = self.config;
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store: Arc<dyn KeyValueStore> = match (self.store, &config.storage_path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(SledStore::open(path, config.storage_quota_bytes)?),
            (None, None) => Arc::new(match config.storage_quota_bytes {
                Some(quota) => MemoryStore::with_quota(quota),
                None => MemoryStore::new(),
            }),
        };
        let transport = match self.transport {
            Some(transport) => Some(transport),
            None => match HttpTransport::from_config(&config) {
                Ok(transport) => Some(Arc::new(transport) as Arc<dyn Transport>),
                Err(e) => {
                    debug!("Remote delivery disabled: {}", e);
                    None
                }
            },
        };
        let credential_factory = self
            .credential_factory
            .unwrap_or_else(|| CredentialFactory::from(config.collector_token.clone()));
        let identity = self.identity.unwrap_or_else(|| Arc::new(Anonymous));
        let cancel_token = self.cancel_token.unwrap_or_default();

        let log_store = Arc::new(LogStore::new(
            store,
            Arc::clone(&clock),
            config.retention_ms(),
            config.max_log_bytes,
        ));
        let enricher = ContextEnricher::new(
            identity,
            config.build_version.clone(),
            &config.client_descriptor,
            clock,
        );
        let recorder = Arc::new(Recorder::new(
            enricher,
            DedupFilter::new(config.dedup_window_ms, config.dedup_capacity),
            Arc::clone(&log_store),
        ));

        let flusher = Flusher::new(FlusherConfig {
            log_store: Arc::clone(&log_store),
            transport,
            credential_factory: Arc::new(credential_factory),
            timeout: config.flush_timeout(),
        });
        let (service, delivery) = DeliveryService::new(
            flusher,
            Arc::clone(&recorder),
            config.flush_interval(),
            cancel_token,
        );
        let service_task = runtime.spawn(service.run());

        info!(
            "Telemetry started: session {}, {} entries pending delivery",
            recorder.enricher().session_id(),
            log_store.pending_len()
        );

        Ok(Telemetry {
            recorder,
            log_store,
            delivery,
            batch_threshold: config.batch_threshold,
            service_task: Mutex::new(Some(service_task)),
        })
    }
}

pub struct Telemetry {
    recorder: Arc<Recorder>,
    log_store: Arc<LogStore>,
    delivery: DeliveryHandle,
    batch_threshold: usize,
    service_task: Mutex<Option<JoinHandle<()>>>,
}

impl Telemetry {
    pub fn builder(config: TelemetryConfig) -> TelemetryBuilder {
        TelemetryBuilder::new(config)
    }

    /// A discrete user operation. Always retained and delivered.
    pub fn action(&self, component: &str, action: &str, message: &str, details: Option<Details>) {
        self.log(Level::Action, component, action, message, details);
    }

    /// Retained locally, never delivered.
    pub fn info(&self, component: &str, action: &str, message: &str, details: Option<Details>) {
        self.log(Level::Info, component, action, message, details);
    }

    pub fn warn(&self, component: &str, action: &str, message: &str, details: Option<Details>) {
        self.log(Level::Warn, component, action, message, details);
    }

    pub fn error(&self, component: &str, action: &str, message: &str, details: Option<Details>) {
        self.log(Level::Error, component, action, message, details);
    }

    pub fn fatal(&self, component: &str, action: &str, message: &str, details: Option<Details>) {
        self.log(Level::Fatal, component, action, message, details);
    }

    pub fn log(
        &self,
        level: Level,
        component: &str,
        action: &str,
        message: &str,
        details: Option<Details>,
    ) {
        let Some(pending) = self
            .recorder
            .record(level, component, action, message, details)
        else {
            return;
        };
        if pending >= self.batch_threshold {
            debug!("{} entries pending, requesting flush", pending);
            self.delivery.request_threshold_flush();
        }
    }

    /// Updates the route stamped on subsequent entries.
    pub fn set_route(&self, route: impl Into<String>) {
        self.recorder.enricher().set_route(route);
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        self.recorder.enricher().session_id()
    }

    /// The host went to the background: flush without waiting.
    pub fn on_background(&self) {
        self.delivery.request_flush();
    }

    /// Flushes the pending queue and waits for the outcome.
    pub async fn flush_now(&self) -> FlushOutcome {
        match self.delivery.flush().await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Flush request failed: {}", e);
                FlushOutcome::Failed {
                    count: self.log_store.pending_len(),
                    reason: e,
                }
            }
        }
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.log_store.pending_len()
    }

    /// Retained entries, newest first.
    #[must_use]
    pub fn list_entries(&self) -> Vec<LogEntry> {
        self.log_store.read_all()
    }

    #[must_use]
    pub fn list_filtered(&self, filter: &EntryFilter) -> Vec<LogEntry> {
        filter.apply(&self.log_store.read_all())
    }

    #[must_use]
    pub fn get_stats(&self) -> Stats {
        self.log_store.stats()
    }

    /// Empties the retained log. Entries awaiting delivery are kept.
    pub fn clear(&self) {
        self.log_store.clear();
    }

    #[must_use]
    pub fn export_delimited(&self) -> Artifact {
        self.snapshot().export_delimited()
    }

    #[must_use]
    pub fn export_structured(&self) -> Artifact {
        self.snapshot().export_structured()
    }

    #[must_use]
    pub fn build_incident_digest(&self) -> String {
        self.build_incident_digest_for(DEFAULT_DIGEST_HOURS)
    }

    #[must_use]
    pub fn build_incident_digest_for(&self, hours: u32) -> String {
        self.snapshot().digest(hours)
    }

    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot::new(
            self.log_store.read_all(),
            self.recorder.enricher().now_millis(),
        )
    }

    /// Stops delivery after a final flush and waits for it.
    ///
    /// Entries that could not be delivered stay persisted for the next run.
    pub async fn shutdown(&self) -> FlushOutcome {
        let outcome = match self.delivery.shutdown().await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!("Delivery service already stopped: {}", e);
                FlushOutcome::Skipped
            }
        };
        let task = self
            .service_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("Delivery service task failed: {}", e);
            }
        }
        self.log_store.sync();
        info!("Telemetry stopped");
        outcome
    }
}
