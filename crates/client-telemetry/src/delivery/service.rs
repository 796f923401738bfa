// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The delivery actor.
//!
//! Every flush trigger (batch threshold, periodic timer, background
//! transition, explicit request, shutdown) goes through one
//! [`DeliveryService`], which runs them strictly one after the other. A
//! second flush can therefore never start while one is outstanding, and two
//! flushes never remove overlapping snapshots of the pending queue.
//!
//! Fire-and-forget requests that pile up while a flush runs collapse into a
//! single follow-up flush. After a failed flush, batch-threshold requests are
//! ignored until the next periodic tick or a successful flush.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::delivery::flusher::Flusher;
use crate::delivery::FlushOutcome;
use crate::entry::Level;
use crate::telemetry::Recorder;

#[derive(Debug)]
pub enum DeliveryCommand {
    /// Flush the pending queue, optionally reporting the outcome.
    Flush(Option<oneshot::Sender<FlushOutcome>>),
    /// The pending queue reached the batch threshold.
    ThresholdReached,
    /// Run a final flush, report it and stop.
    Shutdown(Option<oneshot::Sender<FlushOutcome>>),
}

#[derive(Clone, Debug)]
pub struct DeliveryHandle {
    tx: mpsc::UnboundedSender<DeliveryCommand>,
}

impl DeliveryHandle {
    /// Fire-and-forget flush. Returns `false` when the service has stopped.
    pub fn request_flush(&self) -> bool {
        self.tx.send(DeliveryCommand::Flush(None)).is_ok()
    }

    /// Fire-and-forget flush for a full batch. Returns `false` when the
    /// service has stopped.
    pub fn request_threshold_flush(&self) -> bool {
        self.tx.send(DeliveryCommand::ThresholdReached).is_ok()
    }

    pub async fn flush(&self) -> Result<FlushOutcome, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(DeliveryCommand::Flush(Some(response_tx)))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    /// Stops the service after a final flush and returns that flush's outcome.
    pub async fn shutdown(&self) -> Result<FlushOutcome, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(DeliveryCommand::Shutdown(Some(response_tx)))
            .map_err(|e| format!("Failed to send shutdown command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive shutdown response: {}", e))
    }
}

pub struct DeliveryService {
    flusher: Flusher,
    recorder: Arc<Recorder>,
    flush_interval: Duration,
    cancel_token: CancellationToken,
    rx: mpsc::UnboundedReceiver<DeliveryCommand>,
    // Set by a failed flush, cleared by a successful one or the next tick.
    backoff: bool,
}

impl DeliveryService {
    #[must_use]
    pub fn new(
        flusher: Flusher,
        recorder: Arc<Recorder>,
        flush_interval: Duration,
        cancel_token: CancellationToken,
    ) -> (Self, DeliveryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let service = Self {
            flusher,
            recorder,
            flush_interval,
            cancel_token,
            rx,
            backoff: false,
        };
        (service, DeliveryHandle { tx })
    }

    pub async fn run(mut self) {
        debug!("Delivery service started");

        // The first tick fires one interval from now, not immediately.
        let mut ticker = interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    debug!("Delivery service cancelled, running final flush");
                    self.flush_and_report().await;
                    break;
                }
                command = self.rx.recv() => match command {
                    Some(DeliveryCommand::Flush(reply)) => {
                        if let Some(shutdown_reply) = self.flush_coalesced(reply).await {
                            self.shutdown(shutdown_reply).await;
                            break;
                        }
                    }
                    Some(DeliveryCommand::ThresholdReached) if self.backoff => {
                        debug!("Batch threshold reached after a failed flush, waiting for the next tick");
                    }
                    Some(DeliveryCommand::ThresholdReached) => {
                        if let Some(shutdown_reply) = self.flush_coalesced(None).await {
                            self.shutdown(shutdown_reply).await;
                            break;
                        }
                    }
                    Some(DeliveryCommand::Shutdown(reply)) => {
                        self.shutdown(reply).await;
                        break;
                    }
                    None => {
                        debug!("All delivery handles dropped, running final flush");
                        self.flush_and_report().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.backoff = false;
                    if self.flusher.has_pending() {
                        debug!("Periodic flush");
                        self.flush_and_report().await;
                    }
                }
            }
        }

        debug!("Delivery service stopped");
    }

    /// Drains queued flush requests into one flush.
    ///
    /// A shutdown found while draining is returned so the caller can honour
    /// it after this flush completes.
    async fn flush_coalesced(
        &mut self,
        first_reply: Option<oneshot::Sender<FlushOutcome>>,
    ) -> Option<Option<oneshot::Sender<FlushOutcome>>> {
        let mut replies: Vec<_> = first_reply.into_iter().collect();
        let mut coalesced = 0;
        let mut shutdown = None;
        while let Ok(command) = self.rx.try_recv() {
            match command {
                DeliveryCommand::Flush(reply) => {
                    coalesced += 1;
                    replies.extend(reply);
                }
                DeliveryCommand::ThresholdReached => coalesced += 1,
                DeliveryCommand::Shutdown(reply) => {
                    shutdown = Some(reply);
                    break;
                }
            }
        }
        if coalesced > 0 {
            debug!("Coalesced {} queued flush requests", coalesced);
        }

        let outcome = self.flush_and_report().await;
        for reply in replies {
            if reply.send(outcome.clone()).is_err() {
                debug!("Flush requester went away before the outcome was ready");
            }
        }
        shutdown
    }

    async fn shutdown(&mut self, reply: Option<oneshot::Sender<FlushOutcome>>) {
        debug!("Delivery service shutting down, running final flush");
        let outcome = self.flush_and_report().await;
        if let Some(reply) = reply {
            if reply.send(outcome).is_err() {
                error!("Failed to send shutdown response - receiver dropped");
            }
        }
    }

    async fn flush_and_report(&mut self) -> FlushOutcome {
        let outcome = self.flusher.flush().await;
        match &outcome {
            FlushOutcome::Failed { .. } => self.backoff = true,
            FlushOutcome::Delivered(_) | FlushOutcome::Empty => self.backoff = false,
            FlushOutcome::Skipped => {}
        }
        if let FlushOutcome::Failed { count, reason } = &outcome {
            warn!("Failed to deliver {} entries: {}", count, reason);
            // Recorded through the pipeline so the failure reaches the collector
            // with the next successful batch. It never triggers a flush itself.
            self.recorder.record(
                Level::Warn,
                "telemetry",
                "flush",
                "Failed to send logs",
                json!({ "error": reason, "count": count }).as_object().cloned(),
            );
        }
        outcome
    }
}
