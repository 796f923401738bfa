// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery of pending entries to the remote collector.
//!
//! - [`transport`]: the collector seam and its HTTP implementation
//! - [`flusher`]: one snapshot-send-remove cycle over the pending queue
//! - [`service`]: the actor serializing flushes from every trigger

pub mod flusher;
pub mod service;
pub mod transport;

pub use flusher::Flusher;
pub use service::{DeliveryCommand, DeliveryHandle, DeliveryService};
pub use transport::{HttpTransport, Transport};

/// Result of one flush attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was pending.
    Empty,
    /// The collector acknowledged this many entries; they left the queue.
    Delivered(usize),
    /// No collector or credential was available; the queue is untouched.
    Skipped,
    /// Transmission failed or timed out; the queue is untouched.
    Failed { count: usize, reason: String },
}

impl FlushOutcome {
    /// Whether nothing is left to deliver from the flushed snapshot.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, FlushOutcome::Empty | FlushOutcome::Delivered(_))
    }
}
