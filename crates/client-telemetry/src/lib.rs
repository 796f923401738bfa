// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Client Telemetry
//!
//! Structured event logging for client applications: every event is enriched
//! with ambient context, filtered for noisy repeats, retained in a bounded
//! persistent log and shipped to a remote collector in batches.
//!
//! ## Pipeline
//!
//! ```text
//!   call site ── action/info/warn/error/fatal
//!        │
//!        v
//!  ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//!  │   Enricher   │ ──> │    Dedup     │ ──> │  Log Store   │ (retained log)
//!  └──────────────┘     └──────────────┘     └──────┬───────┘
//!                                                   │ warn/error/fatal/action
//!                                                   v
//!                                            ┌──────────────┐
//!                                            │ Pending queue│ (persisted)
//!                                            └──────┬───────┘
//!                                                   │ threshold / timer /
//!                                                   │ background / explicit
//!                                                   v
//!                                            ┌──────────────┐
//!                                            │   Delivery   │ ──> collector
//!                                            │   service    │
//!                                            └──────────────┘
//! ```
//!
//! The read side ([`analytics`], [`export`], [`filter`]) works on a
//! [`LogSnapshot`] of the retained log and never mutates it.
//!
//! ## Modules
//!
//! - [`entry`]: `LogEntry`, levels and device classes
//! - [`context`]: ambient context (session, user, route, version, device)
//! - [`dedup`]: repeat suppression for warnings and errors
//! - [`storage`]: persistent key-value substrate (sled or in-memory)
//! - [`log_store`]: bounded retained log and pending delivery queue
//! - [`delivery`]: transport, flusher and the delivery actor
//! - [`telemetry`]: the facade used by call sites and the read-side panel

#![deny(clippy::all)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

/// Incident digest, aggregate counters and read-consistent snapshots
pub mod analytics;

/// Clock abstraction used for timestamps, retention and dedup windows
pub mod clock;

/// Configuration from defaults and environment variables
pub mod config;

/// Ambient context attached to every entry
pub mod context;

/// Collector credentials resolved at flush time
pub mod credential;

/// Repeat suppression for non-action events
pub mod dedup;

/// Delivery of pending entries to the remote collector
pub mod delivery;

/// Log entry data model
pub mod entry;

/// Error types
pub mod error;

/// Delimited and structured exports of the retained log
pub mod export;

/// Read-side entry filtering
pub mod filter;

/// HTTP client construction
pub mod http;

/// Durable bounded log and pending delivery queue
pub mod log_store;

/// Tracing formatter and subscriber setup
pub mod logger;

/// Persistent key-value substrate
pub mod storage;

/// Public facade
pub mod telemetry;

pub use analytics::{LogSnapshot, Stats};
pub use config::TelemetryConfig;
pub use delivery::FlushOutcome;
pub use entry::{Details, DeviceClass, Level, LogEntry};
pub use filter::EntryFilter;
pub use telemetry::{Telemetry, TelemetryBuilder};

/// Build identifier attached to entries when the host does not provide one.
pub const CRATE_VERSION: &str = env!("CARGO_PKG_VERSION");
