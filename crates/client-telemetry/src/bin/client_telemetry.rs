// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inspects and maintains an on-disk telemetry store.
//!
//! ```text
//! client-telemetry stats
//! client-telemetry digest [hours]
//! client-telemetry export-tsv [file]
//! client-telemetry export-json [file]
//! client-telemetry flush
//! client-telemetry clear
//! ```
//!
//! The store and collector come from the `TELEMETRY_*` environment variables;
//! `TELEMETRY_STORAGE_PATH` is required.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

use std::env;
use std::fs;
use std::process::ExitCode;

use tracing::{debug, error};

use client_telemetry::analytics::DEFAULT_DIGEST_HOURS;
use client_telemetry::export::Artifact;
use client_telemetry::{logger, FlushOutcome, Telemetry, TelemetryConfig};

const USAGE: &str = "usage: client-telemetry <stats|digest [hours]|export-tsv [file]|export-json [file]|flush|clear>";

fn write_artifact(artifact: &Artifact, target: Option<&String>) -> Result<(), String> {
    let path = target.cloned().unwrap_or_else(|| artifact.file_name.clone());
    fs::write(&path, &artifact.body).map_err(|e| format!("Failed to write {path}: {e}"))?;
    println!("Wrote {} bytes to {}", artifact.body.len(), path);
    Ok(())
}

async fn run(telemetry: &Telemetry, args: &[String]) -> Result<(), String> {
    let command = args.first().map(String::as_str);
    match command {
        Some("stats") => {
            let stats = telemetry.get_stats();
            let rendered = serde_json::to_string_pretty(&stats)
                .map_err(|e| format!("Failed to render stats: {e}"))?;
            println!("{rendered}");
        }
        Some("digest") => {
            let hours = match args.get(1) {
                Some(hours) => hours
                    .parse::<u32>()
                    .map_err(|_| format!("Invalid number of hours '{hours}'"))?,
                None => DEFAULT_DIGEST_HOURS,
            };
            println!("{}", telemetry.build_incident_digest_for(hours));
        }
        Some("export-tsv") => write_artifact(&telemetry.export_delimited(), args.get(1))?,
        Some("export-json") => write_artifact(&telemetry.export_structured(), args.get(1))?,
        Some("flush") => match telemetry.flush_now().await {
            FlushOutcome::Empty => println!("Nothing to deliver"),
            FlushOutcome::Delivered(count) => println!("Delivered {count} entries"),
            FlushOutcome::Skipped => {
                return Err("No collector URL or credential configured".to_string())
            }
            FlushOutcome::Failed { count, reason } => {
                return Err(format!("Failed to deliver {count} entries: {reason}"))
            }
        },
        Some("clear") => {
            telemetry.clear();
            println!("Retained log cleared");
        }
        _ => return Err(USAGE.to_string()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut config = match TelemetryConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };
    logger::init(&config.log_level);

    if config.storage_path.is_none() {
        error!("TELEMETRY_STORAGE_PATH must point at an existing telemetry store");
        eprintln!("{USAGE}");
        return ExitCode::FAILURE;
    }

    // Only `flush` may reach the collector, including on shutdown.
    if args.first().map(String::as_str) != Some("flush") {
        config.collector_url = None;
    }

    let telemetry = match Telemetry::builder(config).start() {
        Ok(telemetry) => telemetry,
        Err(e) => {
            error!("Failed to open telemetry store: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = run(&telemetry, &args).await;

    debug!("Closing telemetry store");
    telemetry.shutdown().await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}
