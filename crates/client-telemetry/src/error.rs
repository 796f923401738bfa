// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors raised by the persistent key-value substrate
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage quota exceeded: {needed} bytes needed, quota is {quota} bytes")]
    QuotaExceeded { needed: usize, quota: usize },
}

/// Errors raised while shipping a batch to the collector
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("collector responded with status {0}")]
    Status(u16),

    #[error("collector did not acknowledge the batch")]
    Rejected,

    #[error("malformed collector response: {0}")]
    InvalidResponse(String),

    #[error("failed to serialize batch: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("no collector endpoint configured")]
    NoEndpoint,
}

/// Errors raised while validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Errors raised while starting the telemetry pipeline
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to open storage: {0}")]
    Storage(#[from] StoreError),

    #[error("Telemetry must be started inside a tokio runtime")]
    NoRuntime,
}
