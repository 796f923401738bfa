// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::entry::LogEntry;
use crate::error::TransportError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// Ships one batch. `Ok` means the collector acknowledged every entry.
    async fn send(&self, credential: &str, batch: &[LogEntry]) -> Result<(), TransportError>;
}

#[derive(Serialize)]
struct Payload<'a> {
    token: &'a str,
    entries: &'a [LogEntry],
}

#[derive(Deserialize)]
struct Ack {
    #[serde(default)]
    ok: bool,
}

/// Posts batches as JSON to the collector endpoint.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpTransport {
    #[must_use]
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, TransportError> {
        let url = config
            .collector_url
            .clone()
            .ok_or(TransportError::NoEndpoint)?;
        Ok(Self::new(crate::http::get_client(config), url))
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, credential: &str, batch: &[LogEntry]) -> Result<(), TransportError> {
        let body = serde_json::to_vec(&Payload {
            token: credential,
            entries: batch,
        })?;
        debug!("Posting {} entries ({} bytes) to {}", batch.len(), body.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        let ack: Ack = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::InvalidResponse(e.to_string()))?;
        if ack.ok {
            Ok(())
        } else {
            Err(TransportError::Rejected)
        }
    }
}
