// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP client used to reach the collector.
//!
//! Requests are bounded by the configured flush timeout. An HTTPS proxy is
//! honoured when configured; a proxy URL that does not parse is logged and
//! the client falls back to a direct connection.

use core::time::Duration;
use std::error::Error;

use tracing::error;

use crate::config::TelemetryConfig;

#[must_use]
pub fn get_client(config: &TelemetryConfig) -> reqwest::Client {
    match build_client(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client(
    config: &TelemetryConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.flush_timeout())
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(https_uri.clone())?;
            client = client.proxy(proxy);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builds_with_valid_proxy() {
        let config = TelemetryConfig {
            https_proxy: Some("https://proxy.example.com:3128".to_string()),
            ..Default::default()
        };
        assert!(build_client(&config, true).is_ok());
    }

    #[test]
    fn test_invalid_proxy_falls_back() {
        let config = TelemetryConfig {
            https_proxy: Some("http://[::1".to_string()),
            ..Default::default()
        };
        assert!(build_client(&config, true).is_err());
        // get_client never fails.
        let _client = get_client(&config);
    }
}
