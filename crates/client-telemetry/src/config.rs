// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::dedup::{DEFAULT_DEDUP_CAPACITY, DEFAULT_DEDUP_WINDOW_MS};
use crate::error::ConfigError;
use crate::log_store::DEFAULT_MAX_LOG_BYTES;

pub const DEFAULT_RETENTION_DAYS: u32 = 60;
pub const DEFAULT_BATCH_THRESHOLD: usize = 20;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5 * 60;
pub const DEFAULT_FLUSH_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_STORAGE_QUOTA_BYTES: usize = 5_000_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;
const VALID_LOG_LEVELS: [&str; 6] = ["trace", "debug", "info", "warn", "error", "off"];

/// Configuration of the telemetry pipeline
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Collector endpoint receiving delivery batches
    pub collector_url: Option<String>,
    /// Static collector credential, used when no resolver is installed
    pub collector_token: Option<String>,
    /// Directory of the on-disk store; `None` keeps everything in memory
    pub storage_path: Option<PathBuf>,
    /// Byte quota of the persistent substrate
    pub storage_quota_bytes: Option<usize>,
    /// Age after which retained entries are pruned
    pub retention_days: u32,
    /// Byte budget of the serialized retained log
    pub max_log_bytes: usize,
    /// Window inside which repeated warnings and errors are dropped
    pub dedup_window_ms: i64,
    /// Maximum number of keys remembered by the dedup filter
    pub dedup_capacity: usize,
    /// Pending entries that trigger an immediate flush
    pub batch_threshold: usize,
    /// How often pending entries are flushed, in seconds
    pub flush_interval_secs: u64,
    /// Bound on one delivery request, in seconds
    pub flush_timeout_secs: u64,
    /// Build identifier stamped on every entry
    pub build_version: String,
    /// Client descriptor (user agent) used to classify the device
    pub client_descriptor: String,
    /// Diagnostic log level (trace, debug, info, warn, error, off)
    pub log_level: String,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collector_url: None,
            collector_token: None,
            storage_path: None,
            storage_quota_bytes: Some(DEFAULT_STORAGE_QUOTA_BYTES),
            retention_days: DEFAULT_RETENTION_DAYS,
            max_log_bytes: DEFAULT_MAX_LOG_BYTES,
            dedup_window_ms: DEFAULT_DEDUP_WINDOW_MS,
            dedup_capacity: DEFAULT_DEDUP_CAPACITY,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
            flush_timeout_secs: DEFAULT_FLUSH_TIMEOUT_SECS,
            build_version: crate::CRATE_VERSION.to_string(),
            client_descriptor: String::new(),
            log_level: "info".to_string(),
            https_proxy: None,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.trim().parse::<T>().ok())
}

fn non_empty_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

impl TelemetryConfig {
    /// Create configuration from `TELEMETRY_*` environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let storage_quota_bytes = match parse_env::<usize>("TELEMETRY_STORAGE_QUOTA_BYTES") {
            // 0 disables the quota
            Some(0) => None,
            Some(quota) => Some(quota),
            None => defaults.storage_quota_bytes,
        };

        let config = Self {
            collector_url: non_empty_env("TELEMETRY_COLLECTOR_URL"),
            collector_token: non_empty_env("TELEMETRY_COLLECTOR_TOKEN"),
            storage_path: non_empty_env("TELEMETRY_STORAGE_PATH").map(PathBuf::from),
            storage_quota_bytes,
            retention_days: parse_env("TELEMETRY_RETENTION_DAYS")
                .unwrap_or(defaults.retention_days),
            max_log_bytes: parse_env("TELEMETRY_MAX_LOG_BYTES").unwrap_or(defaults.max_log_bytes),
            dedup_window_ms: parse_env("TELEMETRY_DEDUP_WINDOW_MS")
                .unwrap_or(defaults.dedup_window_ms),
            dedup_capacity: defaults.dedup_capacity,
            batch_threshold: parse_env("TELEMETRY_BATCH_THRESHOLD")
                .unwrap_or(defaults.batch_threshold),
            flush_interval_secs: parse_env("TELEMETRY_FLUSH_INTERVAL_SECS")
                .unwrap_or(defaults.flush_interval_secs),
            flush_timeout_secs: parse_env("TELEMETRY_FLUSH_TIMEOUT_SECS")
                .unwrap_or(defaults.flush_timeout_secs),
            build_version: non_empty_env("TELEMETRY_BUILD_VERSION")
                .unwrap_or(defaults.build_version),
            client_descriptor: non_empty_env("TELEMETRY_CLIENT_DESCRIPTOR").unwrap_or_default(),
            log_level: env::var("TELEMETRY_LOG_LEVEL")
                .map(|val| val.trim().to_lowercase())
                .unwrap_or(defaults.log_level),
            https_proxy: env::var("TELEMETRY_PROXY_HTTPS")
                .or_else(|_| env::var("HTTPS_PROXY"))
                .ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retention_days == 0 {
            return Err(ConfigError::Invalid(
                "retention must be at least one day".to_string(),
            ));
        }
        if self.max_log_bytes == 0 {
            return Err(ConfigError::Invalid(
                "log byte budget must be greater than 0".to_string(),
            ));
        }
        if self.dedup_window_ms < 0 {
            return Err(ConfigError::Invalid(
                "dedup window cannot be negative".to_string(),
            ));
        }
        if self.batch_threshold == 0 {
            return Err(ConfigError::Invalid(
                "batch threshold must be greater than 0".to_string(),
            ));
        }
        if self.flush_interval_secs == 0 || self.flush_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "flush interval and timeout must be greater than 0".to_string(),
            ));
        }
        if self.storage_quota_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "storage quota must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &self.collector_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "collector URL '{url}' must use http or https"
                )));
            }
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error, off",
                self.log_level
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn retention_ms(&self) -> i64 {
        i64::from(self.retention_days) * DAY_MS
    }

    #[must_use]
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    #[must_use]
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }
}
