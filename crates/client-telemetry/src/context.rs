// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ambient context attached to every log entry.
//!
//! Call sites only pass `(component, action, message, details)`; the
//! [`ContextEnricher`] fills in everything else:
//!
//! - **Session**: generated once per enricher (one per running process) from a
//!   base-36 millisecond prefix and a random suffix, then reused
//! - **User**: read from the active bearer token through an [`IdentitySource`];
//!   missing, expired or unparsable tokens yield no user
//! - **Route**: the logical screen last reported by the host
//! - **Version** and **device class**: fixed at construction
//!
//! Details are scrubbed of credential-looking keys before the entry is built.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::clock::Clock;
use crate::entry::{Details, DeviceClass, Level, LogEntry};

/// Placeholder for required fields left empty by a call site.
const UNKNOWN: &str = "unknown";

/// Replacement for redacted detail values.
pub const REDACTED: &str = "[redacted]";

/// Detail key fragments that mark a value as a secret.
const SECRET_KEY_FRAGMENTS: [&str; 7] = [
    "password",
    "passwd",
    "token",
    "secret",
    "authorization",
    "apikey",
    "cookie",
];

/// Provides the identifier of the currently authenticated user.
///
/// Implementations must never panic; "no user" is always a valid answer.
pub trait IdentitySource: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

/// Identity source for applications without authentication.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentitySource for Anonymous {
    fn current_user(&self) -> Option<String> {
        None
    }
}

/// Identity read from a JWT-style bearer token held by the host application.
///
/// The token payload is decoded without signature verification; only the
/// `exp` claim (seconds since epoch) and a user claim (`sub`, `userId` or
/// `email`) are consulted.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    token: Arc<RwLock<Option<String>>>,
    clock: Arc<dyn Clock>,
}

impl TokenIdentity {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            token: Arc::new(RwLock::new(None)),
            clock,
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    pub fn clear_token(&self) {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The raw token, if one is set. Used as the collector credential.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl IdentitySource for TokenIdentity {
    fn current_user(&self) -> Option<String> {
        let token = self.token()?;
        user_from_token(&token, self.clock.now_millis())
    }
}

/// Extracts the user claim from an unexpired JWT-style token.
#[must_use]
pub fn user_from_token(token: &str, now_millis: i64) -> Option<String> {
    let payload = token.trim().split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Value = match serde_json::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            debug!("Ignoring unparsable token payload: {}", e);
            return None;
        }
    };

    if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
        if exp.saturating_mul(1000) <= now_millis {
            return None;
        }
    }

    ["sub", "userId", "email"]
        .iter()
        .find_map(|claim| match claims.get(*claim) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
}

/// Generates a session identifier: base-36 milliseconds plus a random suffix.
#[must_use]
pub fn generate_session_id(now_millis: i64) -> String {
    let prefix = to_base36(u64::try_from(now_millis).unwrap_or_default());
    let suffix = fastrand::u64(..36u64.pow(8));
    format!("{prefix}-{:0>8}", to_base36(suffix))
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase().replace(['_', '-'], "");
    SECRET_KEY_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => redact(map),
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Replaces credential-looking values at any depth.
pub fn redact(details: &mut Details) {
    for (key, value) in details.iter_mut() {
        if is_secret_key(key) {
            *value = Value::String(REDACTED.to_string());
        } else {
            redact_value(value);
        }
    }
}

fn non_empty(value: &str) -> String {
    if value.trim().is_empty() {
        UNKNOWN.to_string()
    } else {
        value.to_string()
    }
}

/// Builds fully populated [`LogEntry`] values from call-site fields.
pub struct ContextEnricher {
    session_id: OnceLock<String>,
    identity: Arc<dyn IdentitySource>,
    route: RwLock<String>,
    version: String,
    device_class: DeviceClass,
    clock: Arc<dyn Clock>,
}

impl ContextEnricher {
    #[must_use]
    pub fn new(
        identity: Arc<dyn IdentitySource>,
        version: impl Into<String>,
        client_descriptor: &str,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            session_id: OnceLock::new(),
            identity,
            route: RwLock::new(String::new()),
            version: version.into(),
            device_class: DeviceClass::from_descriptor(client_descriptor),
            clock,
        }
    }

    /// The session identifier, created on first use.
    pub fn session_id(&self) -> &str {
        self.session_id
            .get_or_init(|| generate_session_id(self.clock.now_millis()))
    }

    pub fn set_route(&self, route: impl Into<String>) {
        *self.route.write().unwrap_or_else(PoisonError::into_inner) = route.into();
    }

    #[must_use]
    pub fn route(&self) -> String {
        self.route
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn device_class(&self) -> DeviceClass {
        self.device_class
    }

    #[must_use]
    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn enrich(
        &self,
        level: Level,
        component: &str,
        action: &str,
        message: &str,
        details: Option<Details>,
    ) -> LogEntry {
        let details = details.map(|mut details| {
            redact(&mut details);
            details
        });

        LogEntry {
            timestamp: self.clock.now_millis(),
            session_id: self.session_id().to_string(),
            user_id: self.identity.current_user(),
            route: self.route(),
            version: self.version.clone(),
            device_class: self.device_class,
            level,
            component: non_empty(component),
            action: non_empty(action),
            message: non_empty(message),
            details,
        }
    }
}
