// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};

pub type CredentialResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Option<String>> + Send>> + Send + Sync>;

/// Supplies the credential sent with every delivery batch.
///
/// Dynamic resolvers run on every flush and are never cached: the active
/// token changes on login and logout.
#[derive(Clone)]
pub enum CredentialFactory {
    Static(String),
    Dynamic(CredentialResolverFn),
    None,
}

impl CredentialFactory {
    #[must_use]
    pub fn new_from_resolver(resolver_fn: CredentialResolverFn) -> Self {
        Self::Dynamic(resolver_fn)
    }

    #[must_use]
    pub fn new_from_static(credential: &str) -> Self {
        Self::Static(credential.to_string())
    }

    /// Resolves the current credential. Empty credentials count as missing.
    pub async fn get_credential(&self) -> Option<String> {
        let credential = match self {
            Self::Static(credential) => Some(credential.clone()),
            Self::Dynamic(resolver_fn) => (resolver_fn)().await,
            Self::None => None,
        };
        credential.filter(|c| !c.trim().is_empty())
    }
}

impl From<Option<String>> for CredentialFactory {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(credential) => Self::Static(credential),
            None => Self::None,
        }
    }
}

impl Debug for CredentialFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialFactory")
    }
}
