/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 */

//! Configured providers keyed by instance name.

use std::collections::BTreeMap;

use crate::error::AuthError;

use super::{OAuth2Provider, Provider, SeamlessProvider};

#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Provider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a provider under its metadata name. Names must be unique.
    pub fn register(&mut self, provider: impl Into<Provider>) -> Result<(), AuthError> {
        let provider = provider.into();
        let name = provider.name().to_string();
        if self.providers.contains_key(&name) {
            return Err(AuthError::config(format!(
                "duplicate provider name '{name}'"
            )));
        }
        tracing::debug!(
            %name,
            provider_type = provider.provider_type(),
            "Registered identity provider"
        );
        self.providers.insert(name, provider);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Provider> {
        self.providers.get(name)
    }

    /// Providers in name order.
    pub fn list(&self) -> impl Iterator<Item = &Provider> {
        self.providers.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }

    pub fn oauth2(&self, name: &str) -> Option<&dyn OAuth2Provider> {
        self.get(name).and_then(Provider::as_oauth2)
    }

    pub fn seamless(&self, name: &str) -> Option<&dyn SeamlessProvider> {
        self.get(name).and_then(Provider::as_seamless)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
