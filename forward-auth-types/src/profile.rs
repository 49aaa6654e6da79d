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

//! Normalized user profile returned by every identity provider.

use serde::{Deserialize, Serialize};

/// Provider-specific claims carried next to the normalized profile.
///
/// Values are opaque to the provider core: they are copied verbatim into the
/// session token by the session layer. Keys are chosen by each provider so they
/// do not collide once merged into a single token (e.g. `tid`, `hd`, `ip`,
/// `https://example.com/cap`).
pub type AdditionalClaims = serde_json::Map<String, serde_json::Value>;

/// Identity of an authenticated caller.
///
/// # Example
///
/// ```json
/// {
///   "provider": "tailscalewhois",
///   "id": "alice",
///   "email": { "value": "alice@example.com", "verified": false },
///   "name": { "full_name": "Alice" },
///   "additional_claims": { "ip": "100.64.0.1", "tailnet": "mytailnet.ts.net" }
/// }
/// ```
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Profile {
    /// Name of the provider instance that authenticated the caller.
    pub provider: String,

    /// Stable identifier of the caller at the provider. Never empty.
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<ProfileEmail>,

    #[serde(default)]
    pub name: ProfileName,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_claims: AdditionalClaims,
}

impl Profile {
    /// Read a string-valued additional claim.
    pub fn claim_str(&self, key: &str) -> Option<&str> {
        self.additional_claims.get(key).and_then(|v| v.as_str())
    }

    /// The best human-readable label for the caller: full name, then email, then ID.
    pub fn display_name(&self) -> &str {
        if !self.name.full_name.is_empty() {
            return &self.name.full_name;
        }
        match &self.email {
            Some(email) if !email.value.is_empty() => &email.value,
            _ => &self.id,
        }
    }
}

/// Email address asserted by the provider.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProfileEmail {
    pub value: String,
    #[serde(default)]
    pub verified: bool,
}

impl ProfileEmail {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            verified: false,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProfileName {
    #[serde(default)]
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
}

impl ProfileName {
    pub fn full(name: impl Into<String>) -> Self {
        Self {
            full_name: name.into(),
            nickname: None,
        }
    }
}
