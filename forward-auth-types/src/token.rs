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

//! Result of an OAuth2 authorization-code exchange.
//!
//! The token is handed to the caller and never retained by the provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct OAuth2AccessToken {
    pub access_token: String,

    /// Compact-serialized ID token, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Granted scopes, in the order the provider listed them.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Absolute expiry, when the provider reported `expires_in`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<DateTime<Utc>>,
}

impl OAuth2AccessToken {
    /// Split a space-delimited `scope` value into its ordered parts.
    pub fn parse_scopes(scope: &str) -> Vec<String> {
        scope.split_whitespace().map(str::to_string).collect()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }
}
