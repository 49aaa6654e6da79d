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

//! Identity providers.
//!
//! Every provider implements [`AuthProvider`] plus at least one capability:
//! [`OAuth2Provider`] (interactive authorization-code flow) or
//! [`SeamlessProvider`] (identity derived from the request itself). The
//! [`Provider`] enum is the closed set of configured providers and hands out
//! the capability views without downcasting.

pub mod github;
pub mod google;
pub mod microsoft_entra_id;
pub mod openidconnect;
pub mod pocketid;
pub mod registry;
pub mod tailscale_whois;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use forward_auth_types::{OAuth2AccessToken, Profile};
use serde_json::Value;

use crate::error::AuthError;
use crate::oauth::claims::copy_claims;
use crate::oauth::{profile_from_claims, ClaimsMap, OAuth2Client};

pub use github::{GitHub, GitHubOptions};
pub use google::{Google, GoogleOptions};
pub use microsoft_entra_id::{MicrosoftEntraId, MicrosoftEntraIdOptions};
pub use openidconnect::{OpenIdConnect, OpenIdConnectOptions};
pub use pocketid::{PocketId, PocketIdOptions};
pub use registry::ProviderRegistry;
pub use tailscale_whois::{TailscaleWhois, TailscaleWhoisOptions};

/// Default timeout applied to every outbound provider request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// How a provider presents itself on the login page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderMetadata {
    /// Instance name; also written to [`Profile::provider`].
    pub name: String,
    pub display_name: String,
    pub icon: String,
    pub color: String,
}

impl ProviderMetadata {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        icon: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            icon: icon.into(),
            color: color.into(),
        }
    }
}

/// Per-instance overrides of a provider's default [`ProviderMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataOptions {
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
}

impl MetadataOptions {
    /// Apply the non-empty overrides on top of `defaults`.
    pub fn resolve(&self, defaults: ProviderMetadata) -> ProviderMetadata {
        let pick = |over: &Option<String>, default: String| {
            over.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };
        ProviderMetadata {
            name: pick(&self.name, defaults.name),
            display_name: pick(&self.display_name, defaults.display_name),
            icon: pick(&self.icon, defaults.icon),
            color: pick(&self.color, defaults.color),
        }
    }
}

/// Behavior shared by every provider.
pub trait AuthProvider: Send + Sync {
    /// Stable type key, e.g. `github` or `tailscalewhois`.
    fn provider_type(&self) -> &'static str;

    fn metadata(&self) -> &ProviderMetadata;

    fn provider_name(&self) -> &str {
        &self.metadata().name
    }

    /// Copy this provider's additional claims from a verified session token
    /// into `set`, so they can be restored on the request context.
    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value));
}

/// Interactive OAuth2 authorization-code flow.
#[async_trait]
pub trait OAuth2Provider: AuthProvider {
    /// URL to send the browser to. Fails with `InvalidRedirectUri` when
    /// `redirect_uri` is not an absolute http(s) URL.
    fn oauth2_authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError>;

    /// Exchange the authorization code returned to `redirect_uri`.
    async fn oauth2_exchange_code(
        &self,
        state: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuth2AccessToken, AuthError>;

    async fn oauth2_retrieve_profile(&self, token: &OAuth2AccessToken)
        -> Result<Profile, AuthError>;
}

/// Non-interactive authentication from the request itself.
#[async_trait]
pub trait SeamlessProvider: AuthProvider {
    async fn seamless_auth(&self, headers: &HeaderMap) -> Result<Profile, AuthError>;

    /// Check that a session issued for `profile` may be used by this request.
    fn validate_request_claims(&self, headers: &HeaderMap, profile: &Profile)
        -> Result<(), AuthError>;
}

/// Authentication capabilities a provider may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    OAuth2,
    Seamless,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::OAuth2 => f.write_str("oauth2"),
            Capability::Seamless => f.write_str("seamless"),
        }
    }
}

/// A configured identity provider.
#[derive(Debug)]
pub enum Provider {
    GitHub(GitHub),
    Google(Google),
    MicrosoftEntraId(MicrosoftEntraId),
    OpenIdConnect(OpenIdConnect),
    PocketId(PocketId),
    TailscaleWhois(TailscaleWhois),
}

impl Provider {
    pub fn as_auth(&self) -> &dyn AuthProvider {
        match self {
            Provider::GitHub(p) => p,
            Provider::Google(p) => p,
            Provider::MicrosoftEntraId(p) => p,
            Provider::OpenIdConnect(p) => p,
            Provider::PocketId(p) => p,
            Provider::TailscaleWhois(p) => p,
        }
    }

    pub fn as_oauth2(&self) -> Option<&dyn OAuth2Provider> {
        match self {
            Provider::GitHub(p) => Some(p),
            Provider::Google(p) => Some(p),
            Provider::MicrosoftEntraId(p) => Some(p),
            Provider::OpenIdConnect(p) => Some(p),
            Provider::PocketId(p) => Some(p),
            Provider::TailscaleWhois(_) => None,
        }
    }

    pub fn as_seamless(&self) -> Option<&dyn SeamlessProvider> {
        match self {
            Provider::TailscaleWhois(p) => Some(p),
            _ => None,
        }
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::with_capacity(2);
        if self.as_oauth2().is_some() {
            caps.push(Capability::OAuth2);
        }
        if self.as_seamless().is_some() {
            caps.push(Capability::Seamless);
        }
        caps
    }

    pub fn provider_type(&self) -> &'static str {
        self.as_auth().provider_type()
    }

    pub fn metadata(&self) -> &ProviderMetadata {
        self.as_auth().metadata()
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }
}

macro_rules! impl_from_provider {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Provider {
                fn from(p: $variant) -> Self {
                    Provider::$variant(p)
                }
            }
        )*
    };
}

impl_from_provider!(GitHub, Google, MicrosoftEntraId, OpenIdConnect, PocketId, TailscaleWhois);

/// Profile from the verified ID token (or UserInfo), with `claim_keys`
/// copied into the additional claims.
pub(crate) async fn retrieve_oidc_profile(
    oauth: &OAuth2Client,
    metadata: &ProviderMetadata,
    token: &OAuth2AccessToken,
    claim_keys: &[&str],
) -> Result<(Profile, ClaimsMap), AuthError> {
    let claims = oauth.identity_claims(token).await?;
    let mut profile = profile_from_claims(&metadata.name, &claims)?;
    copy_claims(&mut profile, &claims, claim_keys);
    Ok((profile, claims))
}

/// Build the HTTP client shared by a provider's outbound calls.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, AuthError> {
    reqwest::Client::builder()
        .user_agent(concat!("forward-auth/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| AuthError::config(format!("failed to build HTTP client: {e}")))
}
