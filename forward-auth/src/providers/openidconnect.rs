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

//! Generic OpenID Connect provider, configured with explicit endpoints or
//! discovered from the issuer.

use std::time::Duration;

use async_trait::async_trait;
use forward_auth_types::{OAuth2AccessToken, Profile};
use serde_json::Value;

use crate::error::AuthError;
use crate::oauth::{
    fetch_oidc_endpoints, ClaimsMap, IdTokenVerifier, OAuth2Client, OAuth2ClientOptions,
    OAuth2Endpoints, PkceKey,
};

use super::{
    http_client, retrieve_oidc_profile, AuthProvider, MetadataOptions, OAuth2Provider,
    ProviderMetadata, DEFAULT_HTTP_TIMEOUT,
};

/// Default bound on the discovery request made at construction.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

const OIDC_SCOPE: &str = "openid profile email";

#[derive(Debug, Clone, Default)]
pub struct OpenIdConnectOptions {
    pub client_id: String,
    pub client_secret: String,
    /// Issuer URL used for discovery when `endpoints` is not set.
    pub issuer: Option<String>,
    /// Explicit endpoints; skips discovery.
    pub endpoints: Option<OAuth2Endpoints>,
    /// JWKS used to verify ID tokens. Without one (configured or
    /// discovered), profiles come from the UserInfo endpoint.
    pub jwks_url: Option<String>,
    /// Expected `iss` of ID tokens; defaults to the discovered issuer.
    pub token_issuer: Option<String>,
    pub pkce_key: Option<PkceKey>,
    pub request_timeout: Option<Duration>,
    pub discovery_timeout: Option<Duration>,
    pub metadata: MetadataOptions,
}

#[derive(Debug)]
pub struct OpenIdConnect {
    metadata: ProviderMetadata,
    oauth: OAuth2Client,
}

impl OpenIdConnect {
    /// Build the provider, running discovery against `issuer` when no
    /// explicit endpoints are configured. Fails if discovery fails.
    pub async fn new(mut opts: OpenIdConnectOptions) -> Result<Self, AuthError> {
        let http = http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;

        if let Some(endpoints) = opts.endpoints.take() {
            return Self::build(opts, http, endpoints);
        }

        let issuer = opts
            .issuer
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AuthError::config("OpenID Connect needs either an issuer or explicit endpoints")
            })?;

        let discovered = fetch_oidc_endpoints(
            &http,
            &issuer,
            opts.discovery_timeout.unwrap_or(DEFAULT_DISCOVERY_TIMEOUT),
        )
        .await?;

        if opts.jwks_url.is_none() {
            opts.jwks_url = discovered.jwks_uri.clone();
        }
        if opts.token_issuer.is_none() {
            opts.token_issuer = discovered.issuer.clone().or(Some(issuer));
        }
        Self::build(opts, http, discovered.oauth2_endpoints())
    }

    /// Build the provider against explicit endpoints, without discovery.
    pub fn with_endpoints(
        opts: OpenIdConnectOptions,
        endpoints: OAuth2Endpoints,
    ) -> Result<Self, AuthError> {
        let http = http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;
        Self::build(opts, http, endpoints)
    }

    fn build(
        opts: OpenIdConnectOptions,
        http: reqwest::Client,
        endpoints: OAuth2Endpoints,
    ) -> Result<Self, AuthError> {
        if opts.client_id.is_empty() {
            return Err(AuthError::config("OpenID Connect client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("OpenID Connect client secret is required"));
        }

        let verifier = opts
            .jwks_url
            .filter(|u| !u.is_empty())
            .map(|url| IdTokenVerifier::jwks(url, http.clone()));
        if verifier.is_none() && endpoints.userinfo.is_none() {
            return Err(AuthError::config(
                "OpenID Connect needs a JWKS URL or a userinfo endpoint to identify users",
            ));
        }

        let oauth = OAuth2Client::new(OAuth2ClientOptions {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            endpoints,
            scope: OIDC_SCOPE.to_string(),
            pkce_key: opts.pkce_key,
            http_client: http,
            id_token_verifier: verifier,
            token_issuer: opts.token_issuer,
        })?;

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "openidconnect",
                "OpenID Connect",
                "openid",
                "slate",
            )),
            oauth,
        })
    }
}

impl AuthProvider for OpenIdConnect {
    fn provider_type(&self) -> &'static str {
        "openidconnect"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, _claims: &ClaimsMap, _set: &mut dyn FnMut(&str, Value)) {}
}

#[async_trait]
impl OAuth2Provider for OpenIdConnect {
    fn oauth2_authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError> {
        self.oauth.authorize_url(state, redirect_uri)
    }

    async fn oauth2_exchange_code(
        &self,
        state: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuth2AccessToken, AuthError> {
        self.oauth.exchange_code(state, code, redirect_uri).await
    }

    async fn oauth2_retrieve_profile(
        &self,
        token: &OAuth2AccessToken,
    ) -> Result<Profile, AuthError> {
        let (profile, _) = retrieve_oidc_profile(&self.oauth, &self.metadata, token, &[]).await?;
        Ok(profile)
    }
}
