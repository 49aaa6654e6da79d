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

//! Google accounts via OpenID Connect.

use std::time::Duration;

use async_trait::async_trait;
use forward_auth_types::{OAuth2AccessToken, Profile};
use serde_json::Value;

use crate::error::AuthError;
use crate::oauth::claims::forward_claims;
use crate::oauth::{
    ClaimsMap, IdTokenVerifier, OAuth2Client, OAuth2ClientOptions, OAuth2Endpoints, PkceKey,
};

use super::{
    http_client, retrieve_oidc_profile, AuthProvider, MetadataOptions, OAuth2Provider,
    ProviderMetadata, DEFAULT_HTTP_TIMEOUT,
};

pub const GOOGLE_AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_ISSUER: &str = "https://accounts.google.com";
pub const GOOGLE_JWKS_URL: &str = "https://www.googleapis.com/oauth2/v3/certs";

/// Hosted domain of a Google Workspace account.
pub const CLAIM_HOSTED_DOMAIN: &str = "hd";

const GOOGLE_SCOPE: &str = "openid profile email";

#[derive(Debug, Clone, Default)]
pub struct GoogleOptions {
    pub client_id: String,
    pub client_secret: String,
    pub pkce_key: Option<PkceKey>,
    pub request_timeout: Option<Duration>,
    pub metadata: MetadataOptions,
}

#[derive(Debug)]
pub struct Google {
    metadata: ProviderMetadata,
    oauth: OAuth2Client,
}

impl Google {
    pub fn new(opts: GoogleOptions) -> Result<Self, AuthError> {
        let http = http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;
        let endpoints = OAuth2Endpoints {
            authorization: GOOGLE_AUTHORIZE_ENDPOINT.to_string(),
            token: GOOGLE_TOKEN_ENDPOINT.to_string(),
            userinfo: None,
        };
        let verifier = IdTokenVerifier::jwks(GOOGLE_JWKS_URL, http.clone());
        Self::with_endpoints(opts, http, endpoints, verifier)
    }

    pub(crate) fn with_endpoints(
        opts: GoogleOptions,
        http: reqwest::Client,
        endpoints: OAuth2Endpoints,
        verifier: IdTokenVerifier,
    ) -> Result<Self, AuthError> {
        if opts.client_id.is_empty() {
            return Err(AuthError::config("Google client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("Google client secret is required"));
        }

        let oauth = OAuth2Client::new(OAuth2ClientOptions {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            endpoints,
            scope: GOOGLE_SCOPE.to_string(),
            pkce_key: opts.pkce_key,
            http_client: http,
            id_token_verifier: Some(verifier),
            token_issuer: Some(GOOGLE_ISSUER.to_string()),
        })?;

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "google", "Google", "google", "red",
            )),
            oauth,
        })
    }
}

impl AuthProvider for Google {
    fn provider_type(&self) -> &'static str {
        "google"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value)) {
        forward_claims(claims, &[CLAIM_HOSTED_DOMAIN], set);
    }
}

#[async_trait]
impl OAuth2Provider for Google {
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
        let (profile, _) =
            retrieve_oidc_profile(&self.oauth, &self.metadata, token, &[CLAIM_HOSTED_DOMAIN])
                .await?;
        Ok(profile)
    }
}
