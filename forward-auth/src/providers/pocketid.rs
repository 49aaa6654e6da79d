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

//! PocketID, a self-hosted passkey OIDC server with fixed endpoint paths.

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

pub const CLAIM_GROUPS: &str = "groups";

const POCKETID_SCOPE: &str = "openid profile email groups";

#[derive(Debug, Clone, Default)]
pub struct PocketIdOptions {
    /// Base URL of the PocketID instance.
    pub endpoint: String,
    pub client_id: String,
    pub client_secret: String,
    pub pkce_key: Option<PkceKey>,
    pub request_timeout: Option<Duration>,
    pub metadata: MetadataOptions,
}

#[derive(Debug)]
pub struct PocketId {
    metadata: ProviderMetadata,
    oauth: OAuth2Client,
}

impl PocketId {
    pub fn new(opts: PocketIdOptions) -> Result<Self, AuthError> {
        let base = opts.endpoint.trim().trim_end_matches('/').to_string();
        if base.is_empty() {
            return Err(AuthError::config("PocketID endpoint is required"));
        }
        if opts.client_id.is_empty() {
            return Err(AuthError::config("PocketID client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("PocketID client secret is required"));
        }

        let http = http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;
        let verifier = IdTokenVerifier::jwks(format!("{base}/.well-known/jwks.json"), http.clone());

        let oauth = OAuth2Client::new(OAuth2ClientOptions {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            endpoints: OAuth2Endpoints {
                authorization: format!("{base}/authorize"),
                token: format!("{base}/api/oidc/token"),
                userinfo: Some(format!("{base}/api/oidc/userinfo")),
            },
            scope: POCKETID_SCOPE.to_string(),
            pkce_key: opts.pkce_key,
            http_client: http,
            id_token_verifier: Some(verifier),
            token_issuer: Some(base),
        })?;

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "pocketid", "PocketID", "pocketid", "purple",
            )),
            oauth,
        })
    }
}

impl AuthProvider for PocketId {
    fn provider_type(&self) -> &'static str {
        "pocketid"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value)) {
        forward_claims(claims, &[CLAIM_GROUPS], set);
    }
}

#[async_trait]
impl OAuth2Provider for PocketId {
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
            retrieve_oidc_profile(&self.oauth, &self.metadata, token, &[CLAIM_GROUPS]).await?;
        Ok(profile)
    }
}
