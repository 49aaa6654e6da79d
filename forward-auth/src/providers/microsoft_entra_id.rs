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

//! Microsoft Entra ID (formerly Azure AD), v2.0 endpoints.

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

const LOGIN_BASE: &str = "https://login.microsoftonline.com";

/// Object ID of the user, stable across applications in the tenant.
pub const CLAIM_OBJECT_ID: &str = "oid";
pub const CLAIM_TENANT_ID: &str = "tid";
/// Directory role template IDs assigned to the user.
pub const CLAIM_WIDS: &str = "wids";

const ENTRA_SCOPE: &str = "openid profile email";

/// Multi-tenant aliases: tokens carry the user's own tenant in `iss`.
const MULTI_TENANT_ALIASES: [&str; 3] = ["common", "organizations", "consumers"];

#[derive(Debug, Clone, Default)]
pub struct MicrosoftEntraIdOptions {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub pkce_key: Option<PkceKey>,
    pub request_timeout: Option<Duration>,
    pub metadata: MetadataOptions,
}

#[derive(Debug)]
pub struct MicrosoftEntraId {
    metadata: ProviderMetadata,
    oauth: OAuth2Client,
}

/// Expected token issuer for `tenant_id`, unknown for multi-tenant aliases.
fn tenant_issuer(tenant_id: &str) -> Option<String> {
    if MULTI_TENANT_ALIASES.contains(&tenant_id) {
        return None;
    }
    Some(format!("{LOGIN_BASE}/{tenant_id}/v2.0"))
}

impl MicrosoftEntraId {
    pub fn new(opts: MicrosoftEntraIdOptions) -> Result<Self, AuthError> {
        let tenant = opts.tenant_id.trim();
        if tenant.is_empty() {
            return Err(AuthError::config("Microsoft Entra ID tenant ID is required"));
        }
        let http = http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?;
        let endpoints = OAuth2Endpoints {
            authorization: format!("{LOGIN_BASE}/{tenant}/oauth2/v2.0/authorize"),
            token: format!("{LOGIN_BASE}/{tenant}/oauth2/v2.0/token"),
            userinfo: None,
        };
        let verifier =
            IdTokenVerifier::jwks(format!("{LOGIN_BASE}/{tenant}/discovery/v2.0/keys"), http.clone());
        Self::with_endpoints(opts, http, endpoints, verifier)
    }

    pub(crate) fn with_endpoints(
        opts: MicrosoftEntraIdOptions,
        http: reqwest::Client,
        endpoints: OAuth2Endpoints,
        verifier: IdTokenVerifier,
    ) -> Result<Self, AuthError> {
        if opts.client_id.is_empty() {
            return Err(AuthError::config("Microsoft Entra ID client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("Microsoft Entra ID client secret is required"));
        }

        let oauth = OAuth2Client::new(OAuth2ClientOptions {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            endpoints,
            scope: ENTRA_SCOPE.to_string(),
            pkce_key: opts.pkce_key,
            http_client: http,
            id_token_verifier: Some(verifier),
            token_issuer: tenant_issuer(opts.tenant_id.trim()),
        })?;

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "microsoftentraid",
                "Microsoft Entra ID",
                "microsoft",
                "teal",
            )),
            oauth,
        })
    }
}

impl AuthProvider for MicrosoftEntraId {
    fn provider_type(&self) -> &'static str {
        "microsoftentraid"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value)) {
        forward_claims(claims, &[CLAIM_TENANT_ID, CLAIM_WIDS], set);
    }
}

#[async_trait]
impl OAuth2Provider for MicrosoftEntraId {
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
        let (mut profile, claims) = retrieve_oidc_profile(
            &self.oauth,
            &self.metadata,
            token,
            &[CLAIM_TENANT_ID, CLAIM_WIDS],
        )
        .await?;

        // `sub` is pairwise per application; `oid` identifies the user.
        if let Some(oid) = claims
            .get(CLAIM_OBJECT_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
        {
            profile.id = oid.to_string();
        }
        Ok(profile)
    }
}
