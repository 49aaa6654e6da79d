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

//! GitHub OAuth app. The profile comes from the GraphQL API, GitHub does not
//! issue ID tokens.

use std::time::Duration;

use async_trait::async_trait;
use forward_auth_types::{OAuth2AccessToken, Profile, ProfileEmail, ProfileName};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AuthError;
use crate::oauth::claims::forward_claims;
use crate::oauth::{ClaimsMap, OAuth2Client, OAuth2ClientOptions, OAuth2Endpoints, PkceKey};

use super::{
    http_client, AuthProvider, MetadataOptions, OAuth2Provider, ProviderMetadata,
    DEFAULT_HTTP_TIMEOUT,
};

pub const GITHUB_AUTHORIZE_ENDPOINT: &str = "https://github.com/login/oauth/authorize";
pub const GITHUB_TOKEN_ENDPOINT: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_GRAPHQL_ENDPOINT: &str = "https://api.github.com/graphql";

/// Claim holding GitHub's opaque node ID of the user.
pub const CLAIM_GITHUB_USER_ID: &str = "githubUserId";

const GITHUB_SCOPE: &str = "user";
const VIEWER_QUERY: &str = "{ viewer { id login name email avatarUrl } }";

#[derive(Debug, Clone, Default)]
pub struct GitHubOptions {
    pub client_id: String,
    pub client_secret: String,
    pub pkce_key: Option<PkceKey>,
    /// Per-request timeout; defaults to [`DEFAULT_HTTP_TIMEOUT`].
    pub request_timeout: Option<Duration>,
    pub metadata: MetadataOptions,
}

#[derive(Debug)]
pub struct GitHub {
    metadata: ProviderMetadata,
    oauth: OAuth2Client,
    graphql_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<ViewerData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct ViewerData {
    viewer: Viewer,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Viewer {
    id: String,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

impl GitHub {
    pub fn new(opts: GitHubOptions) -> Result<Self, AuthError> {
        let endpoints = OAuth2Endpoints {
            authorization: GITHUB_AUTHORIZE_ENDPOINT.to_string(),
            token: GITHUB_TOKEN_ENDPOINT.to_string(),
            userinfo: None,
        };
        Self::with_endpoints(opts, endpoints, GITHUB_GRAPHQL_ENDPOINT)
    }

    pub(crate) fn with_endpoints(
        opts: GitHubOptions,
        endpoints: OAuth2Endpoints,
        graphql_endpoint: &str,
    ) -> Result<Self, AuthError> {
        if opts.client_id.is_empty() {
            return Err(AuthError::config("GitHub client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("GitHub client secret is required"));
        }

        let oauth = OAuth2Client::new(OAuth2ClientOptions {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            endpoints,
            scope: GITHUB_SCOPE.to_string(),
            pkce_key: opts.pkce_key,
            http_client: http_client(opts.request_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT))?,
            id_token_verifier: None,
            token_issuer: None,
        })?;

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "github", "GitHub", "github", "slate",
            )),
            oauth,
            graphql_endpoint: graphql_endpoint.to_string(),
        })
    }

    #[tracing::instrument(skip_all, err(Display))]
    async fn fetch_viewer(&self, access_token: &str) -> Result<Viewer, AuthError> {
        let endpoint = self.graphql_endpoint.as_str();
        let resp = self
            .oauth
            .http()
            .post(endpoint)
            .header(reqwest::header::AUTHORIZATION, format!("token {access_token}"))
            .json(&json!({ "query": VIEWER_QUERY }))
            .send()
            .await
            .map_err(|e| AuthError::transport(endpoint, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::transport(endpoint, e))?;
        if !status.is_success() {
            return Err(AuthError::unexpected_status(endpoint, status.as_u16(), &body));
        }

        let parsed: GraphQlResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::protocol(endpoint, format!("failed to parse GraphQL response: {e}"))
        })?;

        if !parsed.errors.is_empty() {
            let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(AuthError::protocol(
                endpoint,
                format!("GraphQL errors: {}", messages.join("; ")),
            ));
        }

        let viewer = parsed
            .data
            .map(|d| d.viewer)
            .ok_or_else(|| AuthError::protocol(endpoint, "GraphQL response has no viewer"))?;
        if viewer.login.is_empty() {
            return Err(AuthError::protocol(endpoint, "GraphQL viewer has no login"));
        }
        Ok(viewer)
    }
}

impl AuthProvider for GitHub {
    fn provider_type(&self) -> &'static str {
        "github"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value)) {
        forward_claims(claims, &[CLAIM_GITHUB_USER_ID], set);
    }
}

#[async_trait]
impl OAuth2Provider for GitHub {
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
        let viewer = self.fetch_viewer(&token.access_token).await?;

        let full_name = viewer
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| viewer.login.clone());

        let mut profile = Profile {
            provider: self.metadata.name.clone(),
            id: viewer.login.clone(),
            email: viewer
                .email
                .filter(|e| !e.is_empty())
                .map(ProfileEmail::new),
            name: ProfileName {
                full_name,
                nickname: Some(viewer.login),
            },
            picture: viewer.avatar_url.filter(|u| !u.is_empty()),
            additional_claims: Default::default(),
        };
        if !viewer.id.is_empty() {
            profile
                .additional_claims
                .insert(CLAIM_GITHUB_USER_ID.to_string(), Value::String(viewer.id));
        }
        Ok(profile)
    }
}
