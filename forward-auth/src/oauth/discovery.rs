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

//! OIDC discovery: fetching `.well-known/openid-configuration`.

use std::time::Duration;

use serde::Deserialize;

use crate::error::AuthError;

use super::client::OAuth2Endpoints;

/// Endpoints discovered from an OIDC provider's `.well-known/openid-configuration`.
#[derive(Debug, Clone, Deserialize)]
pub struct OidcEndpoints {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    #[serde(default)]
    pub jwks_uri: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
}

impl OidcEndpoints {
    pub fn oauth2_endpoints(&self) -> OAuth2Endpoints {
        OAuth2Endpoints {
            authorization: self.authorization_endpoint.clone(),
            token: self.token_endpoint.clone(),
            userinfo: self.userinfo_endpoint.clone(),
        }
    }
}

/// Fetch the discovery document from `{issuer}/.well-known/openid-configuration`.
///
/// The whole request, body included, is bounded by `timeout`.
#[tracing::instrument(skip(client), err(Display))]
pub async fn fetch_oidc_endpoints(
    client: &reqwest::Client,
    issuer: &str,
    timeout: Duration,
) -> Result<OidcEndpoints, AuthError> {
    let url = format!(
        "{}/.well-known/openid-configuration",
        issuer.trim_end_matches('/')
    );

    let fetch = async {
        let resp = client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| AuthError::transport(&url, e))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::unexpected_status(&url, status.as_u16(), &body));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| AuthError::transport(&url, e))?;
        serde_json::from_slice::<OidcEndpoints>(&body).map_err(|e| {
            AuthError::protocol(&url, format!("failed to parse OIDC discovery document: {e}"))
        })
    };

    let endpoints = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| AuthError::Timeout {
            endpoint: url.clone(),
        })??;

    if endpoints.authorization_endpoint.is_empty() || endpoints.token_endpoint.is_empty() {
        return Err(AuthError::protocol(
            &url,
            "discovery document is missing authorization_endpoint or token_endpoint",
        ));
    }

    tracing::debug!(
        authorization = %endpoints.authorization_endpoint,
        token = %endpoints.token_endpoint,
        "Discovered OIDC endpoints"
    );
    Ok(endpoints)
}
