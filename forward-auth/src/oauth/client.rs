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

//! Authorization-code flow shared by every OAuth2 provider: authorize URL
//! construction, code exchange, ID token verification and UserInfo.

use chrono::Utc;
use forward_auth_types::OAuth2AccessToken;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::AuthError;

use super::claims::ClaimsMap;
use super::pkce::PkceKey;
use super::verify::IdTokenVerifier;

/// The endpoints an OAuth2 provider talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Endpoints {
    pub authorization: String,
    pub token: String,
    pub userinfo: Option<String>,
}

/// Everything needed to build an [`OAuth2Client`].
#[derive(Debug, Clone)]
pub struct OAuth2ClientOptions {
    pub client_id: String,
    pub client_secret: String,
    pub endpoints: OAuth2Endpoints,
    /// Space-delimited scopes requested at the authorization endpoint.
    pub scope: String,
    /// Enables stateless PKCE when set.
    pub pkce_key: Option<PkceKey>,
    pub http_client: reqwest::Client,
    /// Used to check ID tokens. Without one, ID tokens are never trusted.
    pub id_token_verifier: Option<IdTokenVerifier>,
    /// Expected `iss` of ID tokens; not checked when unset.
    pub token_issuer: Option<String>,
}

/// Raw response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug)]
pub struct OAuth2Client {
    client_id: String,
    client_secret: String,
    authorization_url: Url,
    endpoints: OAuth2Endpoints,
    scope: String,
    pkce_key: Option<PkceKey>,
    http: reqwest::Client,
    verifier: Option<IdTokenVerifier>,
    token_issuer: Option<String>,
}

impl OAuth2Client {
    pub fn new(opts: OAuth2ClientOptions) -> Result<Self, AuthError> {
        if opts.client_id.is_empty() {
            return Err(AuthError::config("client ID is required"));
        }
        if opts.client_secret.is_empty() {
            return Err(AuthError::config("client secret is required"));
        }

        let authorization_url = parse_endpoint("authorization", &opts.endpoints.authorization)?;
        parse_endpoint("token", &opts.endpoints.token)?;
        if let Some(userinfo) = &opts.endpoints.userinfo {
            parse_endpoint("userinfo", userinfo)?;
        }

        Ok(Self {
            client_id: opts.client_id,
            client_secret: opts.client_secret,
            authorization_url,
            endpoints: opts.endpoints,
            scope: opts.scope,
            pkce_key: opts.pkce_key,
            http: opts.http_client,
            verifier: opts.id_token_verifier,
            token_issuer: opts.token_issuer.filter(|s| !s.is_empty()),
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn endpoints(&self) -> &OAuth2Endpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn pkce_enabled(&self) -> bool {
        self.pkce_key.is_some()
    }

    #[cfg(test)]
    pub(crate) fn set_id_token_verifier(&mut self, verifier: IdTokenVerifier) {
        self.verifier = Some(verifier);
    }

    /// Build the URL the caller's browser is redirected to.
    pub fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, AuthError> {
        validate_redirect_uri(redirect_uri)?;

        let mut url = self.authorization_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("client_id", &self.client_id);
            pairs.append_pair("redirect_uri", redirect_uri);
            pairs.append_pair("response_type", "code");
            pairs.append_pair("scope", &self.scope);
            pairs.append_pair("state", state);

            if let Some(key) = &self.pkce_key {
                let challenge = key.code_challenge(state);
                pairs.append_pair("code_challenge", challenge.as_str());
                pairs.append_pair("code_challenge_method", challenge.method().as_str());
            }
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for an access token.
    ///
    /// An ID token in the response is verified before the token is returned.
    #[tracing::instrument(skip(self, code), fields(token_endpoint = %self.endpoints.token), err(Display))]
    pub async fn exchange_code(
        &self,
        state: &str,
        code: &str,
        redirect_uri: &str,
    ) -> Result<OAuth2AccessToken, AuthError> {
        let endpoint = self.endpoints.token.as_str();

        let code_verifier = self
            .pkce_key
            .as_ref()
            .map(|key| key.code_verifier(state).secret().to_string());

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        if let Some(verifier) = &code_verifier {
            params.push(("code_verifier", verifier.as_str()));
        }

        let resp = self
            .http
            .post(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::transport(endpoint, e))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| AuthError::transport(endpoint, e))?;
        if status != reqwest::StatusCode::OK {
            return Err(AuthError::unexpected_status(endpoint, status.as_u16(), &body));
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            AuthError::protocol(endpoint, format!("failed to parse token response: {e}"))
        })?;

        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            let detail = match parsed.error_description {
                Some(desc) if !desc.is_empty() => format!("{error}: {desc}"),
                _ => error,
            };
            return Err(AuthError::protocol(endpoint, detail));
        }

        let access_token = parsed
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::protocol(endpoint, "token response is missing access_token"))?;

        let token = OAuth2AccessToken {
            access_token,
            id_token: parsed.id_token.filter(|t| !t.is_empty()),
            scopes: parsed
                .scope
                .as_deref()
                .map(OAuth2AccessToken::parse_scopes)
                .unwrap_or_default(),
            expires: parsed
                .expires_in
                .as_ref()
                .and_then(expires_in_secs)
                .and_then(chrono::Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)),
        };

        if token.id_token.is_some() && self.verifier.is_some() {
            self.verified_id_token_claims(&token).await?;
        }

        tracing::debug!(scopes = ?token.scopes, has_id_token = token.id_token.is_some(), "Exchanged authorization code");
        Ok(token)
    }

    /// Claims of the token's ID token, verified. `None` when there is no ID
    /// token or no verifier to check it with.
    pub async fn verified_id_token_claims(
        &self,
        token: &OAuth2AccessToken,
    ) -> Result<Option<ClaimsMap>, AuthError> {
        let (Some(id_token), Some(verifier)) = (token.id_token.as_deref(), &self.verifier) else {
            return Ok(None);
        };
        let claims = verifier
            .verify(id_token, &self.client_id, self.token_issuer.as_deref())
            .await?;
        Ok(Some(claims))
    }

    /// Fetch the caller's claims from the UserInfo endpoint.
    #[tracing::instrument(skip_all, err(Display))]
    pub async fn userinfo(&self, access_token: &str) -> Result<ClaimsMap, AuthError> {
        let endpoint = self
            .endpoints
            .userinfo
            .as_deref()
            .ok_or_else(|| AuthError::config("provider has no userinfo endpoint"))?;

        let resp = self
            .http
            .get(endpoint)
            .header(reqwest::header::ACCEPT, "application/json")
            .bearer_auth(access_token)
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

        serde_json::from_str::<ClaimsMap>(&body).map_err(|e| {
            AuthError::protocol(endpoint, format!("failed to parse userinfo response: {e}"))
        })
    }

    /// Caller claims for profile building: the verified ID token when
    /// available, otherwise the UserInfo response.
    pub async fn identity_claims(&self, token: &OAuth2AccessToken) -> Result<ClaimsMap, AuthError> {
        if let Some(claims) = self.verified_id_token_claims(token).await? {
            return Ok(claims);
        }
        if token.id_token.is_some() && self.verifier.is_none() {
            tracing::debug!("No ID token verifier configured; ignoring ID token");
        }
        if self.endpoints.userinfo.is_some() {
            return self.userinfo(&token.access_token).await;
        }
        Err(AuthError::MissingClaim("id_token".into()))
    }
}

fn parse_endpoint(kind: &str, raw: &str) -> Result<Url, AuthError> {
    let url = Url::parse(raw)
        .map_err(|e| AuthError::config(format!("invalid {kind} endpoint '{raw}': {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AuthError::config(format!(
            "{kind} endpoint '{raw}' must use http or https"
        )));
    }
    Ok(url)
}

/// The redirect URI must be an absolute http(s) URL.
pub fn validate_redirect_uri(redirect_uri: &str) -> Result<(), AuthError> {
    let invalid = |reason: &str| AuthError::InvalidRedirectUri {
        uri: redirect_uri.to_string(),
        reason: reason.to_string(),
    };
    let url = Url::parse(redirect_uri).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(invalid("missing host")),
    }
}

// `expires_in` is a number per RFC 6749, but some servers send a string.
fn expires_in_secs(v: &Value) -> Option<i64> {
    let secs = match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    secs.filter(|secs| *secs > 0)
}
