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

//! End-to-end provider flows: configuration to registry, the OAuth2 login
//! round trip against a mock identity provider, Tailscale seamless auth, and
//! the responses callers see when a step fails.


use std::collections::HashMap;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use forward_auth::providers::{
    Capability, OAuth2Provider, SeamlessProvider, TailscaleWhois, TailscaleWhoisOptions,
};
use forward_auth::{AuthError, ProviderRegistry};
use forward_auth_types::ErrorBody;
use serde_json::json;
use test_helpers::*;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn forwarded_for(ip: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-forwarded-for", HeaderValue::from_str(ip).unwrap());
    headers
}

#[tokio::test]
async fn test_oidc_login_round_trip_with_discovery_and_pkce() {
    let idp = start_mock_idp(json!({
        "sub": "user-42",
        "name": "Jane Doe",
        "email": "jane@example.com",
        "email_verified": true,
        "preferred_username": "jane"
    }))
    .await;

    let issuer = idp.uri();
    let config = config_from(&[
        ("OIDC_ISSUER", issuer.as_str()),
        ("OIDC_CLIENT_ID", "forward-auth"),
        ("OIDC_CLIENT_SECRET", "s3cret"),
        ("OIDC_DISPLAY_NAME", "Corp SSO"),
        ("PKCE_KEY", TEST_PKCE_KEY),
    ])
    .expect("load config");
    let registry = config.build_registry().await.expect("build registry");

    let provider = registry.get("openidconnect").expect("provider registered");
    assert_eq!(provider.capabilities(), vec![Capability::OAuth2]);
    assert_eq!(provider.metadata().display_name, "Corp SSO");
    let oauth2 = registry.oauth2("openidconnect").unwrap();

    let authorize = Url::parse(
        &oauth2
            .oauth2_authorize_url("state-abc", TEST_REDIRECT_URI)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(authorize.path(), "/authorize");
    let query: HashMap<_, _> = authorize.query_pairs().into_owned().collect();
    assert_eq!(query["client_id"], "forward-auth");
    assert_eq!(query["redirect_uri"], TEST_REDIRECT_URI);
    assert_eq!(query["response_type"], "code");
    assert_eq!(query["state"], "state-abc");
    assert_eq!(query["code_challenge_method"], "S256");

    // The same state always derives the same challenge.
    let again = Url::parse(
        &oauth2
            .oauth2_authorize_url("state-abc", TEST_REDIRECT_URI)
            .unwrap(),
    )
    .unwrap();
    let again: HashMap<_, _> = again.query_pairs().into_owned().collect();
    assert_eq!(query["code_challenge"], again["code_challenge"]);

    let token = oauth2
        .oauth2_exchange_code("state-abc", "auth-code", TEST_REDIRECT_URI)
        .await
        .expect("exchange code");
    assert_eq!(token.access_token, "access-token");
    assert_eq!(token.scopes, vec!["openid", "profile", "email"]);
    assert!(token.expires.is_some());
    assert!(!token.is_expired(Utc::now()));

    let requests = idp.received_requests().await.unwrap();
    let token_request = requests
        .iter()
        .find(|r| r.url.path() == "/token")
        .expect("token request sent");
    let form: HashMap<String, String> = url::form_urlencoded::parse(&token_request.body)
        .into_owned()
        .collect();
    assert_eq!(form["grant_type"], "authorization_code");
    assert_eq!(form["code"], "auth-code");
    assert_eq!(form["redirect_uri"], TEST_REDIRECT_URI);
    assert!(!form["code_verifier"].is_empty());

    let profile = oauth2
        .oauth2_retrieve_profile(&token)
        .await
        .expect("retrieve profile");
    assert_eq!(profile.provider, "openidconnect");
    assert_eq!(profile.id, "user-42");
    assert_eq!(profile.name.full_name, "Jane Doe");
    assert_eq!(profile.name.nickname.as_deref(), Some("jane"));
    let email = profile.email.expect("email");
    assert_eq!(email.value, "jane@example.com");
    assert!(email.verified);
}

#[tokio::test]
async fn test_discovery_failure_aborts_registry_build() {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&idp)
        .await;

    let issuer = idp.uri();
    let config = config_from(&[
        ("OIDC_ISSUER", issuer.as_str()),
        ("OIDC_CLIENT_ID", "forward-auth"),
        ("OIDC_CLIENT_SECRET", "s3cret"),
    ])
    .unwrap();
    let err = config.build_registry().await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::UnexpectedStatus { status: 503, .. }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_failed_exchange_is_masked_for_callers() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .mount(&idp)
        .await;

    let auth_url = format!("{}/authorize", idp.uri());
    let token_url = format!("{}/token", idp.uri());
    let userinfo_url = format!("{}/userinfo", idp.uri());
    let config = config_from(&[
        ("OIDC_AUTH_URL", auth_url.as_str()),
        ("OIDC_TOKEN_URL", token_url.as_str()),
        ("OIDC_USERINFO_URL", userinfo_url.as_str()),
        ("OIDC_CLIENT_ID", "forward-auth"),
        ("OIDC_CLIENT_SECRET", "s3cret"),
    ])
    .unwrap();
    let registry = config.build_registry().await.unwrap();
    let oauth2 = registry.oauth2("openidconnect").unwrap();

    let err = oauth2
        .oauth2_exchange_code("state", "stale-code", TEST_REDIRECT_URI)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid_grant"));

    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = response_json(resp).await;
    assert_eq!(body.error, "An internal error occurred");
}

#[tokio::test]
async fn test_invalid_redirect_uri_is_a_bad_request() {
    let config = config_from(&[
        ("GITHUB_CLIENT_ID", "cid"),
        ("GITHUB_CLIENT_SECRET", "secret"),
    ])
    .unwrap();
    let registry = config.build_registry().await.unwrap();
    let github = registry.oauth2("github").unwrap();

    let err = github
        .oauth2_authorize_url("state", "/relative/callback")
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidRedirectUri { .. }));

    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = response_json(resp).await;
    assert_eq!(body.error, "Invalid request");
}

#[tokio::test]
async fn test_tailscale_seamless_auth_and_session_binding() {
    let whois = Arc::new(StaticWhoIs::answering(user_node_whois()));
    let provider = TailscaleWhois::with_client(
        TailscaleWhoisOptions {
            allowed_tailnet: Some("example.ts.net".into()),
            capability_names: vec!["example.com/cap/forward-auth".into()],
            ..Default::default()
        },
        whois.clone(),
    )
    .unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register(provider).unwrap();
    let seamless = registry.seamless("tailscalewhois").expect("seamless provider");

    let profile = seamless
        .seamless_auth(&forwarded_for("100.101.102.103"))
        .await
        .expect("authenticated");
    assert_eq!(profile.provider, "tailscalewhois");
    assert_eq!(profile.id, "jane");
    assert_eq!(profile.name.full_name, "Jane Doe");
    assert_eq!(profile.display_name(), "Jane Doe");
    assert!(profile.picture.is_none());
    assert_eq!(profile.claim_str("tailnet"), Some("example.ts.net"));
    assert_eq!(
        profile.additional_claims["https://example.com/cap/forward-auth"],
        json!([{ "groups": ["ops"] }])
    );
    assert_eq!(whois.lookups.lock().unwrap().len(), 1);

    seamless
        .validate_request_claims(&forwarded_for("100.101.102.103"), &profile)
        .expect("same source IP");

    let err = seamless
        .validate_request_claims(&forwarded_for("100.101.102.104"), &profile)
        .unwrap_err();
    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body: ErrorBody = response_json(resp).await;
    assert_eq!(body.error, "Access denied");
}

#[tokio::test]
async fn test_tailscale_lookup_failure_is_masked() {
    let provider =
        TailscaleWhois::with_client(TailscaleWhoisOptions::default(), Arc::new(StaticWhoIs::failing()))
            .unwrap();

    let err = provider
        .seamless_auth(&forwarded_for("100.64.0.9"))
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Lookup(_)));
    assert!(err.is_transient());

    let resp = err.into_response();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: ErrorBody = response_json(resp).await;
    assert_eq!(body.error, "An internal error occurred");
}
