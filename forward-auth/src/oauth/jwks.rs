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

//! Signing-key cache for a provider's published JWKS, with rate-limited refresh.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};

use crate::error::AuthError;

/// Minimum interval between JWKS refreshes.
const JWKS_REFRESH_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
struct JwkEntry {
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    alg: Option<String>,
    #[serde(default, rename = "use")]
    key_use: Option<String>,
    // RSA
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
    // EC
    #[serde(default)]
    crv: Option<String>,
    #[serde(default)]
    x: Option<String>,
    #[serde(default)]
    y: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<JwkEntry>,
}

type KeySet = HashMap<String, (Algorithm, DecodingKey)>;

/// Keys published at a provider's `jwks_uri`, fetched lazily and refreshed
/// when an unknown `kid` shows up (at most once per refresh interval).
///
/// Lookups only take the key-set lock briefly. A refresh is serialized on
/// its own lock, so lookups of known kids never wait on the network.
pub struct JwksCache {
    jwks_url: String,
    client: reqwest::Client,
    keys: RwLock<KeySet>,
    /// Start of the last refresh attempt, successful or not.
    last_refresh: Mutex<Option<Instant>>,
}

impl JwksCache {
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            client,
            keys: RwLock::new(HashMap::new()),
            last_refresh: Mutex::new(None),
        }
    }

    /// A cache with pre-loaded keys that never fetches.
    #[cfg(test)]
    pub fn with_keys(keys: KeySet) -> Self {
        Self {
            jwks_url: String::new(),
            client: reqwest::Client::new(),
            keys: RwLock::new(keys),
            last_refresh: Mutex::new(Some(Instant::now())),
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Get the decoding key for `kid`, refreshing the key set if it is unknown.
    pub async fn get_key(&self, kid: &str) -> Result<(Algorithm, DecodingKey), AuthError> {
        if let Some(found) = self.lookup(kid).await {
            return Ok(found);
        }

        self.refresh().await?;

        self.lookup(kid)
            .await
            .ok_or_else(|| AuthError::invalid_token(format!("no signing key found for kid '{kid}'")))
    }

    async fn lookup(&self, kid: &str) -> Option<(Algorithm, DecodingKey)> {
        let keys = self.keys.read().await;
        keys.get(kid).map(|(alg, key)| (*alg, key.clone()))
    }

    async fn refresh(&self) -> Result<(), AuthError> {
        let mut last_refresh = self.last_refresh.lock().await;
        if last_refresh.is_some_and(|at| at.elapsed() < JWKS_REFRESH_INTERVAL) {
            return Ok(());
        }
        // Failed attempts count toward the interval too.
        *last_refresh = Some(Instant::now());

        let fetched = self.fetch().await?;
        *self.keys.write().await = fetched;
        Ok(())
    }

    async fn fetch(&self) -> Result<KeySet, AuthError> {
        tracing::debug!(url = %self.jwks_url, "Refreshing JWKS");
        let resp = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AuthError::transport(&self.jwks_url, e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(AuthError::unexpected_status(&self.jwks_url, status, &body));
        }

        let doc: JwksDocument = resp.json().await.map_err(|e| {
            AuthError::protocol(&self.jwks_url, format!("failed to parse JWKS: {e}"))
        })?;

        let mut keys = HashMap::new();
        for jwk in &doc.keys {
            let Some(kid) = jwk.kid.clone() else {
                continue;
            };
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                continue;
            }
            match decoding_key(jwk) {
                Some(Ok(key)) => {
                    keys.insert(kid, (jwk_algorithm(jwk), key));
                }
                Some(Err(e)) => {
                    tracing::warn!(kid = %kid, "Skipping unusable JWK: {e}");
                }
                None => {}
            }
        }
        Ok(keys)
    }
}

fn decoding_key(jwk: &JwkEntry) -> Option<Result<DecodingKey, jsonwebtoken::errors::Error>> {
    match jwk.kty.as_str() {
        "RSA" => {
            let n = jwk.n.as_deref().filter(|s| !s.is_empty())?;
            let e = jwk.e.as_deref().filter(|s| !s.is_empty())?;
            Some(DecodingKey::from_rsa_components(n, e))
        }
        "EC" => {
            let x = jwk.x.as_deref().filter(|s| !s.is_empty())?;
            let y = jwk.y.as_deref().filter(|s| !s.is_empty())?;
            Some(DecodingKey::from_ec_components(x, y))
        }
        _ => None,
    }
}

fn jwk_algorithm(jwk: &JwkEntry) -> Algorithm {
    match jwk.alg.as_deref() {
        Some("RS384") => return Algorithm::RS384,
        Some("RS512") => return Algorithm::RS512,
        Some("PS256") => return Algorithm::PS256,
        Some("ES256") => return Algorithm::ES256,
        Some("ES384") => return Algorithm::ES384,
        Some("RS256") => return Algorithm::RS256,
        _ => {}
    }
    match jwk.kty.as_str() {
        "EC" => match jwk.crv.as_deref() {
            Some("P-384") => Algorithm::ES384,
            _ => Algorithm::ES256,
        },
        _ => Algorithm::RS256,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // Parsing only needs well-formed base64url components.
    fn jwks_body() -> serde_json::Value {
        serde_json::json!({
            "keys": [
                { "kid": "rsa-1", "kty": "RSA", "alg": "RS256", "use": "sig", "n": "sXch", "e": "AQAB" },
                { "kid": "enc-1", "kty": "RSA", "use": "enc", "n": "sXch", "e": "AQAB" },
                { "kty": "RSA", "n": "sXch", "e": "AQAB" },
                { "kid": "oct-1", "kty": "oct", "k": "c2VjcmV0" }
            ]
        })
    }

    #[tokio::test]
    async fn fetches_signing_keys_on_first_use() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), reqwest::Client::new());
        let (alg, _) = cache.get_key("rsa-1").await.expect("key should be found");
        assert_eq!(alg, Algorithm::RS256);

        // Cached: no second request.
        cache.get_key("rsa-1").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_kid_is_an_invalid_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body()))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), reqwest::Client::new());
        for kid in ["enc-1", "oct-1", "missing"] {
            let Err(err) = cache.get_key(kid).await else {
                panic!("kid {kid} should not resolve");
            };
            assert!(matches!(err, AuthError::InvalidToken(_)), "kid {kid}");
        }
    }

    #[tokio::test]
    async fn failed_fetch_is_a_transport_level_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), reqwest::Client::new());
        let Err(err) = cache.get_key("rsa-1").await else {
            panic!("fetch against a 503 should fail");
        };
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn failed_fetch_is_not_retried_within_interval() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let cache = JwksCache::new(format!("{}/jwks", server.uri()), reqwest::Client::new());
        let Err(first) = cache.get_key("rsa-1").await else {
            panic!("first lookup should fail");
        };
        assert!(matches!(first, AuthError::UnexpectedStatus { status: 500, .. }));

        let Err(second) = cache.get_key("rsa-1").await else {
            panic!("second lookup should fail");
        };
        assert!(matches!(second, AuthError::InvalidToken(_)));
    }

    #[tokio::test]
    async fn slow_refresh_does_not_block_known_kids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(jwks_body())
                    .set_delay(Duration::from_secs(2)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let cache = Arc::new(JwksCache::new(
            format!("{}/jwks", server.uri()),
            reqwest::Client::new(),
        ));
        cache.keys.write().await.insert(
            "known".to_string(),
            (Algorithm::HS256, DecodingKey::from_secret(b"secret")),
        );

        let refreshing = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.get_key("rsa-1").await.is_ok() }
        });
        // Let the refresh reach the network.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let (alg, _) = tokio::time::timeout(Duration::from_millis(500), cache.get_key("known"))
            .await
            .expect("known kid should not wait for the refresh")
            .expect("known kid resolves");
        assert_eq!(alg, Algorithm::HS256);

        assert!(refreshing.await.unwrap(), "refreshed key set has rsa-1");
    }

    #[test]
    fn algorithm_defaults_follow_key_type() {
        let ec = JwkEntry {
            kid: None,
            kty: "EC".into(),
            alg: None,
            key_use: None,
            n: None,
            e: None,
            crv: Some("P-384".into()),
            x: None,
            y: None,
        };
        assert_eq!(jwk_algorithm(&ec), Algorithm::ES384);
        let rsa = JwkEntry {
            kty: "RSA".into(),
            crv: None,
            ..ec
        };
        assert_eq!(jwk_algorithm(&rsa), Algorithm::RS256);
    }
}
