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

//! ID token verification.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Validation};

use crate::error::AuthError;

use super::claims::ClaimsMap;
use super::jwks::JwksCache;

/// How a provider checks the ID tokens returned by its token endpoint.
#[derive(Clone)]
pub enum IdTokenVerifier {
    /// Signature checked against the provider's published JWKS.
    Jwks(Arc<JwksCache>),
    /// Accepts `alg: none` fixtures; claims are still checked.
    #[cfg(test)]
    Unsigned,
}

impl std::fmt::Debug for IdTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Jwks(cache) => f.debug_tuple("Jwks").field(&cache.jwks_url()).finish(),
            #[cfg(test)]
            Self::Unsigned => f.write_str("Unsigned"),
        }
    }
}

impl IdTokenVerifier {
    pub fn jwks(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self::Jwks(Arc::new(JwksCache::new(jwks_url, client)))
    }

    /// Verify `id_token` and return its claims.
    ///
    /// Checks: signature, `exp`, `aud` contains `client_id`, and `iss` ==
    /// `issuer` when an issuer is given.
    pub async fn verify(
        &self,
        id_token: &str,
        client_id: &str,
        issuer: Option<&str>,
    ) -> Result<ClaimsMap, AuthError> {
        match self {
            Self::Jwks(jwks) => verify_with_jwks(jwks, id_token, client_id, issuer).await,
            #[cfg(test)]
            Self::Unsigned => verify_unsigned(id_token, client_id, issuer),
        }
    }
}

async fn verify_with_jwks(
    jwks: &JwksCache,
    id_token: &str,
    client_id: &str,
    issuer: Option<&str>,
) -> Result<ClaimsMap, AuthError> {
    let header = decode_header(id_token)
        .map_err(|e| AuthError::invalid_token(format!("invalid JWT header: {e}")))?;

    let kid = header
        .kid
        .as_deref()
        .ok_or_else(|| AuthError::invalid_token("JWT header missing kid"))?;

    let (alg, key) = jwks.get_key(kid).await?;
    if header.alg != alg {
        return Err(AuthError::invalid_token(format!(
            "JWT alg {:?} does not match key alg {alg:?}",
            header.alg
        )));
    }

    let mut validation = Validation::new(alg);
    validation.set_audience(&[client_id]);
    if let Some(iss) = issuer {
        validation.set_issuer(&[iss]);
    }

    let token_data = decode::<ClaimsMap>(id_token, &key, &validation)
        .map_err(|e| AuthError::invalid_token(format!("JWT validation failed: {e}")))?;

    Ok(token_data.claims)
}

/// Decode an `alg: none` token and check its claims without a signature.
#[cfg(test)]
fn verify_unsigned(
    id_token: &str,
    client_id: &str,
    issuer: Option<&str>,
) -> Result<ClaimsMap, AuthError> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::Value;

    let mut parts = id_token.split('.');
    let (Some(header), Some(payload)) = (parts.next(), parts.next()) else {
        return Err(AuthError::invalid_token("invalid id_token format"));
    };

    let decode_part = |part: &str| -> Result<ClaimsMap, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(part)
            .map_err(|e| AuthError::invalid_token(format!("failed to base64-decode id_token: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AuthError::invalid_token(format!("failed to parse id_token: {e}")))
    };

    let header = decode_part(header)?;
    if header.get("alg").and_then(Value::as_str) != Some("none") {
        return Err(AuthError::invalid_token("expected an unsigned token"));
    }

    let claims = decode_part(payload)?;

    if let Some(expected) = issuer {
        if claims.get("iss").and_then(Value::as_str) != Some(expected) {
            return Err(AuthError::invalid_token("issuer mismatch"));
        }
    }

    let aud_ok = match claims.get("aud") {
        Some(Value::String(aud)) => aud == client_id,
        Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(client_id)),
        _ => false,
    };
    if !aud_ok {
        return Err(AuthError::invalid_token("audience mismatch"));
    }

    if let Some(exp) = claims.get("exp").and_then(Value::as_i64) {
        if exp <= chrono::Utc::now().timestamp() {
            return Err(AuthError::invalid_token("token expired"));
        }
    }

    Ok(claims)
}

/// Helpers for minting ID tokens in tests.
#[cfg(test)]
pub(crate) mod test_tokens {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use serde_json::Value;

    /// Compact-serialize `claims` as an unsigned (`alg: none`) JWT.
    pub fn unsigned(claims: &Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        format!("{header}.{payload}.")
    }

    pub fn in_one_hour() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }
}
