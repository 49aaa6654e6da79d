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

//! Error taxonomy for the provider core.
//!
//! Variants carry full detail for logging. What a caller is allowed to see is
//! decided separately by [`crate::response::error_response`].

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Fixed message rendered for every invalid-token failure.
pub const INVALID_TOKEN_MESSAGE: &str = "Access token is invalid";

/// Maximum number of bytes of an upstream response body kept in an error.
const MAX_BODY_IN_ERROR: usize = 512;

/// Errors returned by providers, the OAuth2 engine and the WhoIs client.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid or missing configuration; fatal at startup.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid redirect URI '{uri}': {reason}")]
    InvalidRedirectUri { uri: String, reason: String },

    /// The inbound request does not carry what the provider needs.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network failure reaching an external endpoint.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },

    /// The endpoint answered with a non-2xx status.
    #[error("{endpoint} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// Well-formed HTTP response that violates the expected contract.
    #[error("invalid response from {endpoint}: {detail}")]
    Protocol { endpoint: String, detail: String },

    #[error("missing required claim '{0}'")]
    MissingClaim(String),

    #[error(transparent)]
    InvalidToken(#[from] InvalidTokenError),

    /// Deliberate authentication denial (tailnet or IP mismatch).
    #[error("{0}")]
    PolicyRejected(String),

    /// The local network-identity lookup failed.
    #[error("WhoIs lookup failed: {0}")]
    Lookup(String),
}

impl AuthError {
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config(detail.into())
    }

    pub fn protocol(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Protocol {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }

    pub fn invalid_token(detail: impl Into<String>) -> Self {
        Self::InvalidToken(InvalidTokenError::new(detail))
    }

    /// Classify a `reqwest` failure, separating timeouts from other transport errors.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        let endpoint = endpoint.into();
        if source.is_timeout() {
            Self::Timeout { endpoint }
        } else {
            Self::Transport { endpoint, source }
        }
    }

    pub fn unexpected_status(endpoint: impl Into<String>, status: u16, body: &str) -> Self {
        Self::UnexpectedStatus {
            endpoint: endpoint.into(),
            status,
            body: truncate_body(body),
        }
    }

    /// Whether starting a fresh flow may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { .. } | Self::Timeout { .. } | Self::Lookup(_) => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_IN_ERROR {
        return body.to_string();
    }
    let mut end = MAX_BODY_IN_ERROR;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

/// A token failed structural, signature, issuer, audience or expiry checks.
///
/// The detail is only ever written to logs; rendering always uses
/// [`INVALID_TOKEN_MESSAGE`], including when serialized.
#[derive(Debug, Clone, Error)]
#[error("invalid token: {detail}")]
pub struct InvalidTokenError {
    detail: String,
}

impl InvalidTokenError {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    pub fn detail(&self) -> &str {
        &self.detail
    }
}

impl Serialize for InvalidTokenError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("error", INVALID_TOKEN_MESSAGE)?;
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_token_serializes_without_detail() {
        let err = InvalidTokenError::new("private details");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Access token is invalid" }));
    }

    #[test]
    fn invalid_token_display_keeps_detail_for_logs() {
        let err = AuthError::invalid_token("signature mismatch");
        assert_eq!(err.to_string(), "invalid token: signature mismatch");
    }

    #[test]
    fn server_side_statuses_are_transient() {
        assert!(AuthError::unexpected_status("token", 503, "").is_transient());
        assert!(AuthError::unexpected_status("token", 429, "").is_transient());
        assert!(!AuthError::unexpected_status("token", 400, "").is_transient());
        assert!(AuthError::Lookup("socket closed".into()).is_transient());
    }

    #[test]
    fn validation_failures_are_not_transient() {
        assert!(!AuthError::invalid_token("bad").is_transient());
        assert!(!AuthError::MissingClaim("sub".into()).is_transient());
        assert!(!AuthError::PolicyRejected("nope".into()).is_transient());
        assert!(!AuthError::protocol("token", "bad json").is_transient());
    }

    #[test]
    fn long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match AuthError::unexpected_status("token", 500, &body) {
            AuthError::UnexpectedStatus { body, .. } => {
                assert!(body.len() < 600);
                assert!(body.ends_with('…'));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
