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

//! Stateless PKCE (RFC 7636).
//!
//! The code verifier is derived from the flow's `state` with HMAC-SHA256 under
//! a configured key, so any instance holding the key can regenerate the
//! verifier at exchange time without server-side storage.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use oauth2::{PkceCodeChallenge, PkceCodeVerifier};
use sha2::Sha256;

use crate::error::AuthError;

/// Minimum accepted key length, in bytes.
pub const MIN_PKCE_KEY_LEN: usize = 16;

/// Domain separator mixed into every derivation.
const DERIVATION_CONTEXT: &[u8] = b"forward-auth/pkce/v1:";

/// Secret used to derive per-flow code verifiers.
#[derive(Clone)]
pub struct PkceKey(Vec<u8>);

impl PkceKey {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, AuthError> {
        let key = key.into();
        if key.len() < MIN_PKCE_KEY_LEN {
            return Err(AuthError::config(format!(
                "PKCE key must be at least {MIN_PKCE_KEY_LEN} bytes"
            )));
        }
        Ok(Self(key))
    }

    /// Derive the code verifier for `state`.
    pub fn code_verifier(&self, state: &str) -> PkceCodeVerifier {
        let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(&self.0)
            .expect("HMAC-SHA256 accepts keys of any length");
        mac.update(DERIVATION_CONTEXT);
        mac.update(state.as_bytes());
        PkceCodeVerifier::new(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// Compute the S256 challenge for `state`.
    pub fn code_challenge(&self, state: &str) -> PkceCodeChallenge {
        PkceCodeChallenge::from_code_verifier_sha256(&self.code_verifier(state))
    }
}

impl std::fmt::Debug for PkceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PkceKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::Digest;

    fn key() -> PkceKey {
        PkceKey::new(b"01234567890123456789012345678901".to_vec()).unwrap()
    }

    #[test]
    fn short_keys_are_rejected() {
        assert!(PkceKey::new(b"short".to_vec()).is_err());
    }

    #[test]
    fn verifier_is_deterministic_per_state() {
        let k = key();
        assert_eq!(
            k.code_verifier("state-1").secret(),
            k.code_verifier("state-1").secret()
        );
        assert_ne!(
            k.code_verifier("state-1").secret(),
            k.code_verifier("state-2").secret()
        );
    }

    #[test]
    fn verifier_depends_on_key() {
        let other = PkceKey::new(b"abcdefghijklmnopqrstuvwxyz012345".to_vec()).unwrap();
        assert_ne!(
            key().code_verifier("state").secret(),
            other.code_verifier("state").secret()
        );
    }

    #[test]
    fn verifier_has_rfc7636_shape() {
        let verifier = key().code_verifier("state");
        let v = verifier.secret();
        assert_eq!(v.len(), 43);
        assert!(v
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn challenge_is_sha256_of_verifier() {
        let k = key();
        let verifier = k.code_verifier("state");
        let expected = URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(verifier.secret().as_bytes()));
        let challenge = k.code_challenge("state");
        assert_eq!(challenge.as_str(), expected);
        assert_eq!(challenge.method().as_str(), "S256");
    }

    #[test]
    fn debug_does_not_leak_key() {
        assert_eq!(format!("{:?}", key()), "PkceKey(<redacted>)");
    }
}
