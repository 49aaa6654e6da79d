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

//! Generic OAuth2/OIDC machinery: the authorization-code client, OIDC
//! discovery, JWKS caching, ID token verification, stateless PKCE and
//! claims-to-profile mapping.

pub mod claims;
pub mod client;
pub mod discovery;
pub mod jwks;
pub mod pkce;
pub mod verify;

pub use claims::{profile_from_claims, ClaimsMap};
pub use client::{validate_redirect_uri, OAuth2Client, OAuth2ClientOptions, OAuth2Endpoints};
pub use discovery::{fetch_oidc_endpoints, OidcEndpoints};
pub use jwks::JwksCache;
pub use pkce::{PkceKey, MIN_PKCE_KEY_LEN};
pub use verify::IdTokenVerifier;
