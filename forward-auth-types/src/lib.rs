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

//! Shared identity types for the forward-auth provider core.
//!
//! This crate defines the contract between the provider core and its
//! consumers (request handlers, the session-issuance layer, tests).
//! It does not depend on axum or any HTTP client.

pub mod error;
pub mod profile;
pub mod token;

pub use error::ErrorBody;
pub use profile::{AdditionalClaims, Profile, ProfileEmail, ProfileName};
pub use token::OAuth2AccessToken;
