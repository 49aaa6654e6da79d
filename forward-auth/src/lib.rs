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

//! Identity-provider core of a forward-auth gateway.
//!
//! This crate provides the provider abstraction, the OAuth2/OIDC
//! authorization-code engine, the built-in providers (GitHub, Google,
//! Microsoft Entra ID, generic OpenID Connect, PocketID and Tailscale WhoIs)
//! and the policy that turns provider errors into client-facing responses.
//! The binary entry point (`main.rs`) loads configuration and builds the
//! provider registry.

pub mod config;
pub mod error;
pub mod oauth;
pub mod providers;
pub mod response;
pub mod tailscale;
pub mod validators;

pub use error::AuthError;
pub use providers::{Provider, ProviderRegistry};
