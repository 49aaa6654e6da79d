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

//! Validation of Tailscale peer-capability names.
//!
//! A capability name has the canonical form `<host>/<path>`, for example
//! `example.com/cap/forward-auth`. Administrators may also write it with an
//! `https://` prefix, which is stripped during normalization.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::AuthError;

const HOSTNAME_PATTERN: &str =
    r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$";

static HOSTNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(HOSTNAME_PATTERN).expect("valid regex"));

/// Whether `name` is an already-normalized capability name (`<host>/<path>`).
pub fn is_tailscale_capability_name(name: &str) -> bool {
    let Some((host, path)) = name.split_once('/') else {
        return false;
    };
    if host.is_empty() || host.len() > 253 || !HOSTNAME_RE.is_match(host) {
        return false;
    }
    if path.trim_matches('/').is_empty() {
        return false;
    }
    !path.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Normalize an admin-supplied capability name to `<host>/<path>`.
///
/// Accepts a bare `host/path` or `https://host/path`; rejects `http://`.
pub fn normalize_capability_name(name: &str) -> Result<String, AuthError> {
    if name.starts_with("http://") {
        return Err(AuthError::config(format!(
            "capability name '{name}' must not use the http:// scheme"
        )));
    }
    let normalized = name.strip_prefix("https://").unwrap_or(name);
    if !is_tailscale_capability_name(normalized) {
        return Err(AuthError::config(format!(
            "capability name '{name}' is invalid: expected '<host>/<path>'"
        )));
    }
    Ok(normalized.to_string())
}
