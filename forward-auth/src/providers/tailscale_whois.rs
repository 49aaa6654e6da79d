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

//! Seamless authentication of requests arriving over a Tailscale network.
//!
//! The source address comes from `X-Forwarded-For` (set by the reverse proxy)
//! and is resolved to a node and user with a WhoIs lookup against the local
//! tailscaled.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::HeaderMap;
use forward_auth_types::{Profile, ProfileEmail, ProfileName};
use serde_json::Value;

use crate::error::AuthError;
use crate::oauth::ClaimsMap;
use crate::tailscale::{LocalApiClient, WhoIsClient, WhoIsResponse};
use crate::validators::is_tailscale_capability_name;

use super::{AuthProvider, MetadataOptions, ProviderMetadata, SeamlessProvider};

pub const CLAIM_IP: &str = "ip";
pub const CLAIM_TAILNET: &str = "tailnet";
pub const CLAIM_HOSTNAME: &str = "hostname";
pub const CLAIM_TAGGED_DEVICE: &str = "taggedDevice";

const HEADER_X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Applied when the configured timeout is unset or below one second.
pub const DEFAULT_WHOIS_TIMEOUT: Duration = Duration::from_secs(10);

const LEGACY_TAILNET_SUFFIX: &str = ".beta.tailscale.net";

#[derive(Debug, Clone, Default)]
pub struct TailscaleWhoisOptions {
    /// When set, callers must belong to this tailnet.
    pub allowed_tailnet: Option<String>,
    pub request_timeout: Option<Duration>,
    /// Peer capabilities copied into the profile, in `<host>/<path>` form.
    pub capability_names: Vec<String>,
    /// tailscaled LocalAPI socket; defaults to the standard Linux location.
    pub socket_path: Option<PathBuf>,
    pub metadata: MetadataOptions,
}

pub struct TailscaleWhois {
    metadata: ProviderMetadata,
    request_timeout: Duration,
    allowed_tailnet: Option<String>,
    capability_names: Vec<String>,
    client: Arc<dyn WhoIsClient>,
}

impl fmt::Debug for TailscaleWhois {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TailscaleWhois")
            .field("metadata", &self.metadata)
            .field("request_timeout", &self.request_timeout)
            .field("allowed_tailnet", &self.allowed_tailnet)
            .field("capability_names", &self.capability_names)
            .finish_non_exhaustive()
    }
}

impl TailscaleWhois {
    pub fn new(opts: TailscaleWhoisOptions) -> Result<Self, AuthError> {
        let client = match &opts.socket_path {
            Some(path) => LocalApiClient::new(path.clone()),
            None => LocalApiClient::default(),
        };
        Self::with_client(opts, Arc::new(client))
    }

    /// Build the provider with a custom WhoIs backend.
    pub fn with_client(
        opts: TailscaleWhoisOptions,
        client: Arc<dyn WhoIsClient>,
    ) -> Result<Self, AuthError> {
        for name in &opts.capability_names {
            if !is_tailscale_capability_name(name) {
                return Err(AuthError::config(format!(
                    "invalid Tailscale capability name '{name}': expected '<host>/<path>'"
                )));
            }
        }

        let request_timeout = opts
            .request_timeout
            .filter(|t| *t >= Duration::from_secs(1))
            .unwrap_or(DEFAULT_WHOIS_TIMEOUT);

        Ok(Self {
            metadata: opts.metadata.resolve(ProviderMetadata::new(
                "tailscalewhois",
                "Tailscale Whois",
                "tailscale",
                "slate",
            )),
            request_timeout,
            allowed_tailnet: opts.allowed_tailnet.filter(|t| !t.is_empty()),
            capability_names: opts.capability_names,
            client,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn profile_from_whois(&self, ip: IpAddr, info: WhoIsResponse) -> Result<Profile, AuthError> {
        let tailnet = if info.node.hostinfo.sharee_node {
            // The sharee's tailnet is not exposed.
            String::new()
        } else {
            extract_tailnet(&info.node.name, &info.node.computed_name)?
        };

        if let Some(allowed) = &self.allowed_tailnet {
            if &tailnet != allowed {
                return Err(AuthError::PolicyRejected(format!(
                    "user is part of tailnet '{tailnet}', wanted '{allowed}'"
                )));
            }
        }

        let hostname = info.node.name.trim_end_matches('.').to_string();
        let tagged = info.node.is_tagged();

        let (id, full_name, email) = if tagged {
            (hostname.clone(), hostname.clone(), None)
        } else {
            let login = info.user_profile.login_name;
            let id = login.split('@').next().unwrap_or_default().to_string();
            (id, info.user_profile.display_name, Some(ProfileEmail::new(login)))
        };
        if id.is_empty() {
            return Err(AuthError::protocol(
                "tailscaled whois",
                format!("no usable identity for {ip}"),
            ));
        }

        let mut additional_claims = ClaimsMap::new();
        additional_claims.insert(CLAIM_HOSTNAME.to_string(), Value::String(hostname));
        additional_claims.insert(CLAIM_TAILNET.to_string(), Value::String(tailnet));
        additional_claims.insert(CLAIM_IP.to_string(), Value::String(ip.to_string()));
        additional_claims.insert(CLAIM_TAGGED_DEVICE.to_string(), Value::Bool(tagged));

        for name in &self.capability_names {
            if let Some(values) = info.cap_map.get(name).filter(|v| !v.is_empty()) {
                additional_claims.insert(capability_claim(name), Value::Array(values.clone()));
            }
        }

        Ok(Profile {
            provider: self.metadata.name.clone(),
            id,
            email,
            name: ProfileName::full(full_name),
            picture: Some(info.user_profile.profile_pic_url).filter(|p| !p.is_empty()),
            additional_claims,
        })
    }
}

fn capability_claim(name: &str) -> String {
    format!("https://{name}")
}

/// The tailnet is what follows `<computed_name>.` in the node's MagicDNS
/// name, minus the trailing dot and the legacy beta suffix.
///
/// The trailing dot is trimmed first, so a legacy name such as
/// `host.corp.beta.tailscale.net.` yields `corp` rather than
/// `corp.beta.tailscale.net`. `allowed_tailnet` is compared against this
/// bare form.
fn extract_tailnet(node_name: &str, computed_name: &str) -> Result<String, AuthError> {
    let (_, tailnet) = node_name
        .split_once(&format!("{computed_name}."))
        .ok_or_else(|| {
            AuthError::protocol(
                "tailscaled whois",
                format!("failed to extract tailnet name from hostname '{node_name}'"),
            )
        })?;
    let tailnet = tailnet.trim_end_matches('.');
    let tailnet = tailnet.strip_suffix(LEGACY_TAILNET_SUFFIX).unwrap_or(tailnet);
    Ok(tailnet.to_string())
}

/// Source IP from `X-Forwarded-For`; the whole value must be one address.
fn forwarded_ip(headers: &HeaderMap) -> Result<IpAddr, AuthError> {
    let raw = headers
        .get(HEADER_X_FORWARDED_FOR)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default();
    raw.trim()
        .parse::<IpAddr>()
        .map(|ip| ip.to_canonical())
        .map_err(|_| {
            AuthError::InvalidRequest(format!(
                "value of X-Forwarded-For header '{raw}' is not valid: not an IP"
            ))
        })
}

impl AuthProvider for TailscaleWhois {
    fn provider_type(&self) -> &'static str {
        "tailscalewhois"
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn populate_additional_claims(&self, claims: &ClaimsMap, set: &mut dyn FnMut(&str, Value)) {
        for key in [CLAIM_HOSTNAME, CLAIM_IP, CLAIM_TAILNET] {
            if let Some(v) = claims.get(key).and_then(Value::as_str).filter(|s| !s.is_empty()) {
                set(key, Value::String(v.to_string()));
            }
        }

        if claims.get(CLAIM_TAGGED_DEVICE).and_then(Value::as_bool) == Some(true) {
            set(CLAIM_TAGGED_DEVICE, Value::Bool(true));
        }

        for name in &self.capability_names {
            let key = capability_claim(name);
            if let Some(v) = claims.get(&key) {
                set(&key, v.clone());
            }
        }
    }
}

#[async_trait]
impl SeamlessProvider for TailscaleWhois {
    #[tracing::instrument(skip_all, err(Display))]
    async fn seamless_auth(&self, headers: &HeaderMap) -> Result<Profile, AuthError> {
        let ip = forwarded_ip(headers)?;

        let info = tokio::time::timeout(self.request_timeout, self.client.who_is(ip))
            .await
            .map_err(|_| AuthError::Timeout {
                endpoint: "tailscaled whois".to_string(),
            })??;

        let profile = self.profile_from_whois(ip, info)?;
        tracing::debug!(
            id = %profile.id,
            name = profile.display_name(),
            %ip,
            "Authenticated Tailscale caller"
        );
        Ok(profile)
    }

    fn validate_request_claims(
        &self,
        headers: &HeaderMap,
        profile: &Profile,
    ) -> Result<(), AuthError> {
        let ip = forwarded_ip(headers)?.to_string();
        let expect = profile.claim_str(CLAIM_IP).unwrap_or_default();
        if expect != ip {
            tracing::warn!(%expect, %ip, "Session used from a different Tailscale IP");
            return Err(AuthError::PolicyRejected(format!(
                "token was issued for Tailscale IP '{expect}', but this request is from '{ip}'"
            )));
        }
        Ok(())
    }
}
