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

//! Provider configuration loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::AuthError;
use crate::oauth::{OAuth2Endpoints, PkceKey};
use crate::providers::openidconnect::DEFAULT_DISCOVERY_TIMEOUT;
use crate::providers::{
    GitHub, GitHubOptions, Google, GoogleOptions, MetadataOptions, MicrosoftEntraId,
    MicrosoftEntraIdOptions, OpenIdConnect, OpenIdConnectOptions, PocketId, PocketIdOptions,
    ProviderRegistry, TailscaleWhois, TailscaleWhoisOptions, DEFAULT_HTTP_TIMEOUT,
};
use crate::validators::normalize_capability_name;

/// Every provider that can be enabled, with its options resolved.
///
/// A provider is enabled when its key variable is set and non-empty.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub github: Option<GitHubOptions>,
    pub google: Option<GoogleOptions>,
    pub microsoft_entra_id: Option<MicrosoftEntraIdOptions>,
    pub openidconnect: Option<OpenIdConnectOptions>,
    pub pocketid: Option<PocketIdOptions>,
    pub tailscale_whois: Option<TailscaleWhoisOptions>,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// # Shared
    /// - `PKCE_KEY` (at least 16 bytes; enables PKCE for every OAuth2 provider)
    /// - `HTTP_TIMEOUT_SECS` (default: `"30"`)
    /// - `DISCOVERY_TIMEOUT_SECS` (default: `"10"`)
    ///
    /// # Providers
    /// - `GITHUB_CLIENT_ID`, `GITHUB_CLIENT_SECRET`
    /// - `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET`
    /// - `MICROSOFTENTRAID_TENANT_ID`, `MICROSOFTENTRAID_CLIENT_ID`,
    ///   `MICROSOFTENTRAID_CLIENT_SECRET`
    /// - `OIDC_ISSUER` or `OIDC_AUTH_URL` + `OIDC_TOKEN_URL`, with
    ///   `OIDC_CLIENT_ID`, `OIDC_CLIENT_SECRET` and optionally
    ///   `OIDC_USERINFO_URL`, `OIDC_JWKS_URL`, `OIDC_TOKEN_ISSUER`,
    ///   `OIDC_DISPLAY_NAME`, `OIDC_ICON`, `OIDC_COLOR`
    /// - `POCKETID_ENDPOINT`, `POCKETID_CLIENT_ID`, `POCKETID_CLIENT_SECRET`
    /// - `TAILSCALEWHOIS_ENABLED=true`, optionally
    ///   `TAILSCALEWHOIS_ALLOWED_TAILNET`, `TAILSCALEWHOIS_REQUEST_TIMEOUT_SECS`,
    ///   `TAILSCALEWHOIS_CAPABILITY_NAMES` (comma-separated),
    ///   `TAILSCALEWHOIS_SOCKET`
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str, needed_by: &str| {
            var(key).ok_or_else(|| {
                AuthError::config(format!("{key} is required when {needed_by} is set"))
            })
        };
        let secs = |key: &str, default: Duration| -> Result<Duration, AuthError> {
            match var(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| AuthError::config(format!("{key} must be a whole number of seconds"))),
                None => Ok(default),
            }
        };

        let pkce_key = var("PKCE_KEY").map(PkceKey::new).transpose()?;
        let http_timeout = secs("HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT)?;
        let discovery_timeout = secs("DISCOVERY_TIMEOUT_SECS", DEFAULT_DISCOVERY_TIMEOUT)?;

        let github = var("GITHUB_CLIENT_ID")
            .map(|client_id| {
                Ok::<_, AuthError>(GitHubOptions {
                    client_id,
                    client_secret: required("GITHUB_CLIENT_SECRET", "GITHUB_CLIENT_ID")?,
                    pkce_key: pkce_key.clone(),
                    request_timeout: Some(http_timeout),
                    metadata: MetadataOptions::default(),
                })
            })
            .transpose()?;

        let google = var("GOOGLE_CLIENT_ID")
            .map(|client_id| {
                Ok::<_, AuthError>(GoogleOptions {
                    client_id,
                    client_secret: required("GOOGLE_CLIENT_SECRET", "GOOGLE_CLIENT_ID")?,
                    pkce_key: pkce_key.clone(),
                    request_timeout: Some(http_timeout),
                    metadata: MetadataOptions::default(),
                })
            })
            .transpose()?;

        let microsoft_entra_id = var("MICROSOFTENTRAID_TENANT_ID")
            .map(|tenant_id| {
                Ok::<_, AuthError>(MicrosoftEntraIdOptions {
                    tenant_id,
                    client_id: required("MICROSOFTENTRAID_CLIENT_ID", "MICROSOFTENTRAID_TENANT_ID")?,
                    client_secret: required(
                        "MICROSOFTENTRAID_CLIENT_SECRET",
                        "MICROSOFTENTRAID_TENANT_ID",
                    )?,
                    pkce_key: pkce_key.clone(),
                    request_timeout: Some(http_timeout),
                    metadata: MetadataOptions::default(),
                })
            })
            .transpose()?;

        let oidc_issuer = var("OIDC_ISSUER");
        let oidc_auth_url = var("OIDC_AUTH_URL");
        let openidconnect = if oidc_issuer.is_some() || oidc_auth_url.is_some() {
            let endpoints = oidc_auth_url
                .map(|authorization| {
                    Ok::<_, AuthError>(OAuth2Endpoints {
                        authorization,
                        token: required("OIDC_TOKEN_URL", "OIDC_AUTH_URL")?,
                        userinfo: var("OIDC_USERINFO_URL"),
                    })
                })
                .transpose()?;
            Some(OpenIdConnectOptions {
                client_id: required("OIDC_CLIENT_ID", "OIDC_ISSUER or OIDC_AUTH_URL")?,
                client_secret: required("OIDC_CLIENT_SECRET", "OIDC_ISSUER or OIDC_AUTH_URL")?,
                issuer: oidc_issuer,
                endpoints,
                jwks_url: var("OIDC_JWKS_URL"),
                token_issuer: var("OIDC_TOKEN_ISSUER"),
                pkce_key: pkce_key.clone(),
                request_timeout: Some(http_timeout),
                discovery_timeout: Some(discovery_timeout),
                metadata: MetadataOptions {
                    name: None,
                    display_name: var("OIDC_DISPLAY_NAME"),
                    icon: var("OIDC_ICON"),
                    color: var("OIDC_COLOR"),
                },
            })
        } else {
            None
        };

        let pocketid = var("POCKETID_ENDPOINT")
            .map(|endpoint| {
                Ok::<_, AuthError>(PocketIdOptions {
                    endpoint,
                    client_id: required("POCKETID_CLIENT_ID", "POCKETID_ENDPOINT")?,
                    client_secret: required("POCKETID_CLIENT_SECRET", "POCKETID_ENDPOINT")?,
                    pkce_key: pkce_key.clone(),
                    request_timeout: Some(http_timeout),
                    metadata: MetadataOptions::default(),
                })
            })
            .transpose()?;

        let tailscale_enabled = match var("TAILSCALEWHOIS_ENABLED").as_deref() {
            None => false,
            Some(v) => v.parse::<bool>().map_err(|_| {
                AuthError::config("TAILSCALEWHOIS_ENABLED must be 'true' or 'false'")
            })?,
        };
        let tailscale_whois = if tailscale_enabled {
            let capability_names = var("TAILSCALEWHOIS_CAPABILITY_NAMES")
                .map(|names| {
                    names
                        .split(',')
                        .map(str::trim)
                        .filter(|n| !n.is_empty())
                        .map(normalize_capability_name)
                        .collect::<Result<Vec<_>, _>>()
                })
                .transpose()?
                .unwrap_or_default();
            // Unset keeps the provider default.
            let request_timeout = match var("TAILSCALEWHOIS_REQUEST_TIMEOUT_SECS") {
                Some(_) => Some(secs("TAILSCALEWHOIS_REQUEST_TIMEOUT_SECS", Duration::ZERO)?),
                None => None,
            };
            Some(TailscaleWhoisOptions {
                allowed_tailnet: var("TAILSCALEWHOIS_ALLOWED_TAILNET"),
                request_timeout,
                capability_names,
                socket_path: var("TAILSCALEWHOIS_SOCKET").map(PathBuf::from),
                metadata: MetadataOptions::default(),
            })
        } else {
            None
        };

        Ok(Self {
            github,
            google,
            microsoft_entra_id,
            openidconnect,
            pocketid,
            tailscale_whois,
        })
    }

    /// Construct every enabled provider. OpenID Connect discovery runs here,
    /// so any failure aborts startup.
    pub async fn build_registry(&self) -> Result<ProviderRegistry, AuthError> {
        let mut registry = ProviderRegistry::new();
        if let Some(opts) = &self.github {
            registry.register(GitHub::new(opts.clone())?)?;
        }
        if let Some(opts) = &self.google {
            registry.register(Google::new(opts.clone())?)?;
        }
        if let Some(opts) = &self.microsoft_entra_id {
            registry.register(MicrosoftEntraId::new(opts.clone())?)?;
        }
        if let Some(opts) = &self.openidconnect {
            registry.register(OpenIdConnect::new(opts.clone()).await?)?;
        }
        if let Some(opts) = &self.pocketid {
            registry.register(PocketId::new(opts.clone())?)?;
        }
        if let Some(opts) = &self.tailscale_whois {
            registry.register(TailscaleWhois::new(opts.clone())?)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, AuthError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_enables_nothing() {
        let config = load(&[]).unwrap();
        assert!(config.github.is_none());
        assert!(config.google.is_none());
        assert!(config.microsoft_entra_id.is_none());
        assert!(config.openidconnect.is_none());
        assert!(config.pocketid.is_none());
        assert!(config.tailscale_whois.is_none());
    }

    #[test]
    fn provider_secrets_are_required() {
        let err = load(&[("GITHUB_CLIENT_ID", "cid")]).unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("GITHUB_CLIENT_SECRET")));

        let err = load(&[
            ("MICROSOFTENTRAID_TENANT_ID", "t"),
            ("MICROSOFTENTRAID_CLIENT_SECRET", "s"),
        ])
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("MICROSOFTENTRAID_CLIENT_ID")));

        let err = load(&[
            ("OIDC_AUTH_URL", "https://idp.example.com/auth"),
            ("OIDC_CLIENT_ID", "cid"),
            ("OIDC_CLIENT_SECRET", "s"),
        ])
        .unwrap_err();
        assert!(matches!(err, AuthError::Config(msg) if msg.contains("OIDC_TOKEN_URL")));
    }

    #[test]
    fn shared_settings_flow_into_providers() {
        let config = load(&[
            ("PKCE_KEY", "0123456789abcdef0123"),
            ("HTTP_TIMEOUT_SECS", "5"),
            ("GOOGLE_CLIENT_ID", "cid"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        let google = config.google.unwrap();
        assert!(google.pkce_key.is_some());
        assert_eq!(google.request_timeout, Some(Duration::from_secs(5)));

        assert!(matches!(load(&[("PKCE_KEY", "short")]), Err(AuthError::Config(_))));
        assert!(matches!(
            load(&[("HTTP_TIMEOUT_SECS", "soon")]),
            Err(AuthError::Config(_))
        ));
    }

    #[test]
    fn openidconnect_with_explicit_endpoints() {
        let config = load(&[
            ("OIDC_AUTH_URL", "https://idp.example.com/auth"),
            ("OIDC_TOKEN_URL", "https://idp.example.com/token"),
            ("OIDC_USERINFO_URL", "https://idp.example.com/userinfo"),
            ("OIDC_CLIENT_ID", "cid"),
            ("OIDC_CLIENT_SECRET", "secret"),
            ("OIDC_DISPLAY_NAME", "Corp SSO"),
        ])
        .unwrap();
        let oidc = config.openidconnect.unwrap();
        assert!(oidc.issuer.is_none());
        let endpoints = oidc.endpoints.unwrap();
        assert_eq!(endpoints.token, "https://idp.example.com/token");
        assert_eq!(
            endpoints.userinfo.as_deref(),
            Some("https://idp.example.com/userinfo")
        );
        assert_eq!(oidc.metadata.display_name.as_deref(), Some("Corp SSO"));
        assert_eq!(oidc.discovery_timeout, Some(DEFAULT_DISCOVERY_TIMEOUT));
    }

    #[test]
    fn tailscale_settings() {
        let config = load(&[
            ("TAILSCALEWHOIS_ENABLED", "true"),
            ("TAILSCALEWHOIS_ALLOWED_TAILNET", "example.ts.net"),
            ("TAILSCALEWHOIS_REQUEST_TIMEOUT_SECS", "3"),
            (
                "TAILSCALEWHOIS_CAPABILITY_NAMES",
                "https://example.com/cap/admin, example.com/cap/read,",
            ),
            ("TAILSCALEWHOIS_SOCKET", "/tmp/tailscaled.sock"),
        ])
        .unwrap();
        let ts = config.tailscale_whois.unwrap();
        assert_eq!(ts.allowed_tailnet.as_deref(), Some("example.ts.net"));
        assert_eq!(ts.request_timeout, Some(Duration::from_secs(3)));
        assert_eq!(
            ts.capability_names,
            vec!["example.com/cap/admin", "example.com/cap/read"]
        );
        assert_eq!(ts.socket_path, Some(PathBuf::from("/tmp/tailscaled.sock")));

        assert!(load(&[("TAILSCALEWHOIS_ENABLED", "false")])
            .unwrap()
            .tailscale_whois
            .is_none());
        assert!(matches!(
            load(&[
                ("TAILSCALEWHOIS_ENABLED", "true"),
                ("TAILSCALEWHOIS_CAPABILITY_NAMES", "http://example.com/cap"),
            ]),
            Err(AuthError::Config(_))
        ));
    }

    #[tokio::test]
    async fn build_registry_constructs_enabled_providers() {
        let config = load(&[
            ("GITHUB_CLIENT_ID", "cid"),
            ("GITHUB_CLIENT_SECRET", "secret"),
            ("POCKETID_ENDPOINT", "https://pocket.example.com"),
            ("POCKETID_CLIENT_ID", "cid"),
            ("POCKETID_CLIENT_SECRET", "secret"),
            ("TAILSCALEWHOIS_ENABLED", "true"),
        ])
        .unwrap();
        let registry = config.build_registry().await.unwrap();
        assert_eq!(registry.names(), vec!["github", "pocketid", "tailscalewhois"]);
    }
}
