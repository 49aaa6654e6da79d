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

//! Tailscale WhoIs lookups against the local `tailscaled` daemon.
//!
//! The daemon exposes its LocalAPI as plain HTTP/1.1 over a unix socket;
//! `GET /localapi/v0/whois?addr=<ip>` returns the node and user behind a
//! tailnet address.

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use http_body_util::{BodyExt, Empty};
use hyper::body::Bytes;
use hyper::{header, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::net::UnixStream;

use crate::error::AuthError;

/// Default location of the tailscaled LocalAPI socket on Linux.
pub const DEFAULT_TAILSCALED_SOCKET: &str = "/var/run/tailscale/tailscaled.sock";

/// Host header tailscaled expects on LocalAPI requests.
const LOCAL_API_HOST: &str = "local-tailscaled.sock";

/// Result of a WhoIs lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WhoIsResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub node: WhoIsNode,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_profile: WhoIsUserProfile,
    /// Peer capabilities granted to the caller, keyed by capability name.
    #[serde(default, deserialize_with = "null_as_default")]
    pub cap_map: HashMap<String, Vec<Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WhoIsNode {
    /// Fully-qualified MagicDNS name, e.g. `laptop.example.ts.net.`.
    #[serde(default)]
    pub name: String,
    /// Short host name, e.g. `laptop`.
    #[serde(default)]
    pub computed_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub hostinfo: WhoIsHostinfo,
}

impl WhoIsNode {
    pub fn is_tagged(&self) -> bool {
        !self.tags.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WhoIsHostinfo {
    /// Set when the node was shared into this tailnet from another one.
    #[serde(default)]
    pub sharee_node: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct WhoIsUserProfile {
    #[serde(default)]
    pub login_name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "ProfilePicURL")]
    pub profile_pic_url: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Resolves a tailnet address to the node and user behind it.
#[async_trait]
pub trait WhoIsClient: Send + Sync {
    async fn who_is(&self, addr: IpAddr) -> Result<WhoIsResponse, AuthError>;
}

/// [`WhoIsClient`] talking to tailscaled's LocalAPI over its unix socket.
#[derive(Debug, Clone)]
pub struct LocalApiClient {
    socket_path: PathBuf,
}

impl Default for LocalApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_TAILSCALED_SOCKET)
    }
}

impl LocalApiClient {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    async fn get(&self, path_and_query: &str) -> Result<(StatusCode, Bytes), AuthError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            AuthError::Lookup(format!(
                "failed to connect to tailscaled at {}: {e}",
                self.socket_path.display()
            ))
        })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| AuthError::Lookup(format!("LocalAPI handshake failed: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!("LocalAPI connection closed with error: {e}");
            }
        });

        let req = Request::builder()
            .method(Method::GET)
            .uri(path_and_query)
            .header(header::HOST, LOCAL_API_HOST)
            .body(Empty::<Bytes>::new())
            .map_err(|e| AuthError::Lookup(format!("failed to build LocalAPI request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| AuthError::Lookup(format!("LocalAPI request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| AuthError::Lookup(format!("failed to read LocalAPI response: {e}")))?
            .to_bytes();
        Ok((status, body))
    }
}

#[async_trait]
impl WhoIsClient for LocalApiClient {
    #[tracing::instrument(skip(self), err(Display))]
    async fn who_is(&self, addr: IpAddr) -> Result<WhoIsResponse, AuthError> {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("addr", &addr.to_string())
            .finish();
        let (status, body) = self.get(&format!("/localapi/v0/whois?{query}")).await?;

        if status != StatusCode::OK {
            let body = String::from_utf8_lossy(&body);
            return Err(AuthError::Lookup(format!(
                "tailscaled returned HTTP {} for {addr}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        serde_json::from_slice(&body).map_err(|e| {
            AuthError::protocol("tailscaled whois", format!("failed to parse WhoIs response: {e}"))
        })
    }
}
