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

//! Forward-auth provider check.
//!
//! Loads provider configuration from the environment, constructs every
//! enabled provider (running OpenID Connect discovery) and logs the result.
//! Exits non-zero when any provider fails to initialize.

use anyhow::Context;
use forward_auth::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    let registry = config
        .build_registry()
        .await
        .context("failed to initialize identity providers")?;

    if registry.is_empty() {
        tracing::warn!("No identity providers are configured");
    }

    for provider in registry.list() {
        let capabilities = provider
            .capabilities()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        tracing::info!(
            name = provider.name(),
            provider_type = provider.provider_type(),
            display_name = %provider.metadata().display_name,
            %capabilities,
            "Identity provider ready"
        );
    }

    tracing::info!("{} identity provider(s) configured", registry.len());
    Ok(())
}
