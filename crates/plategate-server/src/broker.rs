//! Self-registration with the plugin broker.
//!
//! On startup the plugin announces its routes to the broker so the gateway
//! can proxy requests to it. Registration is best-effort: the broker may
//! come up after the plugin, so the attempt is retried a few times and a
//! final failure only logs a warning.

use serde::Serialize;
use std::time::Duration;

use crate::config::BrokerConfig;

const REGISTER_ATTEMPTS: u32 = 5;

/// Registration payload sent to the broker's route API.
#[derive(Debug, Serialize)]
struct PluginRegistration {
    slug: String,
    name: String,
    version: String,
    description: String,
    host: String,
    #[serde(rename = "base-api-route")]
    base_api_route: String,
    #[serde(rename = "api-routes")]
    api_routes: Vec<String>,
    enabled: bool,
}

fn registration(host: &str, base_api_route: &str) -> PluginRegistration {
    PluginRegistration {
        slug: "licenseplate-recognition".to_string(),
        name: "License Plate Recognition".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Tracks license plates and parking events from gate camera scans".to_string(),
        host: host.to_string(),
        base_api_route: base_api_route.to_string(),
        api_routes: vec![
            "/scan".to_string(),
            "/records".to_string(),
            "/records/{plate}".to_string(),
            "/records/{plate}/events".to_string(),
            "/webhook/scan".to_string(),
        ],
        enabled: true,
    }
}

/// Registers this plugin with the broker, retrying with linear backoff.
///
/// `host` is the externally reachable `host:port` of this plugin. Never
/// fails the caller: the plugin is fully functional without a broker, it
/// just won't be reachable through the gateway.
pub async fn register_with_broker(config: BrokerConfig, host: String, base_api_route: String) {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("failed to build broker HTTP client: {}", e);
            return;
        }
    };

    let url = format!("{}/api/v1/route", config.url.trim_end_matches('/'));
    let payload = registration(&host, &base_api_route);

    for attempt in 1..=REGISTER_ATTEMPTS {
        let mut request = client.post(&url).json(&payload);
        if let Some(token) = &config.auth_token {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(url = %url, "registered with broker");
                return;
            }
            Ok(response) => {
                tracing::warn!(
                    attempt,
                    status = %response.status(),
                    "broker rejected registration"
                );
            }
            Err(e) => {
                tracing::warn!(attempt, "broker registration request failed: {}", e);
            }
        }

        if attempt < REGISTER_ATTEMPTS {
            tokio::time::sleep(Duration::from_secs(u64::from(attempt) * 2)).await;
        }
    }

    tracing::warn!(
        url = %url,
        "giving up on broker registration, plugin will run without gateway integration"
    );
}
