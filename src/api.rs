// Clash-compatible controller API: endpoints, snapshot fetch and close-all

use crate::snapshot::{Snapshot, decode_snapshot};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:9090";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Where the external controller lives and how to authenticate against it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            secret: None,
        }
    }
}

impl ApiConfig {
    fn base(&self) -> Result<Url> {
        let mut base = self.base_url.trim().to_string();
        // Url::join replaces the last path segment unless it ends in '/'
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base).context(format!("Invalid controller URL: {}", self.base_url))
    }

    /// `http(s)://<base>/connections`
    pub fn connections_url(&self) -> Result<Url> {
        let url = self.base()?.join("connections")?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(anyhow::anyhow!(
                "Unsupported controller scheme '{}' (expected http or https)",
                other
            )),
        }
    }

    /// `ws(s)://<base>/connections?token=<secret>`
    pub fn connections_ws_url(&self) -> Result<Url> {
        let mut url = self.connections_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| anyhow::anyhow!("Cannot switch {} to {}", url, scheme))?;

        if let Some(secret) = self.secret() {
            url.query_pairs_mut().append_pair("token", secret);
        }
        Ok(url)
    }

    /// The secret, ignoring an empty string
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn bearer(&self) -> Option<String> {
        self.secret().map(|secret| format!("Bearer {}", secret))
    }
}

/// Shared HTTP client for the controller
pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client")
}

fn authorized(request: reqwest::RequestBuilder, api: &ApiConfig) -> reqwest::RequestBuilder {
    match api.bearer() {
        Some(bearer) => request.header(reqwest::header::AUTHORIZATION, bearer),
        None => request,
    }
}

/// `GET /connections` once and decode the payload
pub async fn fetch_snapshot(client: &reqwest::Client, api: &ApiConfig) -> Result<Snapshot> {
    let url = api.connections_url()?;

    let response = authorized(client.get(url.clone()), api)
        .send()
        .await
        .context(format!("Failed to reach {}", url))?
        .error_for_status()
        .context(format!("Controller rejected GET {}", url))?;

    let body = response
        .text()
        .await
        .context("Failed to read connections response")?;

    decode_snapshot(&body)
}

/// `DELETE /connections`: ask the proxy to drop every active connection.
///
/// Local state is not touched; the next snapshot reports the closures.
pub async fn close_all(client: &reqwest::Client, api: &ApiConfig) -> Result<()> {
    let url = api.connections_url()?;

    authorized(client.delete(url.clone()), api)
        .send()
        .await
        .context(format!("Failed to reach {}", url))?
        .error_for_status()
        .context("Controller rejected close-all request")?;

    log::info!("Requested close of all connections at {}", url);
    Ok(())
}
