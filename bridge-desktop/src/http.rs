//! Shared reqwest plumbing for the remote adapters
//!
//! The adapters do not retry on their own; they only translate transport and
//! status failures into [`BridgeError`] so the sync consumer can apply its
//! retry policy.

use bridge_traits::error::{BridgeError, Result};
use reqwest::{Client, Response, Url};
use std::time::Duration;
use tracing::warn;

pub(crate) const USER_AGENT: &str = concat!("folder-sync-agent/", env!("CARGO_PKG_VERSION"));

/// Build a reqwest client with the agent's timeouts
pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(4)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))
}

/// Parse `http://host:port/` into a base URL
pub(crate) fn base_url(host: &str, port: u16) -> Result<Url> {
    let raw = if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}/", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}/", host, port)
    };

    Url::parse(&raw).map_err(|e| BridgeError::OperationFailed(format!("Invalid URL {}: {}", raw, e)))
}

/// Append a fixed prefix plus a forward-slash relative path as encoded segments
pub(crate) fn join_segments(base: &Url, prefix: &[&str], relative: &str) -> Result<Url> {
    let mut url = base.clone();
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| BridgeError::OperationFailed(format!("URL cannot be a base: {}", base)))?;
        segments.pop_if_empty();
        segments.extend(prefix.iter().copied());
        segments.extend(relative.split('/').filter(|s| !s.is_empty()));
    }
    Ok(url)
}

/// Translate a reqwest transport error
pub(crate) fn map_send_error(e: reqwest::Error, context: &str) -> BridgeError {
    warn!(error = %e, context, "HTTP request failed");

    if e.is_timeout() {
        BridgeError::Transient(format!("Request timed out: {}", context))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        BridgeError::Transient(format!("Connection failed: {}: {}", context, e))
    } else {
        BridgeError::OperationFailed(format!("{}: {}", context, e))
    }
}

/// Fail on any non-success status, classifying it
pub(crate) fn check_status(response: Response, context: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(BridgeError::from_status(status.as_u16(), context))
    }
}
