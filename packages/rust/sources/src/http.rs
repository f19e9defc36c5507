//! Shared HTTP plumbing for source fetchers.

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::debug;

use autopress_shared::{AutopressError, Result};

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("autopress/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the HTTP client shared by all sources.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| AutopressError::Network(format!("failed to build HTTP client: {e}")))
}

/// GET `url` and decode the JSON body. Non-2xx statuses are errors.
pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T> {
    debug!(%url, "GET json");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AutopressError::Network(format!("{url}: HTTP {status}")));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| AutopressError::parse(format!("{url}: invalid JSON body: {e}")))
}

/// GET `url` and return the raw body.
pub(crate) async fn get_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    debug!(%url, "GET");

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AutopressError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AutopressError::Network(format!("{url}: HTTP {status}")));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AutopressError::Network(format!("{url}: body read failed: {e}")))?;
    Ok(bytes.to_vec())
}

/// SHA-256 of `content` as lowercase hex.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_hex() {
        let a = content_hash("hello");
        assert_eq!(a.len(), 64);
        assert_eq!(a, content_hash("hello"));
        assert_ne!(a, content_hash("hello!"));
    }

    #[test]
    fn user_agent_names_the_tool() {
        assert!(USER_AGENT.starts_with("autopress/"));
    }

    #[tokio::test]
    async fn non_success_status_is_network_error() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = build_client().unwrap();
        let err = get_bytes(&client, &format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, AutopressError::Network(ref m) if m.contains("404")));
    }
}
