//! Small helpers shared by the reqwest-based clients.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::{ProviderError, ProviderResult};

pub(crate) fn build_client(timeout: Duration, user_agent: &str) -> ProviderResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(user_agent)
        .build()
        .map_err(|e| ProviderError::internal(format!("failed to create HTTP client: {}", e)))
}

/// Maps a transport failure (no HTTP status) to a network error.
pub(crate) fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::network("request timeout").with_source(e)
    } else if e.is_connect() {
        ProviderError::network(format!("connection failed: {}", e)).with_source(e)
    } else {
        ProviderError::network(format!("request failed: {}", e)).with_source(e)
    }
}

/// Reads the body and parses it as JSON.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> ProviderResult<T> {
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;
    serde_json::from_str(&body)
        .map_err(|e| ProviderError::invalid_response(format!("failed to parse response: {}", e)))
}

pub(crate) fn user_agent() -> String {
    format!("daybook/{}", env!("CARGO_PKG_VERSION"))
}
