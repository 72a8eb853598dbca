//! Blocking HTTP client shared by the agency fetchers.

use super::provider::FetchError;
use crate::config::HttpConfig;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Thin wrapper over `reqwest::blocking::Client` that maps failures onto
/// [`FetchError`] so the retry policy can tell transient from permanent.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::blocking::Client,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| FetchError::Permanent(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// GET `url` with query parameters and return the body bytes.
    pub fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        debug!(url, "GET");
        let resp = self
            .client
            .get(url)
            .query(query)
            .send()
            .map_err(classify_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(status, url));
        }

        resp.bytes()
            .map(|b| b.to_vec())
            .map_err(classify_transport)
    }
}

/// Map a non-success HTTP status to a fetch error.
pub fn classify_status(status: StatusCode, url: &str) -> FetchError {
    let msg = format!("HTTP {status} for {url}");
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        FetchError::Transient(msg)
    } else {
        FetchError::Permanent(msg)
    }
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::Transient(err.to_string())
    } else {
        FetchError::Permanent(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_and_throttling_are_transient() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::REQUEST_TIMEOUT,
        ] {
            assert!(classify_status(status, "u").is_transient(), "{status}");
        }
    }

    #[test]
    fn client_errors_are_permanent() {
        for status in [StatusCode::NOT_FOUND, StatusCode::FORBIDDEN, StatusCode::BAD_REQUEST] {
            assert!(!classify_status(status, "u").is_transient(), "{status}");
        }
    }

    #[test]
    fn client_builds_from_default_config() {
        assert!(HttpClient::new(&HttpConfig::default()).is_ok());
    }
}
