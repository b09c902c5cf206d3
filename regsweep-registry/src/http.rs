//! Blocking HTTP client for registry calls.

use regsweep_core::error::{Result, SweepError};
use regsweep_core::Outcome;
use reqwest::blocking::{Client, RequestBuilder, Response};
use std::time::Duration;
use tracing::debug;

/// A registry response body with the headers callers inspect.
#[derive(Debug, Clone)]
pub struct RegistryResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub content_digest: Option<String>,
    pub link: Option<String>,
    pub www_authenticate: Option<String>,
}

impl RegistryResponse {
    fn from_response(response: Response) -> Result<Self> {
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = response.status().as_u16();
        let content_type = header("content-type");
        let content_digest = header("docker-content-digest");
        let link = header("link");
        let www_authenticate = header("www-authenticate");
        let body = response
            .bytes()
            .map_err(|e| SweepError::Transient(format!("Failed to read response body: {e}")))?
            .to_vec();
        Ok(Self {
            status,
            body,
            content_type,
            content_digest,
            link,
            www_authenticate,
        })
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// Thin wrapper over a reqwest blocking client bound to one registry.
///
/// Every call carries the configured timeout. Transport failures become
/// [`SweepError::Transient`]; they are never retried here.
#[derive(Clone)]
pub struct RegistryHttp {
    client: Client,
    base_url: String,
}

impl RegistryHttp {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("regsweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SweepError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a registry path such as `/v2/`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn delete(&self, url: &str) -> RequestBuilder {
        self.client.delete(url)
    }

    /// Send a request and return the raw response, whatever its status.
    pub fn send(&self, request: RequestBuilder, what: &str) -> Result<RegistryResponse> {
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                SweepError::Transient(format!("{what} timed out"))
            } else {
                SweepError::Transient(format!("{what} failed: {e}"))
            }
        })?;
        let response = RegistryResponse::from_response(response)?;
        debug!(status = response.status, "{}", what);
        Ok(response)
    }

    /// Send a request and classify the status: 2xx is `Ok`, 404 is `NotFound`.
    pub fn execute(&self, request: RequestBuilder, what: &str) -> Outcome<RegistryResponse> {
        match self.send(request, what) {
            Ok(response) if response.is_success() => Outcome::Ok(response),
            Ok(response) => Outcome::from_status(response.status, what),
            Err(e) => Outcome::Failed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_relative_and_keeps_absolute() {
        let http = RegistryHttp::new("https://r.example.com/", Duration::from_secs(1))
            .expect("client should build");
        assert_eq!(http.url("/v2/"), "https://r.example.com/v2/");
        assert_eq!(
            http.url("https://auth.example.com/token"),
            "https://auth.example.com/token"
        );
    }

    #[test]
    fn test_connection_failure_is_transient() {
        // Port 9 on loopback has no listener in the test environment.
        let http = RegistryHttp::new("http://127.0.0.1:9", Duration::from_secs(2))
            .expect("client should build");
        let outcome = http.execute(http.get(&http.url("/v2/")), "GET /v2/");
        assert!(matches!(outcome, Outcome::Failed(SweepError::Transient(_))));
    }
}
