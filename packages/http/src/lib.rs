#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! HTTP client abstraction shared by the species map fetchers.
//!
//! The boundary resolver and the occurrence fetcher never talk to
//! [`reqwest`] directly. They go through the [`HttpClient`] trait so the
//! network can be swapped for the scripted fakes in [`testing`], and they
//! wait through the [`Sleeper`] trait so retry and etiquette delays can be
//! observed without actually sleeping.

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

/// Maximum length of the response body preview kept in status errors.
const BODY_PREVIEW_LEN: usize = 500;

/// Errors from HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The request never produced a response (connection refused, reset,
    /// timeout, truncated body).
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the transport failure.
        message: String,
    },

    /// The request could not be built or sent for a reason that will not
    /// go away on its own.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status}: {body_preview}")]
    Status {
        /// Numeric HTTP status code.
        status: u16,
        /// Leading part of the response body, for diagnostics.
        body_preview: String,
    },

    /// The response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// Returns `true` if the failure is worth retrying: connection-level
    /// failures, HTTP 429 and HTTP 5xx.
    ///
    /// Other 4xx statuses (malformed request, authorization failure) and
    /// undecodable bodies are permanent.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Status { status, .. } => *status == 429 || (*status >= 500 && *status < 600),
            Self::Request(_) | Self::Json(_) => false,
        }
    }

    /// Returns the HTTP status code, if the error came from a response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A GET request: base URL plus ordered query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Base URL without query string.
    pub url: String,
    /// Query parameters, sent in insertion order.
    pub query: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a request for `url` with no query parameters.
    #[must_use]
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            query: Vec::new(),
        }
    }

    /// Appends a query parameter.
    #[must_use]
    pub fn with_query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_owned(), value.to_string()));
        self
    }

    /// Returns the first value of the named query parameter.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Numeric HTTP status code.
    pub status: u16,
    /// Response headers keyed by lowercase name.
    headers: BTreeMap<String, String>,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header. Names are case-insensitive.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers
            .insert(name.to_ascii_lowercase(), value.to_owned());
        self
    }

    /// Looks up a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Returns `true` for HTTP 429 Too Many Requests.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    /// Converts a non-2xx response into [`HttpError::Status`].
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Status`] if the status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.is_success() {
            return Ok(self);
        }
        Err(HttpError::Status {
            status: self.status,
            body_preview: truncate_for_log(&self.body, BODY_PREVIEW_LEN),
        })
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::Json`] if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Truncates a string for log output, appending `...` if trimmed.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

/// Sends HTTP GET requests.
///
/// Implementations return every response they receive, including error
/// statuses; interpreting the status is the caller's job.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and reads the full response.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if no response could be obtained.
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// [`HttpClient`] backed by a [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client that identifies itself with `user_agent` and gives
    /// up on any single request after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError`] if the underlying client cannot be built.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, HttpError> {
        log::debug!("GET {} {:?}", request.url, request.query);

        let response = self
            .client
            .get(&request.url)
            .query(&request.query)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_owned()))
            })
            .collect();
        let body = response.text().await.map_err(classify)?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Splits [`reqwest::Error`]s into transient connection failures and
/// permanent request errors.
fn classify(e: reqwest::Error) -> HttpError {
    if e.is_timeout() || e.is_connect() || e.is_body() || e.is_request() {
        HttpError::Connection {
            message: e.to_string(),
        }
    } else {
        HttpError::Request(e)
    }
}

/// Waits for a duration.
///
/// Every deliberate delay in the fetchers goes through this trait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Suspends the caller for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by [`tokio::time::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn classifies_transient_statuses() {
        let status = |status| HttpError::Status {
            status,
            body_preview: String::new(),
        };
        assert!(status(429).is_transient());
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        assert!(!status(404).is_transient());
        assert!(
            HttpError::Connection {
                message: "reset".to_string()
            }
            .is_transient()
        );
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(429, "").with_header("Retry-After", "2");
        assert_eq!(response.header("retry-after"), Some("2"));
        assert_eq!(response.header("RETRY-AFTER"), Some("2"));
        assert!(response.is_rate_limited());
    }

    #[test]
    fn error_for_status_truncates_body() {
        let body = "x".repeat(BODY_PREVIEW_LEN + 10);
        let err = HttpResponse::new(502, body).error_for_status().unwrap_err();
        match err {
            HttpError::Status {
                status,
                body_preview,
            } => {
                assert_eq!(status, 502);
                assert_eq!(body_preview.len(), BODY_PREVIEW_LEN + 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reqwest_client_sends_query_and_reads_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("format", "jsonv2"))
            .and(query_param("city", "Marbletown"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("X-Result-Count", "1")
                    .set_body_json(serde_json::json!([{"type": "administrative"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = ReqwestClient::new("species-map-test/0.1", Duration::from_secs(5)).unwrap();
        let request = HttpRequest::new(&format!("{}/search", server.uri()))
            .with_query("format", "jsonv2")
            .with_query("city", "Marbletown");

        let response = client.get(&request).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.header("x-result-count"), Some("1"));
        let body: serde_json::Value = response.json().unwrap();
        assert_eq!(body[0]["type"], "administrative");
    }

    #[tokio::test]
    async fn reqwest_client_returns_error_statuses_as_responses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
            .mount(&server)
            .await;

        let client = ReqwestClient::new("species-map-test/0.1", Duration::from_secs(5)).unwrap();
        let response = client.get(&HttpRequest::new(&server.uri())).await.unwrap();
        assert!(response.is_rate_limited());
        assert_eq!(response.header("Retry-After"), Some("2"));
    }

    #[tokio::test]
    async fn refused_connection_is_transient() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let client = ReqwestClient::new("species-map-test/0.1", Duration::from_secs(5)).unwrap();
        let err = client
            .get(&HttpRequest::new(&format!("http://127.0.0.1:{port}/")))
            .await
            .unwrap_err();
        assert!(err.is_transient(), "expected transient error, got {err}");
    }
}
