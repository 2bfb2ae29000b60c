//! HTTP client for the Burn ingestion API.
//!
//! Two stateless calls, each a single attempt:
//!
//! - `POST {base}/api/burn/ingest` submits a [`BurnSubmission`]
//! - `GET {base}/api/burn/verify-token` checks a token and returns the account
//!
//! Both authenticate with `Authorization: Bearer <token>` and hand the raw
//! response back. Interpreting the status is the caller's job. There are no
//! retries: the next hook run is the retry.
//!
//! # Example
//!
//! ```no_run
//! use burn_reporter::client::IngestClient;
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = IngestClient::new("https://tokenburn.dev").unwrap();
//!     let response = client.verify("burn_abc123").await.unwrap();
//!     println!("verify-token: {}", response.status());
//! }
//! ```

use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use thiserror::Error;
use tracing::debug;

use crate::types::BurnSubmission;

/// Ingest endpoint path.
const INGEST_PATH: &str = "/api/burn/ingest";

/// Token verification endpoint path.
const VERIFY_PATH: &str = "/api/burn/verify-token";

/// Longest response body excerpt included in failure messages.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Errors that can occur before a response is received.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Connection, TLS, or other transport failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The token contains characters that are not valid in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
}

/// Stateless client for the ingestion API.
#[derive(Debug, Clone)]
pub struct IngestClient {
    base_url: String,
    client: Client,
}

impl IngestClient {
    /// Creates a client for `base_url` (trailing slashes are ignored).
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` if the TLS backend cannot be initialized.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .user_agent(concat!("burn-reporter/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// The base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts `payload` to the ingest endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` only for transport failures or a token that
    /// cannot be sent as a header. Non-2xx statuses are returned as `Ok`.
    pub async fn submit(
        &self,
        token: &str,
        payload: &BurnSubmission,
    ) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, INGEST_PATH);

        debug!(
            url = %url,
            tokens = payload.tokens_total,
            source = %payload.source,
            "Submitting usage"
        );

        let response = self
            .client
            .post(&url)
            .header(AUTHORIZATION, bearer(token)?)
            .json(payload)
            .send()
            .await?;

        debug!(status = response.status().as_u16(), "Ingest responded");
        Ok(response)
    }

    /// Asks the API whether `token` is valid.
    ///
    /// # Errors
    ///
    /// Same as [`submit`](Self::submit).
    pub async fn verify(&self, token: &str) -> Result<Response, ClientError> {
        let url = format!("{}{}", self.base_url, VERIFY_PATH);
        debug!(url = %url, "Verifying token");

        let response = self
            .client
            .get(&url)
            .header(AUTHORIZATION, bearer(token)?)
            .send()
            .await?;

        debug!(status = response.status().as_u16(), "Verify responded");
        Ok(response)
    }
}

/// Builds the `Authorization` header for `token`.
fn bearer(token: &str) -> Result<HeaderValue, ClientError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.trim()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Summarizes a non-success response as `"<status>: <reason>"`.
///
/// Uses the JSON `error` or `message` field when the body has one, and a
/// truncated plain-text body otherwise.
pub async fn describe_failure(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let reason = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            ["error", "message"]
                .iter()
                .find_map(|k| v.get(*k).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect());

    if reason.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {reason}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TokenPrecision, VerificationTier};
    use chrono::NaiveDate;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_submission() -> BurnSubmission {
        BurnSubmission {
            tokens_total: 42,
            tokens_input: Some(40),
            tokens_output: Some(2),
            tokens_cache_creation: Some(0),
            tokens_cache_read: Some(0),
            source: "claude-code".to_string(),
            verification_tier: VerificationTier::ExtensionTracked,
            token_precision: TokenPrecision::Exact,
            project_hint: None,
            activity_date: NaiveDate::from_ymd_opt(2026, 1, 15).unwrap(),
            session_id: Some("sess-1".to_string()),
            metadata: None,
        }
    }

    #[test]
    fn new_trims_trailing_slashes() {
        let client = IngestClient::new("https://tokenburn.dev///").unwrap();
        assert_eq!(client.base_url(), "https://tokenburn.dev");
    }

    #[test]
    fn bearer_rejects_control_characters() {
        assert!(matches!(
            bearer("bad\ntoken"),
            Err(ClientError::InvalidHeader(_))
        ));
        assert!(bearer(" ok-token ").unwrap().is_sensitive());
    }

    #[tokio::test]
    async fn submit_posts_json_with_bearer_token() {
        let mock_server = MockServer::start().await;
        let submission = sample_submission();

        Mock::given(method("POST"))
            .and(path("/api/burn/ingest"))
            .and(header("authorization", "Bearer burn_test"))
            .and(body_json(&submission))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let response = client.submit("burn_test", &submission).await.unwrap();

        assert_eq!(response.status().as_u16(), 201);
    }

    #[tokio::test]
    async fn submit_returns_error_statuses_as_responses() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/burn/ingest"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let response = client
            .submit("burn_test", &sample_submission())
            .await
            .unwrap();

        assert!(response.status().is_server_error());
    }

    #[tokio::test]
    async fn verify_sends_get_with_bearer_token() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/burn/verify-token"))
            .and(header("authorization", "Bearer burn_test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "username": "ada"
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let response = client.verify("burn_test").await.unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        // Port 9 (discard) is not expected to have an HTTP listener.
        let client = IngestClient::new("http://127.0.0.1:9").unwrap();
        let result = client.verify("burn_test").await;

        assert!(matches!(result, Err(ClientError::Http(_))));
    }

    #[tokio::test]
    async fn describe_failure_prefers_json_error_field() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(serde_json::json!({ "error": "token revoked" })),
            )
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let response = client.verify("burn_test").await.unwrap();

        assert_eq!(
            describe_failure(response).await,
            "401 Unauthorized: token revoked"
        );
    }

    #[tokio::test]
    async fn describe_failure_falls_back_to_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let client = IngestClient::new(&mock_server.uri()).unwrap();
        let response = client.verify("burn_test").await.unwrap();

        assert_eq!(describe_failure(response).await, "503 Service Unavailable");
    }
}
