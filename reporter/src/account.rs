//! Login and status checks against `verify-token`.
//!
//! Both are interactive and fail loudly. A token is only written to the
//! credential store after the API has accepted it.

use thiserror::Error;
use tracing::info;

use crate::client::{describe_failure, ClientError, IngestClient};
use crate::config::{
    resolve_api_url, validate_api_url, ConfigError, CredentialStore, CredentialsUpdate,
};
use crate::types::VerifyTokenResponse;

/// Number of recent submissions shown by `status`.
pub const STATUS_RECENT_LIMIT: usize = 5;

/// Errors surfaced by `login` and `status`.
#[derive(Error, Debug)]
pub enum AccountError {
    #[error("no API token given")]
    EmptyToken,

    #[error("not logged in: run `burn-reporter login` first")]
    NotAuthenticated,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("could not reach the Burn API: {0}")]
    Transport(#[from] ClientError),

    #[error("token rejected: {0}")]
    Rejected(String),

    /// 2xx response whose body was not the expected JSON.
    #[error("unexpected response from the Burn API: {0}")]
    InvalidResponse(#[source] reqwest::Error),
}

/// Verifies `token` against `base_url` and decodes the account.
async fn verify(base_url: &str, token: &str) -> Result<VerifyTokenResponse, AccountError> {
    let client = IngestClient::new(base_url)?;
    let response = client.verify(token).await?;

    if !response.status().is_success() {
        return Err(AccountError::Rejected(describe_failure(response).await));
    }

    response
        .json::<VerifyTokenResponse>()
        .await
        .map_err(AccountError::InvalidResponse)
}

/// Verifies `token` and, if accepted, stores it.
///
/// `api_url` is an explicit endpoint for this login; when given it is saved
/// alongside the token. Otherwise the endpoint resolves as in
/// [`resolve_api_url`].
///
/// # Errors
///
/// Returns `AccountError` if the token is blank, the URL is invalid, the
/// API cannot be reached or rejects the token, or the store cannot be written.
pub async fn login(
    token: &str,
    api_url: Option<&str>,
    store: &dyn CredentialStore,
    api_url_override: Option<&str>,
) -> Result<VerifyTokenResponse, AccountError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(AccountError::EmptyToken);
    }

    let explicit_url = api_url
        .map(|u| validate_api_url("--api-url", u))
        .transpose()?;
    let base_url = match &explicit_url {
        Some(url) => url.clone(),
        None => resolve_api_url(api_url_override, &store.load()),
    };

    let account = verify(&base_url, token).await?;

    store.save(CredentialsUpdate {
        api_token: Some(token.to_string()),
        api_url: explicit_url,
    })?;

    info!(username = %account.username, "Logged in");
    Ok(account)
}

/// Verifies the stored token and returns the account it belongs to.
///
/// # Errors
///
/// Returns `AccountError::NotAuthenticated` without a stored token, and the
/// same errors as [`login`] for API failures.
pub async fn status(
    store: &dyn CredentialStore,
    api_url_override: Option<&str>,
) -> Result<VerifyTokenResponse, AccountError> {
    let credentials = store.load();
    let token = credentials.token().ok_or(AccountError::NotAuthenticated)?;

    verify(&resolve_api_url(api_url_override, &credentials), token).await
}

/// Plain-text status lines for `account`.
#[must_use]
pub fn status_lines(account: &VerifyTokenResponse) -> Vec<String> {
    let mut lines = vec![format!("Logged in as {}", account.username)];

    if account.recent.is_empty() {
        lines.push("No recent submissions".to_string());
        return lines;
    }

    lines.push("Recent submissions:".to_string());
    for burn in account.recent.iter().take(STATUS_RECENT_LIMIT) {
        let tokens = crate::manual::format_thousands(burn.tokens);
        match &burn.project {
            Some(project) => lines.push(format!("  {}  {tokens} tokens  {project}", burn.date)),
            None => lines.push(format!("  {}  {tokens} tokens", burn.date)),
        }
    }
    lines
}
