//! Manual usage entry for the `log` command.
//!
//! Unlike the hook pipeline this path has a human watching, so every
//! problem is reported with a specific message and a failing exit status.
//! Input is validated before any network traffic.
//!
//! Manual entries are tagged `self_reported` / `approximate`.

use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::client::{describe_failure, ClientError, IngestClient};
use crate::config::{resolve_api_url, CredentialStore};
use crate::types::{
    BurnSubmission, SubmissionMetadata, TokenPrecision, VerificationTier, DEFAULT_MANUAL_SOURCE,
};

/// Errors surfaced to the user by `log`.
#[derive(Error, Debug)]
pub enum LogError {
    /// Token count is not a positive integer.
    #[error("invalid token count '{0}': expected a positive whole number")]
    InvalidTokens(String),

    /// Date override is not `YYYY-MM-DD`.
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// No API token is stored.
    #[error("not logged in: run `burn-reporter login` first")]
    NotAuthenticated,

    /// The request never got a response.
    #[error("could not reach the Burn API: {0}")]
    Transport(#[from] ClientError),

    /// The API answered with a non-success status.
    #[error("submission rejected: {0}")]
    Rejected(String),
}

/// Arguments of a `log` invocation, as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct LogRequest {
    /// Raw token count; validated by [`parse_token_count`].
    pub tokens: String,
    pub source: Option<String>,
    pub project: Option<String>,
    pub tool: Option<String>,
    /// Raw `YYYY-MM-DD` date; today (UTC) when absent.
    pub date: Option<String>,
}

/// What was recorded, for the confirmation line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogReceipt {
    pub tokens: u64,
    pub project: Option<String>,
    pub date: NaiveDate,
}

impl LogReceipt {
    /// Human-readable confirmation, e.g.
    /// `Logged 1,234,567 tokens to acme/rocket for 2026-03-14`.
    #[must_use]
    pub fn confirmation(&self) -> String {
        let noun = if self.tokens == 1 { "token" } else { "tokens" };
        match &self.project {
            Some(project) => format!(
                "Logged {} {noun} to {project} for {}",
                format_thousands(self.tokens),
                self.date
            ),
            None => format!(
                "Logged {} {noun} for {}",
                format_thousands(self.tokens),
                self.date
            ),
        }
    }
}

/// Parses a user-supplied token count.
///
/// # Errors
///
/// Returns `LogError::InvalidTokens` for zero, negative, fractional, or
/// non-numeric input.
pub fn parse_token_count(raw: &str) -> Result<u64, LogError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(LogError::InvalidTokens(raw.to_string())),
    }
}

/// Parses an optional `YYYY-MM-DD` override, defaulting to today in UTC.
///
/// # Errors
///
/// Returns `LogError::InvalidDate` if the value is present but malformed.
pub fn parse_activity_date(raw: Option<&str>) -> Result<NaiveDate, LogError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|_| LogError::InvalidDate(s.to_string())),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Builds the submission for a validated manual entry.
#[must_use]
pub fn build_manual_submission(
    request: &LogRequest,
    tokens: u64,
    date: NaiveDate,
) -> BurnSubmission {
    let tool = non_blank(request.tool.as_deref());
    let metadata = SubmissionMetadata {
        tool,
        ..SubmissionMetadata::default()
    };

    BurnSubmission {
        tokens_total: tokens,
        tokens_input: None,
        tokens_output: None,
        tokens_cache_creation: None,
        tokens_cache_read: None,
        source: non_blank(request.source.as_deref())
            .unwrap_or_else(|| DEFAULT_MANUAL_SOURCE.to_string()),
        verification_tier: VerificationTier::SelfReported,
        token_precision: TokenPrecision::Approximate,
        project_hint: non_blank(request.project.as_deref()),
        activity_date: date,
        session_id: None,
        metadata: (!metadata.is_empty()).then_some(metadata),
    }
}

/// Validates, authenticates, and submits a manual entry.
///
/// `api_url_override` beats the stored endpoint, as in
/// [`resolve_api_url`].
///
/// # Errors
///
/// Returns a `LogError` describing the first failure. Validation errors
/// are raised before any credential lookup or network call.
pub async fn run_log(
    request: &LogRequest,
    store: &dyn CredentialStore,
    api_url_override: Option<&str>,
) -> Result<LogReceipt, LogError> {
    let tokens = parse_token_count(&request.tokens)?;
    let date = parse_activity_date(request.date.as_deref())?;

    let credentials = store.load();
    let token = credentials.token().ok_or(LogError::NotAuthenticated)?;

    let submission = build_manual_submission(request, tokens, date);
    let client = IngestClient::new(&resolve_api_url(api_url_override, &credentials))?;

    debug!(tokens, date = %date, "Submitting manual entry");
    let response = client.submit(token, &submission).await?;

    if !response.status().is_success() {
        return Err(LogError::Rejected(describe_failure(response).await));
    }

    info!(tokens, "Manual entry recorded");
    Ok(LogReceipt {
        tokens,
        project: submission.project_hint,
        date,
    })
}

/// Formats `n` with comma thousands separators (`1234567` → `1,234,567`).
#[must_use]
pub fn format_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
