//! Session-end reporting for the `report` command.
//!
//! Claude Code runs `burn-reporter report` as a `SessionEnd` hook and pipes
//! a small JSON payload to stdin. The pipeline reduces the session
//! transcript named in that payload, attributes it to a project, and
//! submits it once.
//!
//! # Contract
//!
//! The host tool must never see this hook fail or stall:
//!
//! - the process always exits with status 0
//! - nothing is ever written to stdout
//! - stdin is read for at most [`STDIN_TIMEOUT`], git for at most
//!   [`GIT_TIMEOUT`](crate::project::GIT_TIMEOUT)
//! - every failure (bad input, no data, no login, network, non-2xx)
//!   ends the run early with at most one line on stderr
//!
//! [`never_propagate`] enforces this around the whole pipeline, including
//! panics. [`ReportOutcome`] records how a run ended so tests can assert on
//! it without scraping stderr.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::client::{describe_failure, IngestClient};
use crate::config::{resolve_api_url, Config, CredentialStore};
use crate::project::resolve_project_hint;
use crate::transcript::{parse_transcript, UsageAggregate};
use crate::types::{
    BurnSubmission, HookPayload, SubmissionMetadata, TokenPrecision, VerificationTier, HOOK_SOURCE,
};

/// Longest time spent waiting for the hook payload on stdin.
pub const STDIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a run stopped before submitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Stdin was empty, blank, or not closed in time.
    EmptyInput,
    /// Stdin was not JSON, or lacked `transcript_path`.
    InvalidPayload,
    /// The transcript was missing, unreadable, or had no token usage.
    NoUsage,
}

/// How a report run ended. Every variant maps to exit status 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Skipped(SkipReason),
    /// No API token is configured.
    NotLoggedIn,
    /// The API accepted the submission.
    Submitted { tokens: u64 },
    /// The API answered with a non-success status.
    Rejected { status: u16 },
    /// Configuration or transport failure.
    Failed,
    /// The pipeline panicked or never started.
    Aborted,
}

/// Everything the pipeline needs besides stdin.
#[derive(Clone)]
pub struct ReportContext {
    pub store: Arc<dyn CredentialStore>,
    pub api_url_override: Option<String>,
    pub stdin_timeout: Duration,
}

impl ReportContext {
    /// Context backed by the credential file and overrides in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            store: Arc::new(config.credential_store()),
            api_url_override: config.api_url_override.clone(),
            stdin_timeout: STDIN_TIMEOUT,
        }
    }
}

/// Entry point of the `report` command. Always returns success.
pub fn run_hook() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            warn!(error = %e, "Could not start runtime, skipping usage report");
            return ExitCode::SUCCESS;
        }
    };

    let outcome = runtime.block_on(async {
        match Config::from_env() {
            Ok(config) => {
                let ctx = ReportContext::from_config(&config);
                never_propagate(report_pipeline(tokio::io::stdin(), ctx)).await
            }
            Err(e) => {
                warn!(error = %e, "Invalid configuration, skipping usage report");
                ReportOutcome::Failed
            }
        }
    });

    debug!(?outcome, "Report finished");

    // A timed-out stdin read leaves a blocking reader behind; do not wait for it.
    runtime.shutdown_background();
    ExitCode::SUCCESS
}

/// Runs `pipeline` so that nothing it does can escape as an error or panic.
///
/// The pipeline runs on its own task; a panic surfaces here as a join error
/// and becomes [`ReportOutcome::Aborted`].
pub async fn never_propagate<F>(pipeline: F) -> ReportOutcome
where
    F: Future<Output = ReportOutcome> + Send + 'static,
{
    match tokio::spawn(pipeline).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(error = %e, "Usage report aborted");
            ReportOutcome::Aborted
        }
    }
}

/// The report pipeline proper: stdin → transcript → project → submit.
pub async fn report_pipeline<R>(reader: R, ctx: ReportContext) -> ReportOutcome
where
    R: AsyncRead + Unpin,
{
    let input = read_input(reader, ctx.stdin_timeout).await;

    let payload = match parse_payload(&input) {
        Ok(payload) => payload,
        Err(reason) => {
            debug!(?reason, "No usable hook payload");
            return ReportOutcome::Skipped(reason);
        }
    };

    let Some(usage) = parse_transcript(&payload.transcript_path) else {
        debug!(path = %payload.transcript_path, "Transcript has no usage");
        return ReportOutcome::Skipped(SkipReason::NoUsage);
    };

    let cwd = payload
        .cwd
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok());
    let project_hint = match cwd {
        Some(dir) => resolve_project_hint(&dir).await,
        None => None,
    };

    let credentials = ctx.store.load();
    let Some(token) = credentials.token() else {
        eprintln!("burn-reporter: not logged in, run `burn-reporter login` to report token usage");
        return ReportOutcome::NotLoggedIn;
    };

    let submission = build_hook_submission(
        &usage,
        payload.session_id,
        project_hint,
        Utc::now().date_naive(),
    );

    let base_url = resolve_api_url(ctx.api_url_override.as_deref(), &credentials);
    let client = match IngestClient::new(&base_url) {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, "Could not create HTTP client, usage not reported");
            return ReportOutcome::Failed;
        }
    };

    match client.submit(token, &submission).await {
        Ok(response) if response.status().is_success() => {
            info!(
                tokens = usage.total_tokens,
                project = submission.project_hint.as_deref().unwrap_or("-"),
                "Usage reported"
            );
            ReportOutcome::Submitted {
                tokens: usage.total_tokens,
            }
        }
        Ok(response) => {
            let status = response.status().as_u16();
            let reason = describe_failure(response).await;
            warn!(%reason, "Usage report rejected");
            ReportOutcome::Rejected { status }
        }
        Err(e) => {
            warn!(error = %e, "Usage report failed");
            ReportOutcome::Failed
        }
    }
}

/// Reads `reader` to the end, giving up after `limit`.
///
/// A timeout or read error yields an empty string, as does nothing at all.
pub async fn read_input<R>(mut reader: R, limit: Duration) -> String
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    match timeout(limit, reader.read_to_end(&mut buf)).await {
        Ok(Ok(_)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => {
            debug!(error = %e, "Could not read hook payload");
            String::new()
        }
        Err(_) => {
            debug!(timeout_secs = limit.as_secs(), "Timed out waiting for hook payload");
            String::new()
        }
    }
}

/// Parses the hook payload.
///
/// # Errors
///
/// Returns the [`SkipReason`] explaining why `input` is unusable.
pub fn parse_payload(input: &str) -> Result<HookPayload, SkipReason> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SkipReason::EmptyInput);
    }

    let payload: HookPayload =
        serde_json::from_str(input).map_err(|_| SkipReason::InvalidPayload)?;

    if payload.transcript_path.trim().is_empty() {
        return Err(SkipReason::InvalidPayload);
    }
    Ok(payload)
}

/// Builds the exact, hook-tracked submission for one transcript.
#[must_use]
pub fn build_hook_submission(
    usage: &UsageAggregate,
    session_id: Option<String>,
    project_hint: Option<String>,
    activity_date: NaiveDate,
) -> BurnSubmission {
    BurnSubmission {
        tokens_total: usage.total_tokens,
        tokens_input: Some(usage.input_tokens),
        tokens_output: Some(usage.output_tokens),
        tokens_cache_creation: Some(usage.cache_creation_tokens),
        tokens_cache_read: Some(usage.cache_read_tokens),
        source: HOOK_SOURCE.to_string(),
        verification_tier: VerificationTier::ExtensionTracked,
        token_precision: TokenPrecision::Exact,
        project_hint,
        activity_date,
        session_id: session_id.filter(|s| !s.is_empty()),
        metadata: Some(SubmissionMetadata {
            model: usage.model.clone(),
            message_count: Some(usage.message_count),
            duration_seconds: Some(usage.duration_seconds),
            tool_version: usage.tool_version.clone(),
            tool: None,
        }),
    }
}
