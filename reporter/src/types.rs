//! Wire types for the Burn ingestion API and the Claude Code hook payload.
//!
//! Outbound submissions serialize to camelCase JSON. The hook payload read
//! from stdin uses the host tool's snake_case field names.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Source identifier for submissions produced by the session-end hook.
pub const HOOK_SOURCE: &str = "claude-code";

/// Source identifier used by `log` when none is given.
pub const DEFAULT_MANUAL_SOURCE: &str = "manual";

/// How the usage figure was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    /// Typed in by a human.
    SelfReported,
    /// Read from a session transcript by the hook.
    ExtensionTracked,
}

/// Whether token counts are exact or an estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPrecision {
    Approximate,
    Exact,
}

/// Free-form details attached to a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,

    /// Tool named on the command line by `log --tool`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl SubmissionMetadata {
    /// Returns `true` when no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.model.is_none()
            && self.message_count.is_none()
            && self.duration_seconds.is_none()
            && self.tool_version.is_none()
            && self.tool.is_none()
    }
}

/// A single usage report sent to `POST /api/burn/ingest`.
///
/// Built fresh for each invocation and consumed by the send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnSubmission {
    pub tokens_total: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_input: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_output: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_cache_creation: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_cache_read: Option<u64>,

    pub source: String,

    pub verification_tier: VerificationTier,

    pub token_precision: TokenPrecision,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_hint: Option<String>,

    /// Calendar day the usage belongs to, serialized as `YYYY-MM-DD`.
    pub activity_date: NaiveDate,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SubmissionMetadata>,
}

/// JSON document Claude Code writes to a hook's stdin.
///
/// Only `transcript_path` is required; everything else is optional.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub session_id: Option<String>,

    pub transcript_path: String,

    #[serde(default)]
    pub cwd: Option<String>,

    #[serde(default)]
    pub hook_event_name: Option<String>,
}

/// Success body of `GET /api/burn/verify-token`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifyTokenResponse {
    pub username: String,

    #[serde(default)]
    pub recent: Vec<RecentBurn>,
}

/// One entry of the recent-submission list returned by verify-token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecentBurn {
    pub date: String,

    pub tokens: u64,

    #[serde(default)]
    pub project: Option<String>,
}
