//! Claude Code transcript reduction.
//!
//! A session transcript is a JSONL file under `~/.claude/projects/`. Every
//! line is an independent JSON record. This module folds the assistant
//! records of one transcript into a single [`UsageAggregate`].
//!
//! # Record Selection
//!
//! | Record | Counted |
//! |--------|---------|
//! | `type: "assistant"` | yes |
//! | `type: "assistant"`, `isSidechain: true` | no (exploratory branch) |
//! | any other `type` | no |
//! | line that is not JSON | no, skipped silently |
//!
//! Only token counters and a little metadata (model, CLI version,
//! timestamps) are read. Message content is never deserialized.
//!
//! # Example
//!
//! ```
//! use burn_reporter::transcript::UsageAccumulator;
//!
//! let mut acc = UsageAccumulator::new();
//! acc.push_line(r#"{"type":"assistant","message":{"usage":{"input_tokens":500,"output_tokens":200}}}"#);
//! acc.push_line(r#"{"type":"user","message":{"content":"hi"}}"#);
//!
//! let usage = acc.finish().unwrap();
//! assert_eq!(usage.total_tokens, 700);
//! assert_eq!(usage.message_count, 1);
//! ```

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, trace};

use crate::config::expand_home;

/// Token usage and metadata reduced from one transcript file.
///
/// Only ever produced with `total_tokens > 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageAggregate {
    /// Sum of the four counters below.
    pub total_tokens: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cache_creation_tokens: u64,
    pub cache_read_tokens: u64,

    /// Model of the earliest record that named one.
    pub model: Option<String>,

    /// Number of counted assistant records.
    pub message_count: u64,

    /// Seconds between the earliest and latest counted timestamps.
    pub duration_seconds: u64,

    /// Claude Code version of the earliest record that named one.
    pub tool_version: Option<String>,
}

/// Raw transcript record. Unknown fields are ignored, and a field of the
/// wrong type reads as absent rather than rejecting the whole line.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTranscriptEntry {
    #[serde(rename = "type", default, deserialize_with = "lenient")]
    entry_type: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    is_sidechain: Option<bool>,

    #[serde(default, deserialize_with = "lenient")]
    timestamp: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    version: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    message: Option<RawAssistantMessage>,
}

#[derive(Debug, Deserialize)]
struct RawAssistantMessage {
    #[serde(default, deserialize_with = "lenient")]
    model: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    usage: Option<RawUsage>,
}

/// Usage block of an assistant message. Missing counters read as zero.
#[derive(Debug, Default, Deserialize)]
struct RawUsage {
    #[serde(default, deserialize_with = "lenient")]
    input_tokens: Option<u64>,

    #[serde(default, deserialize_with = "lenient")]
    output_tokens: Option<u64>,

    #[serde(default, deserialize_with = "lenient")]
    cache_creation_input_tokens: Option<u64>,

    #[serde(default, deserialize_with = "lenient")]
    cache_read_input_tokens: Option<u64>,
}

/// Incremental reducer over transcript lines.
#[derive(Debug, Default)]
pub struct UsageAccumulator {
    input_tokens: u64,
    output_tokens: u64,
    cache_creation_tokens: u64,
    cache_read_tokens: u64,
    message_count: u64,
    model: Option<String>,
    tool_version: Option<String>,
    earliest: Option<DateTime<Utc>>,
    latest: Option<DateTime<Utc>>,
    skipped_lines: u64,
}

impl UsageAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one transcript line into the running totals.
    ///
    /// Returns `true` if the line was a counted assistant record. Blank
    /// lines, malformed JSON, non-assistant and sidechain records return
    /// `false` and leave the totals untouched.
    pub fn push_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }

        let entry: RawTranscriptEntry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(e) => {
                trace!(error = %e, "Skipping unparseable transcript line");
                self.skipped_lines += 1;
                return false;
            }
        };

        if entry.entry_type.as_deref() != Some("assistant") {
            return false;
        }
        if entry.is_sidechain == Some(true) {
            return false;
        }

        let (model, usage) = match entry.message {
            Some(message) => (message.model, message.usage.unwrap_or_default()),
            None => (None, RawUsage::default()),
        };

        self.input_tokens = self
            .input_tokens
            .saturating_add(usage.input_tokens.unwrap_or(0));
        self.output_tokens = self
            .output_tokens
            .saturating_add(usage.output_tokens.unwrap_or(0));
        self.cache_creation_tokens = self
            .cache_creation_tokens
            .saturating_add(usage.cache_creation_input_tokens.unwrap_or(0));
        self.cache_read_tokens = self
            .cache_read_tokens
            .saturating_add(usage.cache_read_input_tokens.unwrap_or(0));
        self.message_count += 1;

        // First write wins.
        if self.model.is_none() {
            self.model = model.filter(|m| !m.is_empty());
        }
        if self.tool_version.is_none() {
            self.tool_version = entry.version.filter(|v| !v.is_empty());
        }

        if let Some(ts) = entry.timestamp.as_deref().and_then(parse_timestamp) {
            self.earliest = Some(self.earliest.map_or(ts, |e| e.min(ts)));
            self.latest = Some(self.latest.map_or(ts, |l| l.max(ts)));
        }

        true
    }

    /// Number of lines that were not valid JSON.
    #[must_use]
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }

    /// Sum of all four counters so far.
    #[must_use]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_tokens)
            .saturating_add(self.cache_read_tokens)
    }

    /// Produces the aggregate, or `None` if no tokens were counted.
    #[must_use]
    pub fn finish(self) -> Option<UsageAggregate> {
        let total_tokens = self.total_tokens();
        if total_tokens == 0 {
            return None;
        }

        let duration_seconds = match (self.earliest, self.latest) {
            (Some(earliest), Some(latest)) => {
                u64::try_from((latest - earliest).num_seconds()).unwrap_or(0)
            }
            _ => 0,
        };

        Some(UsageAggregate {
            total_tokens,
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
            model: self.model,
            message_count: self.message_count,
            duration_seconds,
            tool_version: self.tool_version,
        })
    }
}

/// Deserializes any JSON value, keeping it only if it has the shape of `T`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Parses an RFC 3339 timestamp, returning `None` for anything else.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Reduces the transcript at `path` to a [`UsageAggregate`].
///
/// A leading `~` is expanded to the home directory. Missing, unreadable,
/// empty, or non-JSONL files, and transcripts without any token usage, all
/// yield `None`. This function never fails.
#[must_use]
pub fn parse_transcript(path: &str) -> Option<UsageAggregate> {
    parse_transcript_file(&expand_home(path))
}

/// Like [`parse_transcript`], for an already-resolved path.
#[must_use]
pub fn parse_transcript_file(path: &Path) -> Option<UsageAggregate> {
    // FIFOs and devices can block or never end.
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            debug!(path = %path.display(), "Transcript is not a regular file");
            return None;
        }
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Transcript not readable");
            return None;
        }
    }

    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Transcript not readable");
            return None;
        }
    };

    let mut acc = UsageAccumulator::new();
    // Split on raw bytes so invalid UTF-8 only costs the line it appears on.
    for chunk in BufReader::new(file).split(b'\n') {
        match chunk {
            Ok(bytes) => {
                acc.push_line(&String::from_utf8_lossy(&bytes));
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Transcript read interrupted");
                break;
            }
        }
    }

    debug!(
        path = %path.display(),
        messages = acc.message_count,
        total_tokens = acc.total_tokens(),
        skipped_lines = acc.skipped_lines(),
        "Transcript reduced"
    );

    acc.finish()
}
