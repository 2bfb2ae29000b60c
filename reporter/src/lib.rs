//! Burn Reporter - Claude Code token usage reporter.
//!
//! This crate turns Claude Code session transcripts into token usage
//! submissions for the Burn ingestion API.
//!
//! # Overview
//!
//! Claude Code invokes `burn-reporter report` as a `SessionEnd` hook. The
//! reporter reads the hook payload from stdin, reduces the session
//! transcript to a [`UsageAggregate`], attributes it to a git project, and
//! submits it once. That path is fail-silent: it always exits 0 and never
//! writes to stdout (see [`report`]).
//!
//! The interactive commands (`log`, `login`, `status`, `install-hook`) fail
//! loudly with a specific message and a nonzero exit status.
//!
//! # Modules
//!
//! - [`types`]: Wire types and the hook payload
//! - [`config`]: Environment configuration and the credential store
//! - [`transcript`]: JSONL transcript aggregation
//! - [`project`]: Git remote based project attribution
//! - [`client`]: HTTP client for the ingestion API
//! - [`report`]: The fail-silent session-end pipeline
//! - [`manual`]: Manual usage entry
//! - [`account`]: Login and status
//! - [`hooks`]: `SessionEnd` hook registration

pub mod account;
pub mod client;
pub mod config;
pub mod hooks;
pub mod manual;
pub mod project;
pub mod report;
pub mod transcript;
pub mod types;

pub use client::{ClientError, IngestClient};
pub use config::{
    Config, ConfigError, CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore,
};
pub use report::{never_propagate, ReportContext, ReportOutcome, SkipReason};
pub use transcript::{parse_transcript, UsageAggregate};
pub use types::{BurnSubmission, HookPayload, TokenPrecision, VerificationTier};
