//! Best-effort project attribution from the local git checkout.
//!
//! The hook payload carries the session's working directory. This module
//! asks git for that checkout's `origin` URL and turns it into a short
//! project identifier:
//!
//! | Remote URL | Hint |
//! |------------|------|
//! | `https://github.com/owner/repo.git` | `owner/repo` |
//! | `git@github.com:owner/repo.git` | `owner/repo` |
//! | `ssh://git@gitlab.example.com/team/app` | `team/app` |
//! | `https://gitlab.com/group/sub/app.git` | unchanged |
//! | `/srv/git/mirror.git` | unchanged |
//! | (no repository, no origin, git missing) | none |
//!
//! Nothing here returns an error. Attribution is optional metadata, so
//! every failure reads as "no hint".

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

/// Upper bound on the git subprocess.
pub const GIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolves a project hint for the checkout containing `cwd`.
///
/// Returns `None` if `cwd` is not inside a git repository, has no `origin`
/// remote, git is unavailable, or git does not answer within
/// [`GIT_TIMEOUT`].
pub async fn resolve_project_hint(cwd: &Path) -> Option<String> {
    let url = read_origin_url(cwd, GIT_TIMEOUT).await?;
    parse_remote_url(&url)
}

/// Runs `git remote get-url origin` in `cwd`, bounded by `limit`.
async fn read_origin_url(cwd: &Path, limit: Duration) -> Option<String> {
    let child = Command::new("git")
        .args(["remote", "get-url", "origin"])
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match timeout(limit, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(cwd = %cwd.display(), error = %e, "Could not run git");
            return None;
        }
        Err(_) => {
            debug!(cwd = %cwd.display(), timeout_secs = limit.as_secs(), "git timed out");
            return None;
        }
    };

    if !output.status.success() {
        debug!(cwd = %cwd.display(), status = %output.status, "No origin remote");
        return None;
    }

    let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!url.is_empty()).then_some(url)
}

/// Converts a remote URL into a project hint.
///
/// Hosted HTTPS and SSH URLs with an `<owner>/<repo>` path become
/// `owner/repo`, with any `.git` suffix removed. Any other non-empty URL is
/// returned verbatim. Blank input gives `None`.
///
/// # Examples
///
/// ```
/// use burn_reporter::project::parse_remote_url;
///
/// assert_eq!(
///     parse_remote_url("git@github.com:owner/repo.git").as_deref(),
///     Some("owner/repo")
/// );
/// assert_eq!(
///     parse_remote_url("/srv/git/mirror.git").as_deref(),
///     Some("/srv/git/mirror.git")
/// );
/// assert_eq!(parse_remote_url("  "), None);
/// ```
#[must_use]
pub fn parse_remote_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    Some(owner_repo_slug(url).unwrap_or_else(|| url.to_string()))
}

/// Extracts `owner/repo` from a hosted remote, if `url` is one.
fn owner_repo_slug(url: &str) -> Option<String> {
    let path = match url.split_once("://") {
        // https://[user@]host[:port]/owner/repo
        Some((_, rest)) => {
            let (authority, path) = rest.split_once('/')?;
            if authority.is_empty() {
                return None;
            }
            path
        }
        // [user@]host:owner/repo
        None => {
            let (authority, path) = url.split_once(':')?;
            if authority.is_empty() || authority.contains('/') {
                return None;
            }
            path
        }
    };

    let path = path.trim_matches('/');
    let path = path.strip_suffix(".git").unwrap_or(path);

    let mut segments = path.split('/');
    let owner = segments.next().filter(|s| !s.is_empty())?;
    let repo = segments.next().filter(|s| !s.is_empty())?;
    if segments.next().is_some() {
        return None;
    }

    Some(format!("{owner}/{repo}"))
}
