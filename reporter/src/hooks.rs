//! Registration of the `SessionEnd` hook in Claude Code's settings.
//!
//! Claude Code reads lifecycle hooks from `~/.claude/settings.json`:
//!
//! ```text
//! {
//!   "hooks": {
//!     "SessionEnd": [
//!       { "hooks": [ { "type": "command", "command": "burn-reporter report" } ] }
//!     ]
//!   }
//! }
//! ```
//!
//! Installation is idempotent: if any `SessionEnd` command already invokes
//! `burn-reporter report`, the file is left untouched. Other keys and hooks
//! are preserved in their original order.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, info};

/// Command registered by default.
pub const DEFAULT_HOOK_COMMAND: &str = "burn-reporter report";

/// Substring that identifies an existing registration.
const REPORT_COMMAND_MARKER: &str = "burn-reporter report";

/// Hook event the reporter listens to.
const SESSION_END_EVENT: &str = "SessionEnd";

/// Errors that can occur while updating the settings file.
#[derive(Error, Debug)]
pub enum HookError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a settings object we can extend.
    #[error("refusing to modify {path}: {message}")]
    InvalidSettings { path: PathBuf, message: String },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result of [`install_session_end_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookInstall {
    Installed,
    AlreadyPresent,
}

/// Ensures `settings_path` runs `command` at session end.
///
/// A missing settings file is created. A file that is not valid JSON, or
/// whose `hooks` layout is not the expected shape, is left alone and an
/// error is returned.
///
/// # Errors
///
/// Returns `HookError` if the file cannot be read, parsed, or written.
pub fn install_session_end_hook(
    settings_path: &Path,
    command: &str,
) -> Result<HookInstall, HookError> {
    let invalid = |message: &str| HookError::InvalidSettings {
        path: settings_path.to_path_buf(),
        message: message.to_string(),
    };

    let mut settings = match fs::read_to_string(settings_path) {
        Ok(contents) if contents.trim().is_empty() => Value::Object(Map::new()),
        Ok(contents) => serde_json::from_str::<Value>(&contents)
            .map_err(|e| invalid(&format!("not valid JSON ({e})")))?,
        Err(e) if e.kind() == ErrorKind::NotFound => Value::Object(Map::new()),
        Err(source) => {
            return Err(HookError::Read {
                path: settings_path.to_path_buf(),
                source,
            })
        }
    };

    if has_report_hook(&settings) {
        debug!(path = %settings_path.display(), "Report hook already registered");
        return Ok(HookInstall::AlreadyPresent);
    }

    let root = settings
        .as_object_mut()
        .ok_or_else(|| invalid("top level is not an object"))?;
    let hooks = root
        .entry("hooks")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| invalid("\"hooks\" is not an object"))?;
    let session_end = hooks
        .entry(SESSION_END_EVENT)
        .or_insert_with(|| Value::Array(Vec::new()))
        .as_array_mut()
        .ok_or_else(|| invalid("\"hooks.SessionEnd\" is not an array"))?;

    session_end.push(json!({
        "hooks": [
            { "type": "command", "command": command }
        ]
    }));

    write_settings(settings_path, &settings)?;
    info!(path = %settings_path.display(), command, "Registered SessionEnd hook");
    Ok(HookInstall::Installed)
}

/// Returns `true` if any `SessionEnd` hook command invokes the reporter.
#[must_use]
pub fn has_report_hook(settings: &Value) -> bool {
    settings
        .pointer("/hooks/SessionEnd")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|matcher| matcher.get("hooks").and_then(Value::as_array))
        .flatten()
        .filter_map(|hook| hook.get("command").and_then(Value::as_str))
        .any(|cmd| cmd.contains(REPORT_COMMAND_MARKER))
}

fn write_settings(path: &Path, settings: &Value) -> Result<(), HookError> {
    let write_err = |source: std::io::Error| HookError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(write_err)?;
    }

    let mut body = serde_json::to_string_pretty(settings)?;
    body.push('\n');
    fs::write(path, body).map_err(write_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn creates_settings_file_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(".claude").join("settings.json");

        let result = install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap();

        assert_eq!(result, HookInstall::Installed);
        let settings = read(&path);
        assert_eq!(
            settings["hooks"]["SessionEnd"][0]["hooks"][0]["command"],
            DEFAULT_HOOK_COMMAND
        );
        assert_eq!(settings["hooks"]["SessionEnd"][0]["hooks"][0]["type"], "command");
        assert!(fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn second_install_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");

        install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let result = install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap();

        assert_eq!(result, HookInstall::AlreadyPresent);
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn existing_absolute_path_registration_is_detected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{"hooks":{"SessionEnd":[{"hooks":[{"type":"command","command":"/usr/local/bin/burn-reporter report"}]}]}}"#,
        )
        .unwrap();

        assert_eq!(
            install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap(),
            HookInstall::AlreadyPresent
        );
    }

    #[test]
    fn preserves_unrelated_settings_and_hooks() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{
  "model": "sonnet",
  "hooks": {
    "PreToolUse": [{"matcher": "Bash", "hooks": [{"type": "command", "command": "audit"}]}],
    "SessionEnd": [{"hooks": [{"type": "command", "command": "notify-send done"}]}]
  },
  "permissions": {"allow": []}
}"#,
        )
        .unwrap();

        install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap();

        let settings = read(&path);
        assert_eq!(settings["model"], "sonnet");
        assert_eq!(settings["hooks"]["PreToolUse"][0]["matcher"], "Bash");
        let session_end = settings["hooks"]["SessionEnd"].as_array().unwrap();
        assert_eq!(session_end.len(), 2);
        assert_eq!(session_end[0]["hooks"][0]["command"], "notify-send done");
        assert_eq!(session_end[1]["hooks"][0]["command"], DEFAULT_HOOK_COMMAND);

        // Key order survives the rewrite.
        let text = fs::read_to_string(&path).unwrap();
        let model_at = text.find("\"model\"").unwrap();
        let permissions_at = text.find("\"permissions\"").unwrap();
        assert!(model_at < permissions_at);
    }

    #[test]
    fn invalid_json_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, "{ broken").unwrap();

        let err = install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap_err();

        assert!(matches!(err, HookError::InvalidSettings { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ broken");
    }

    #[test]
    fn unexpected_hooks_shape_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        fs::write(&path, r#"{"hooks": {"SessionEnd": "oops"}}"#).unwrap();

        let err = install_session_end_hook(&path, DEFAULT_HOOK_COMMAND).unwrap_err();
        assert!(
            matches!(err, HookError::InvalidSettings { ref message, .. } if message.contains("SessionEnd"))
        );
    }

    #[test]
    fn has_report_hook_ignores_other_events() {
        let settings = json!({
            "hooks": {
                "Stop": [{"hooks": [{"type": "command", "command": "burn-reporter report"}]}]
            }
        });
        assert!(!has_report_hook(&settings));
        assert!(!has_report_hook(&json!([])));
    }
}
