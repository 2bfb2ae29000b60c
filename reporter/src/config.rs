//! Configuration and credential storage for Burn Reporter.
//!
//! Runtime settings come from environment variables. The API token lives in
//! a small JSON file that only the owner can read.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `BURN_CONFIG_DIR` | No | `~/.burn` | Directory containing `config.json` |
//! | `BURN_API_URL` | No | stored `api_url`, then production | API base URL |
//! | `BURN_CLAUDE_DIR` | No | `~/.claude` | Claude Code directory (hook settings) |
//! | `BURN_LOG` | No | `warn` | Log filter directive |
//! | `BURN_LOG_FORMAT` | No | text | `json` for JSON log lines |
//!
//! # Credential File
//!
//! ```text
//! ~/.burn/config.json   (mode 0600)
//! {
//!   "api_token": "burn_...",
//!   "api_url": "https://tokenburn.dev"
//! }
//! ```
//!
//! # Example
//!
//! ```no_run
//! use burn_reporter::config::{Config, CredentialStore};
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! let credentials = config.credential_store().load();
//! println!("Logged in: {}", credentials.token().is_some());
//! ```

use std::env;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Production API endpoint.
pub const DEFAULT_API_URL: &str = "https://tokenburn.dev";

/// Default config directory name relative to home.
const DEFAULT_CONFIG_DIR: &str = ".burn";

/// Default Claude Code directory name relative to home.
const DEFAULT_CLAUDE_DIR: &str = ".claude";

/// Credential file name inside the config directory.
const CONFIG_FILE: &str = "config.json";

/// Claude Code settings file name inside the Claude directory.
const SETTINGS_FILE: &str = "settings.json";

/// Errors that can occur while reading configuration or saving credentials.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,

    /// The credential file could not be written.
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The merged credentials could not be serialized.
    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Stored API credentials.
///
/// Both fields are optional: an empty value means "not logged in", which is
/// a normal state rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Credentials {
    /// Returns the API token if one is configured and non-blank.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.api_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Partial update merged into the stored credentials by [`CredentialStore::save`].
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialsUpdate {
    pub api_token: Option<String>,
    pub api_url: Option<String>,
}

/// Load/merge/save access to the credential file.
///
/// The pipelines only ever talk to this trait, so they can be exercised
/// against [`MemoryCredentialStore`] without touching the filesystem.
pub trait CredentialStore: Send + Sync {
    /// Returns the stored credentials. Never fails: a missing or corrupt
    /// store reads as empty.
    fn load(&self) -> Credentials;

    /// Merges `update` into the stored credentials and persists the result.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the merged document cannot be written.
    fn save(&self, update: CredentialsUpdate) -> Result<(), ConfigError>;
}

/// Credential store backed by `<dir>/config.json`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Creates a store for `config.json` inside `dir`.
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CONFIG_FILE),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the raw JSON object, keeping keys this version does not know.
    fn read_document(&self) -> serde_json::Map<String, serde_json::Value> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "No readable credential file");
                return serde_json::Map::new();
            }
        };

        match serde_json::from_str::<serde_json::Value>(&contents) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!(path = %self.path.display(), "Ignoring malformed credential file");
                serde_json::Map::new()
            }
        }
    }

    fn write_document(
        &self,
        document: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(write_err)?;
        }

        let mut body = serde_json::to_string_pretty(document)?;
        body.push('\n');

        let mut file = open_private(&self.path).map_err(write_err)?;
        file.write_all(body.as_bytes()).map_err(write_err)?;

        Ok(())
    }
}

/// Opens `path` for rewriting, restricted to the owner before any byte is
/// written. A pre-existing file keeps its inode but loses broader bits.
fn open_private(path: &Path) -> std::io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Credentials {
        let document = self.read_document();
        serde_json::from_value(serde_json::Value::Object(document)).unwrap_or_default()
    }

    fn save(&self, update: CredentialsUpdate) -> Result<(), ConfigError> {
        let mut document = self.read_document();

        if let Some(token) = update.api_token {
            document.insert("api_token".to_string(), token.into());
        }
        if let Some(url) = update.api_url {
            document.insert("api_url".to_string(), url.into());
        }

        self.write_document(&document)?;
        debug!(path = %self.path.display(), "Credentials saved");
        Ok(())
    }
}

/// In-memory credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Credentials>,
}

impl MemoryCredentialStore {
    /// Creates a store pre-populated with `credentials`.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            inner: Mutex::new(credentials),
        }
    }

    /// Creates a store holding only an API token.
    #[must_use]
    pub fn with_token(token: &str) -> Self {
        Self::new(Credentials {
            api_token: Some(token.to_string()),
            api_url: None,
        })
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Credentials {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn save(&self, update: CredentialsUpdate) -> Result<(), ConfigError> {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if update.api_token.is_some() {
            guard.api_token = update.api_token;
        }
        if update.api_url.is_some() {
            guard.api_url = update.api_url;
        }
        Ok(())
    }
}

/// Runtime configuration for Burn Reporter.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the credential file.
    pub config_dir: PathBuf,

    /// API base URL forced by `BURN_API_URL`, beating the stored value.
    pub api_url_override: Option<String>,

    /// Claude Code directory containing `settings.json`.
    pub claude_dir: PathBuf,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `BURN_API_URL` is set but is not an `http://` or `https://` URL
    /// - The home directory cannot be determined (needed for default paths)
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_dirs = BaseDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
        let home_dir = base_dirs.home_dir();

        let config_dir = env::var("BURN_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join(DEFAULT_CONFIG_DIR));

        let claude_dir = env::var("BURN_CLAUDE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| home_dir.join(DEFAULT_CLAUDE_DIR));

        let api_url_override = match env::var("BURN_API_URL") {
            Ok(val) => Some(validate_api_url("BURN_API_URL", &val)?),
            Err(_) => None,
        };

        Ok(Self {
            config_dir,
            api_url_override,
            claude_dir,
        })
    }

    /// Returns the file-backed credential store for this configuration.
    #[must_use]
    pub fn credential_store(&self) -> FileCredentialStore {
        FileCredentialStore::new(&self.config_dir)
    }

    /// Resolves the API base URL: environment, then stored value, then the
    /// production default.
    #[must_use]
    pub fn api_base_url(&self, credentials: &Credentials) -> String {
        resolve_api_url(self.api_url_override.as_deref(), credentials)
    }

    /// Path of the Claude Code settings file that holds hook registrations.
    #[must_use]
    pub fn settings_path(&self) -> PathBuf {
        self.claude_dir.join(SETTINGS_FILE)
    }
}

/// Picks the API base URL from an explicit override, the stored credentials,
/// or the production default, in that order.
#[must_use]
pub fn resolve_api_url(override_url: Option<&str>, credentials: &Credentials) -> String {
    override_url
        .or(credentials.api_url.as_deref())
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .unwrap_or(DEFAULT_API_URL)
        .trim_end_matches('/')
        .to_string()
}

/// Checks that `value` looks like an HTTP(S) base URL.
///
/// # Errors
///
/// Returns `ConfigError::InvalidValue` naming `key` otherwise.
pub fn validate_api_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "URL must not be empty".to_string(),
        });
    }
    if !(trimmed.starts_with("https://") || trimmed.starts_with("http://")) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected http:// or https:// URL, got '{trimmed}'"),
        });
    }
    Ok(trimmed.trim_end_matches('/').to_string())
}

/// Expands a leading `~` to the user's home directory.
///
/// Paths without the shorthand, and paths where no home directory can be
/// determined, are returned unchanged.
#[must_use]
pub fn expand_home(path: &str) -> PathBuf {
    let rest = if path == "~" {
        Some("")
    } else {
        path.strip_prefix("~/")
    };

    match (rest, BaseDirs::new()) {
        (Some(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    /// Helper to run tests with isolated environment variables.
    /// Clears all BURN_* vars before the test and restores them after.
    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let saved_vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with("BURN_")).collect();

        for (key, _) in &saved_vars {
            env::remove_var(key);
        }

        let result = f();

        for (key, _) in env::vars().filter(|(k, _)| k.starts_with("BURN_")) {
            env::remove_var(key);
        }
        for (key, value) in saved_vars {
            env::set_var(key, value);
        }

        result
    }

    #[test]
    fn load_missing_file_returns_empty_credentials() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(&temp_dir.path().join("nope"));

        assert_eq!(store.load(), Credentials::default());
        assert!(store.load().token().is_none());
    }

    #[test]
    fn load_invalid_json_returns_empty_credentials() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "{not json").unwrap();

        let store = FileCredentialStore::new(temp_dir.path());
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn load_non_object_json_returns_empty_credentials() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(CONFIG_FILE), "[1, 2, 3]").unwrap();

        let store = FileCredentialStore::new(temp_dir.path());
        assert_eq!(store.load(), Credentials::default());
    }

    #[test]
    fn save_then_load_round_trips_merged_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileCredentialStore::new(&temp_dir.path().join("nested").join("dir"));

        store
            .save(CredentialsUpdate {
                api_token: Some("burn_abc".to_string()),
                api_url: None,
            })
            .unwrap();
        store
            .save(CredentialsUpdate {
                api_token: None,
                api_url: Some("https://staging.tokenburn.dev".to_string()),
            })
            .unwrap();

        assert_eq!(
            store.load(),
            Credentials {
                api_token: Some("burn_abc".to_string()),
                api_url: Some("https://staging.tokenburn.dev".to_string()),
            }
        );

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        let keys: Vec<&String> = raw.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn save_preserves_unknown_keys() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(CONFIG_FILE),
            r#"{"api_token":"old","theme":"dark"}"#,
        )
        .unwrap();

        let store = FileCredentialStore::new(temp_dir.path());
        store
            .save(CredentialsUpdate {
                api_token: Some("new".to_string()),
                api_url: None,
            })
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["api_token"], "new");
        assert_eq!(raw["theme"], "dark");
    }

    #[cfg(unix)]
    #[test]
    fn save_restricts_permissions_to_owner() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "{}").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileCredentialStore::new(temp_dir.path());
        store
            .save(CredentialsUpdate {
                api_token: Some("secret".to_string()),
                api_url: None,
            })
            .unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(mode & 0o077, 0);
    }

    #[cfg(unix)]
    #[test]
    fn existing_file_is_private_before_anything_is_written() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"api_token":"old"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();

        let file = open_private(&path).unwrap();

        // Nothing written through the handle yet.
        assert_eq!(file.metadata().unwrap().len(), 0);
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn blank_token_is_not_a_token() {
        let credentials = Credentials {
            api_token: Some("   ".to_string()),
            api_url: None,
        };
        assert!(credentials.token().is_none());
    }

    #[test]
    fn memory_store_merges_updates() {
        let store = MemoryCredentialStore::with_token("t1");
        store
            .save(CredentialsUpdate {
                api_token: None,
                api_url: Some("http://localhost:3000".to_string()),
            })
            .unwrap();

        let loaded = store.load();
        assert_eq!(loaded.token(), Some("t1"));
        assert_eq!(loaded.api_url.as_deref(), Some("http://localhost:3000"));
    }

    #[test]
    fn resolve_api_url_precedence() {
        let stored = Credentials {
            api_token: None,
            api_url: Some("https://stored.example.com/".to_string()),
        };

        assert_eq!(
            resolve_api_url(Some("http://localhost:8080"), &stored),
            "http://localhost:8080"
        );
        assert_eq!(resolve_api_url(None, &stored), "https://stored.example.com");
        assert_eq!(
            resolve_api_url(None, &Credentials::default()),
            DEFAULT_API_URL
        );
    }

    #[test]
    fn validate_api_url_rejects_bad_values() {
        assert!(matches!(
            validate_api_url("BURN_API_URL", "  "),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            validate_api_url("BURN_API_URL", "ftp://example.com"),
            Err(ConfigError::InvalidValue { ref message, .. }) if message.contains("ftp://")
        ));
        assert_eq!(
            validate_api_url("BURN_API_URL", "https://example.com/").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn expand_home_leaves_plain_paths_alone() {
        assert_eq!(expand_home("/tmp/x.jsonl"), PathBuf::from("/tmp/x.jsonl"));
        assert_eq!(expand_home("~user/x"), PathBuf::from("~user/x"));
    }

    #[test]
    fn expand_home_replaces_tilde_prefix() {
        let home = BaseDirs::new().unwrap().home_dir().to_path_buf();
        assert_eq!(
            expand_home("~/.claude/projects/a.jsonl"),
            home.join(".claude/projects/a.jsonl")
        );
        assert_eq!(expand_home("~"), home);
    }

    #[test]
    #[serial]
    fn test_default_config() {
        with_clean_env(|| {
            let config = Config::from_env().expect("should parse default config");

            assert!(config.config_dir.ends_with(DEFAULT_CONFIG_DIR));
            assert!(config.claude_dir.ends_with(DEFAULT_CLAUDE_DIR));
            assert!(config.api_url_override.is_none());
            assert!(config.settings_path().ends_with("settings.json"));
        });
    }

    #[test]
    #[serial]
    fn test_full_config() {
        with_clean_env(|| {
            env::set_var("BURN_CONFIG_DIR", "/custom/burn");
            env::set_var("BURN_CLAUDE_DIR", "/custom/claude");
            env::set_var("BURN_API_URL", "http://localhost:4000/");

            let config = Config::from_env().expect("should parse full config");

            assert_eq!(config.config_dir, PathBuf::from("/custom/burn"));
            assert_eq!(config.claude_dir, PathBuf::from("/custom/claude"));
            assert_eq!(
                config.api_url_override.as_deref(),
                Some("http://localhost:4000")
            );
            assert_eq!(
                config.credential_store().path(),
                Path::new("/custom/burn/config.json")
            );
            assert_eq!(
                config.api_base_url(&Credentials::default()),
                "http://localhost:4000"
            );
        });
    }

    #[test]
    #[serial]
    fn test_invalid_api_url() {
        with_clean_env(|| {
            env::set_var("BURN_API_URL", "not-a-url");

            let err = Config::from_env().unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue { ref key, .. } if key == "BURN_API_URL"
            ));
        });
    }
}
