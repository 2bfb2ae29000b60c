//! Burn Reporter - Claude Code token usage reporter.
//!
//! # Commands
//!
//! - `burn-reporter report`: `SessionEnd` hook entry point (always exits 0)
//! - `burn-reporter log <TOKENS>`: Record usage by hand
//! - `burn-reporter login`: Verify and store an API token
//! - `burn-reporter status`: Show the logged-in account and recent submissions
//! - `burn-reporter install-hook`: Register the `SessionEnd` hook with Claude Code
//!
//! # Environment Variables
//!
//! See the [`config`](burn_reporter::config) module for available options.

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use burn_reporter::account::{self, status_lines};
use burn_reporter::config::Config;
use burn_reporter::hooks::{install_session_end_hook, HookInstall, DEFAULT_HOOK_COMMAND};
use burn_reporter::manual::{run_log, LogRequest};
use burn_reporter::report;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "BURN_LOG";

/// Environment variable selecting `json` log output.
const LOG_FORMAT_ENV: &str = "BURN_LOG_FORMAT";

/// Burn Reporter - Claude Code token usage reporter.
///
/// Reports the token usage of each Claude Code session to Burn, or records
/// usage by hand.
#[derive(Parser, Debug)]
#[command(name = "burn-reporter")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    BURN_CONFIG_DIR    Credential directory (default: ~/.burn)
    BURN_API_URL       API base URL, overrides the stored value
    BURN_CLAUDE_DIR    Claude directory (default: ~/.claude)
    BURN_LOG           Log filter (default: warn)
    BURN_LOG_FORMAT    Set to 'json' for JSON log lines

EXAMPLES:
    # Store your API token
    burn-reporter login --token burn_xxx

    # Report every Claude Code session automatically
    burn-reporter install-hook

    # Record usage from another tool
    burn-reporter log 125000 --tool cursor --project acme/rocket
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Report the finished session (run by the SessionEnd hook).
    ///
    /// Reads the hook payload from stdin. Never fails and never writes
    /// to stdout.
    Report,

    /// Record token usage by hand.
    Log {
        /// Number of tokens used (a positive whole number).
        #[arg(allow_hyphen_values = true)]
        tokens: String,

        /// Source label (default: manual).
        #[arg(long)]
        source: Option<String>,

        /// Project to attribute the usage to, e.g. owner/repo.
        #[arg(short, long)]
        project: Option<String>,

        /// Tool that consumed the tokens.
        #[arg(long)]
        tool: Option<String>,

        /// Activity date as YYYY-MM-DD (default: today, UTC).
        #[arg(long)]
        date: Option<String>,
    },

    /// Verify an API token and store it.
    ///
    /// Prompts for the token on stderr when --token is not given.
    Login {
        /// API token.
        #[arg(long)]
        token: Option<String>,

        /// API base URL to store alongside the token.
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Show the logged-in account and recent submissions.
    Status,

    /// Register the SessionEnd hook in Claude Code's settings.
    InstallHook {
        /// Command the hook runs.
        #[arg(long, default_value = DEFAULT_HOOK_COMMAND)]
        command: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging();

    match cli.command {
        Command::Report => report::run_hook(),
        command => match run_interactive(command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Error: {e:#}");
                ExitCode::FAILURE
            }
        },
    }
}

/// Runs a human-facing command. Errors are returned for the caller to print.
fn run_interactive(command: Command) -> Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    if let Command::InstallHook { command } = &command {
        return run_install_hook(&config, command);
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async move {
        match command {
            Command::Log {
                tokens,
                source,
                project,
                tool,
                date,
            } => {
                let request = LogRequest {
                    tokens,
                    source,
                    project,
                    tool,
                    date,
                };
                let store = config.credential_store();
                let receipt =
                    run_log(&request, &store, config.api_url_override.as_deref()).await?;
                println!("{}", receipt.confirmation());
                Ok(())
            }
            Command::Login { token, api_url } => run_login(&config, token, api_url).await,
            Command::Status => {
                let store = config.credential_store();
                let account = account::status(&store, config.api_url_override.as_deref()).await?;
                for line in status_lines(&account) {
                    println!("{line}");
                }
                Ok(())
            }
            Command::Report | Command::InstallHook { .. } => Ok(()),
        }
    })
}

/// Runs the login command, prompting for the token when needed.
async fn run_login(config: &Config, token: Option<String>, api_url: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => prompt_token()?,
    };

    let store = config.credential_store();
    let account = account::login(
        &token,
        api_url.as_deref(),
        &store,
        config.api_url_override.as_deref(),
    )
    .await?;

    println!("Logged in as {}", account.username);
    println!("Credentials saved to {}", store.path().display());
    Ok(())
}

/// Reads one line from stdin after printing a prompt on stderr.
fn prompt_token() -> Result<String> {
    eprint!("Burn API token: ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read token from stdin")?;
    Ok(input.trim().to_string())
}

/// Runs the install-hook command.
fn run_install_hook(config: &Config, command: &str) -> Result<()> {
    let settings_path = config.settings_path();

    match install_session_end_hook(&settings_path, command)? {
        HookInstall::Installed => {
            println!("Registered SessionEnd hook in {}", settings_path.display());
        }
        HookInstall::AlreadyPresent => {
            println!(
                "SessionEnd hook already registered in {}",
                settings_path.display()
            );
        }
    }
    Ok(())
}

/// Initializes the tracing subscriber on stderr.
///
/// Stdout belongs to the host tool when running as a hook, so log lines
/// never go there.
fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let json_layer = json.then(|| {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_target(true)
    });
    let text_layer = (!json).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
    });

    // A failed init only loses log lines.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init();
}
