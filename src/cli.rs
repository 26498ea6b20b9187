//! CLI - Command Line Interface for mediadeck
//!
//! Scriptable management of configured media servers. All output is
//! JSON-parseable with `--json` (the default when stdout is not a TTY).
//!
//! # Examples
//!
//! ```bash
//! # Register a Stremio server and make it active
//! mediadeck add -t stremio -n "Living Room" -u http://192.168.1.20:11470 --current
//!
//! # Inspect and probe
//! mediadeck list -t stremio
//! mediadeck check -t stremio --json
//!
//! # Switch and clean up
//! mediadeck use stremio-4f1c...
//! mediadeck remove stremio-9a02...
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::io::IsTerminal;
use std::path::PathBuf;

use crate::registry::RegistryError;

// =============================================================================
// Exit Codes
// =============================================================================

/// Exit codes for CLI operations (semantic for scripting)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// General error
    Error = 1,
    /// Invalid arguments (including malformed URLs)
    InvalidArgs = 2,
    /// No server with that id
    NotFound = 3,
    /// Operation conflicts with current state (deleting the active server)
    Conflict = 4,
    /// Server store could not be read or written
    StorageError = 5,
    /// At least one probed server is not connected
    Unreachable = 6,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> std::process::ExitCode {
        std::process::ExitCode::from(code as u8)
    }
}

impl From<&RegistryError> for ExitCode {
    fn from(err: &RegistryError) -> ExitCode {
        match err {
            RegistryError::InvalidUrl { .. } => ExitCode::InvalidArgs,
            RegistryError::NotFound(_) => ExitCode::NotFound,
            RegistryError::CannotDeleteCurrent(_) => ExitCode::Conflict,
            RegistryError::PersistenceFailure(_) => ExitCode::StorageError,
        }
    }
}

// =============================================================================
// Main CLI Structure
// =============================================================================

/// mediadeck - manage and health-check your media servers
#[derive(Parser, Debug)]
#[command(
    name = "mediadeck",
    version,
    about = "Manage and health-check Stremio/TorrServer style media servers",
    long_about = "Keeps a local list of media servers per type, tracks the \
                  active server of each type and probes their reachability.",
    after_help = "EXAMPLES:\n\
                  mediadeck list                              List all servers\n\
                  mediadeck add -t stremio -n Home -u URL -c  Add and activate\n\
                  mediadeck check -t torrserver --json        Probe all torrservers"
)]
pub struct Cli {
    /// Output format as JSON (default for non-TTY)
    #[arg(long, short = 'j', global = true)]
    pub json: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Check if JSON output should be used
    pub fn should_json(&self) -> bool {
        self.json || !std::io::stdout().is_terminal()
    }
}

// =============================================================================
// Subcommands
// =============================================================================

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List configured servers
    #[command(visible_alias = "ls")]
    List(ListCmd),

    /// Add a server
    Add(AddCmd),

    /// Change a server's URL or name
    Edit(EditCmd),

    /// Make a server the current one for its type
    Use(UseCmd),

    /// Delete a server
    #[command(visible_alias = "rm")]
    Remove(RemoveCmd),

    /// Probe server reachability
    Check(CheckCmd),
}

/// List configured servers, optionally of one type
#[derive(Args, Debug)]
pub struct ListCmd {
    /// Only servers of this type (e.g. stremio, torrserver)
    #[arg(long = "type", short = 't')]
    pub server_type: Option<String>,
}

/// Add a new server
#[derive(Args, Debug)]
pub struct AddCmd {
    /// Server type (e.g. stremio, torrserver)
    #[arg(long = "type", short = 't', required = true)]
    pub server_type: String,

    /// Display name
    #[arg(long, short = 'n', required = true)]
    pub name: String,

    /// Absolute server URL
    #[arg(long, short = 'u', required = true)]
    pub url: String,

    /// Make this the current server for its type
    #[arg(long, short = 'c')]
    pub current: bool,
}

/// Edit an existing server
#[derive(Args, Debug)]
pub struct EditCmd {
    /// Server id from `list`
    #[arg(required = true)]
    pub id: String,

    /// New absolute server URL
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// New display name
    #[arg(long, short = 'n')]
    pub name: Option<String>,
}

/// Activate a server
#[derive(Args, Debug)]
pub struct UseCmd {
    /// Server id from `list`
    #[arg(required = true)]
    pub id: String,
}

/// Delete a server
#[derive(Args, Debug)]
pub struct RemoveCmd {
    /// Server id from `list`
    #[arg(required = true)]
    pub id: String,
}

/// Probe one server, every server of a type, or everything
#[derive(Args, Debug)]
pub struct CheckCmd {
    /// Server id to probe
    #[arg(conflicts_with = "server_type")]
    pub id: Option<String>,

    /// Probe every server of this type
    #[arg(long = "type", short = 't')]
    pub server_type: Option<String>,

    /// Probe timeout in milliseconds (overrides config)
    #[arg(long)]
    pub timeout: Option<u64>,
}

// =============================================================================
// JSON Output Types
// =============================================================================

/// Envelope for `--json` output: `data` on success, `error` plus a
/// non-zero `exit_code` on failure
#[derive(Debug, Serialize, Deserialize)]
pub struct JsonOutput<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "exit_ok")]
    pub exit_code: i32,
}

fn exit_ok(code: &i32) -> bool {
    *code == i32::from(ExitCode::Success)
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            exit_code: ExitCode::Success.into(),
        }
    }
}

impl JsonOutput<()> {
    pub fn failure(msg: impl Into<String>, code: ExitCode) -> Self {
        Self {
            data: None,
            error: Some(msg.into()),
            exit_code: code.into(),
        }
    }
}

/// Body of commands that have nothing to report but success (`remove`)
#[derive(Debug, Serialize)]
pub struct StatusOk {
    pub status: &'static str,
}

impl Default for StatusOk {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Where command results go: stdout for data, stderr for messages
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    pub fn new(cli: &Cli) -> Self {
        Self {
            json: cli.should_json(),
            quiet: cli.quiet,
        }
    }

    /// Write `data` to stdout, wrapped in the envelope in JSON mode
    pub fn print<T: Serialize>(&self, data: T) -> anyhow::Result<()> {
        let text = if self.json {
            serde_json::to_string_pretty(&JsonOutput::success(data))?
        } else {
            serde_json::to_string_pretty(&data)?
        };
        println!("{}", text);
        Ok(())
    }

    /// Human mode prints `lines`; JSON mode prints `data` instead
    pub fn print_lines<T: Serialize>(&self, data: T, lines: &[String]) -> anyhow::Result<()> {
        if self.json {
            return self.print(data);
        }
        for line in lines {
            println!("{}", line);
        }
        Ok(())
    }

    /// Report a failure on stderr and hand back `code` for the caller to return
    pub fn error(&self, msg: impl Into<String>, code: ExitCode) -> ExitCode {
        let msg = msg.into();
        if self.json {
            match serde_json::to_string_pretty(&JsonOutput::<()>::failure(&msg, code)) {
                Ok(json) => eprintln!("{}", json),
                Err(_) => eprintln!("Error: {}", msg),
            }
        } else if !self.quiet {
            eprintln!("Error: {}", msg);
        }
        code
    }

    /// Progress and hints for humans; silent with `--quiet` or `--json`
    pub fn info(&self, msg: impl std::fmt::Display) {
        if !self.quiet && !self.json {
            eprintln!("{}", msg);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_check_id_conflicts_with_type() {
        let result = Cli::try_parse_from(["mediadeck", "check", "stremio-1", "-t", "stremio"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(i32::from(ExitCode::Success), 0);
        assert_eq!(i32::from(ExitCode::Error), 1);
        assert_eq!(i32::from(ExitCode::InvalidArgs), 2);
        assert_eq!(i32::from(ExitCode::NotFound), 3);
        assert_eq!(i32::from(ExitCode::Conflict), 4);
        assert_eq!(i32::from(ExitCode::StorageError), 5);
        assert_eq!(i32::from(ExitCode::Unreachable), 6);
    }

    #[test]
    fn test_json_envelope_shape() {
        let ok = serde_json::to_value(JsonOutput::success(StatusOk::default())).unwrap();
        assert_eq!(ok["data"]["status"], "ok");
        assert!(ok.get("exit_code").is_none());
        assert!(ok.get("error").is_none());

        let failed =
            serde_json::to_value(JsonOutput::<()>::failure("gone", ExitCode::NotFound)).unwrap();
        assert_eq!(failed["error"], "gone");
        assert_eq!(failed["exit_code"], 3);
        assert!(failed.get("data").is_none());
    }

    #[test]
    fn test_registry_error_exit_codes() {
        use crate::models::ServerId;

        let id = ServerId::from("stremio-1");
        assert_eq!(
            ExitCode::from(&RegistryError::NotFound(id.clone())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from(&RegistryError::CannotDeleteCurrent(id)),
            ExitCode::Conflict
        );
        assert_eq!(
            ExitCode::from(&RegistryError::InvalidUrl {
                url: "x".into(),
                reason: "relative URL without a base".into()
            }),
            ExitCode::InvalidArgs
        );
    }
}
