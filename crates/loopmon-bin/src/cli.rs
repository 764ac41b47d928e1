// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Connect every configured server and stream its tags (default)
//! - `validate`: Validate the configuration file
//! - `version`: Show version information
//! - `browse`: List the children of a node on a live server
//! - `search`: Find nodes by display name on a live server
//! - `read`: Read the current value of one node

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// loopmon - OPC UA connection and subscription manager
///
/// Keeps sessions to a set of OPC UA servers alive, reconnects with
/// exponential backoff and streams value changes of the configured tags.
#[derive(Parser, Debug)]
#[command(
    name = "loopmon",
    author = "Sylvex <contact@sylvex.io>",
    version = loopmon_opcua::VERSION,
    about = "OPC UA connection and subscription manager",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "loopmon.yaml",
        env = "LOOPMON_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Log format; overrides the config file
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the loopmon CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Connect to every configured server and monitor its tags
    ///
    /// This is the default command when no subcommand is specified.
    /// Runs until SIGINT or SIGTERM, then disconnects everything.
    Run(RunArgs),

    /// Validate the configuration file
    Validate(ValidateArgs),

    /// Show detailed version information
    Version,

    /// Browse the children of a node
    Browse(BrowseArgs),

    /// Search the address space by display name
    ///
    /// Walks the hierarchy depth-first from the root folder and returns
    /// nodes whose display name contains the term (case-insensitive).
    Search(SearchArgs),

    /// Read the current value of a node
    Read(ReadArgs),
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Only connect the named servers (repeatable)
    #[arg(short, long = "server")]
    pub servers: Vec<String>,
}

/// Arguments for the `validate` command.
#[derive(Args, Debug, Default, Clone)]
pub struct ValidateArgs {
    /// Show parsed configuration after validation
    #[arg(short, long)]
    pub show_config: bool,

    /// Output format for validation results
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// How to reach a server for the one-shot commands.
///
/// When the endpoint matches a configured server and no flag is given, that
/// server's security settings and credentials are used.
#[derive(Args, Debug, Default, Clone)]
pub struct EndpointArgs {
    /// Endpoint URL (opc.tcp://host:port)
    pub endpoint: String,

    /// Message security mode (None, Sign, SignAndEncrypt)
    #[arg(long)]
    pub security_mode: Option<String>,

    /// Security policy (None, Basic256Sha256, Aes128Sha256RsaOaep, ...)
    #[arg(long)]
    pub security_policy: Option<String>,

    /// Username for the session
    #[arg(short, long, requires = "password")]
    pub username: Option<String>,

    /// Password for the session
    #[arg(short, long, env = "LOOPMON_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

impl EndpointArgs {
    /// Returns `true` if any connection flag was given.
    pub fn has_overrides(&self) -> bool {
        self.security_mode.is_some() || self.security_policy.is_some() || self.username.is_some()
    }
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Server to browse
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Node to browse (defaults to RootFolder)
    #[arg(short, long)]
    pub node: Option<String>,

    /// Maximum number of nodes to return
    #[arg(short, long)]
    pub max_results: Option<usize>,
}

/// Arguments for the `search` command.
#[derive(Args, Debug, Clone)]
pub struct SearchArgs {
    /// Server to search
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Text to look for in display names
    pub term: String,

    /// Maximum number of nodes to return
    #[arg(short, long)]
    pub max_results: Option<usize>,
}

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Server to read from
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Node to read
    pub node: String,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

impl From<loopmon_config::LogFormat> for LogFormat {
    fn from(format: loopmon_config::LogFormat) -> Self {
        match format {
            loopmon_config::LogFormat::Text => LogFormat::Text,
            loopmon_config::LogFormat::Json => LogFormat::Json,
            loopmon_config::LogFormat::Compact => LogFormat::Compact,
        }
    }
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Check if verbose logging is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Effective log level: `-q`/`-v` first, then `-l`, then the config file.
    pub fn effective_log_level(&self, configured: loopmon_config::LogLevel) -> String {
        if self.quiet {
            "warn".to_string()
        } else if self.verbose {
            "debug".to_string()
        } else {
            self.log_level
                .clone()
                .unwrap_or_else(|| configured.as_str().to_string())
        }
    }

    /// Effective log format: `--log-format`, then the config file.
    pub fn effective_log_format(&self, configured: loopmon_config::LogFormat) -> LogFormat {
        self.log_format.unwrap_or_else(|| configured.into())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use loopmon_config::LogLevel;

    #[test]
    fn test_default_command() {
        let cli = Cli::parse_from(["loopmon"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_command_with_servers() {
        let cli = Cli::parse_from(["loopmon", "run", "-s", "plc-1", "--server", "plc-2"]);
        if let Some(Commands::Run(args)) = cli.command {
            assert_eq!(args.servers, vec!["plc-1", "plc-2"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_validate_command() {
        let cli = Cli::parse_from(["loopmon", "validate", "--show-config", "-f", "json"]);
        if let Some(Commands::Validate(args)) = cli.command {
            assert!(args.show_config);
            assert_eq!(args.format, OutputFormat::Json);
        } else {
            panic!("Expected Validate command");
        }
    }

    #[test]
    fn test_config_path() {
        let cli = Cli::parse_from(["loopmon", "-c", "/etc/loopmon/plant.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/loopmon/plant.toml"));
    }

    #[test]
    fn test_log_level_precedence() {
        let cli = Cli::parse_from(["loopmon"]);
        assert_eq!(cli.effective_log_level(LogLevel::Error), "error");

        let cli = Cli::parse_from(["loopmon", "-l", "trace"]);
        assert_eq!(cli.effective_log_level(LogLevel::Error), "trace");

        let cli = Cli::parse_from(["loopmon", "-l", "trace", "-q"]);
        assert_eq!(cli.effective_log_level(LogLevel::Error), "warn");

        let cli = Cli::parse_from(["loopmon", "-v"]);
        assert!(cli.is_verbose());
        assert_eq!(cli.effective_log_level(LogLevel::Info), "debug");
    }

    #[test]
    fn test_log_format_precedence() {
        let cli = Cli::parse_from(["loopmon"]);
        assert_eq!(
            cli.effective_log_format(loopmon_config::LogFormat::Json),
            LogFormat::Json
        );

        let cli = Cli::parse_from(["loopmon", "--log-format", "compact"]);
        assert_eq!(
            cli.effective_log_format(loopmon_config::LogFormat::Json),
            LogFormat::Compact
        );
    }

    #[test]
    fn test_browse_command() {
        let cli = Cli::parse_from([
            "loopmon",
            "browse",
            "opc.tcp://plc-1:4840",
            "--node",
            "ns=2;s=Line1",
            "--max-results",
            "20",
        ]);
        if let Some(Commands::Browse(args)) = cli.command {
            assert_eq!(args.endpoint.endpoint, "opc.tcp://plc-1:4840");
            assert_eq!(args.node.as_deref(), Some("ns=2;s=Line1"));
            assert_eq!(args.max_results, Some(20));
            assert!(!args.endpoint.has_overrides());
        } else {
            panic!("Expected Browse command");
        }
    }

    #[test]
    fn test_search_command() {
        let cli = Cli::parse_from([
            "loopmon",
            "search",
            "opc.tcp://plc-1:4840",
            "temperature",
            "--security-mode",
            "None",
        ]);
        if let Some(Commands::Search(args)) = cli.command {
            assert_eq!(args.term, "temperature");
            assert_eq!(args.max_results, None);
            assert!(args.endpoint.has_overrides());
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_read_command() {
        let cli = Cli::parse_from(["loopmon", "read", "opc.tcp://plc-1:4840", "ns=2;i=1001"]);
        if let Some(Commands::Read(args)) = cli.command {
            assert_eq!(args.node, "ns=2;i=1001");
            assert_eq!(args.endpoint.format, OutputFormat::Text);
        } else {
            panic!("Expected Read command");
        }
    }

    #[test]
    fn test_username_requires_password() {
        let result = Cli::try_parse_from([
            "loopmon",
            "read",
            "opc.tcp://plc-1:4840",
            "i=2258",
            "-u",
            "operator",
        ]);
        // LOOPMON_PASSWORD may be set in the environment running the tests.
        if std::env::var("LOOPMON_PASSWORD").is_err() {
            assert!(result.is_err());
        }
    }
}
