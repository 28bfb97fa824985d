//! CLI argument parsing using clap v4
//!
//! Defines the command-line interface for the realtime client.

use clap::{Parser, Subcommand};

/// Realtime Client - live project, milestone and task updates
///
/// Connects to the realtime event server, joins the requested rooms and
/// prints every pushed event as a JSON line.
#[derive(Parser, Debug)]
#[command(name = "realtime-client")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect, join rooms and print events until Ctrl+C
    Watch {
        /// Bearer token for the realtime handshake
        #[arg(long, env = "REALTIME_TOKEN", hide_env_values = true)]
        token: String,

        /// Path to configuration file
        #[arg(short, long, env = "REALTIME_CONFIG")]
        config: Option<String>,

        /// Override the REST API URL (realtime base is this minus /api)
        #[arg(long)]
        api_url: Option<String>,

        /// Project room to join (repeatable)
        #[arg(long = "project", value_name = "ID")]
        projects: Vec<String>,

        /// Milestone room to join (repeatable)
        #[arg(long = "milestone", value_name = "ID")]
        milestones: Vec<String>,

        /// Task room to join (repeatable)
        #[arg(long = "task", value_name = "ID")]
        tasks: Vec<String>,
    },

    /// Check whether the realtime server answers its health endpoint
    Probe {
        /// Path to configuration file
        #[arg(short, long, env = "REALTIME_CONFIG")]
        config: Option<String>,

        /// Override the REST API URL (realtime base is this minus /api)
        #[arg(long)]
        api_url: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_watch_command() {
        let cli = Cli::parse_from([
            "realtime-client",
            "watch",
            "--token",
            "abc",
            "--project",
            "p1",
            "--project",
            "p2",
            "--task",
            "t9",
        ]);
        match cli.command {
            Commands::Watch {
                token,
                projects,
                milestones,
                tasks,
                api_url,
                ..
            } => {
                assert_eq!(token, "abc");
                assert_eq!(projects, vec!["p1", "p2"]);
                assert!(milestones.is_empty());
                assert_eq!(tasks, vec!["t9"]);
                assert!(api_url.is_none());
            }
            _ => panic!("Expected Watch command"),
        }
    }

    #[test]
    fn test_probe_with_api_url() {
        let cli = Cli::parse_from([
            "realtime-client",
            "probe",
            "--api-url",
            "http://localhost:9000/api",
        ]);
        match cli.command {
            Commands::Probe { api_url, config } => {
                assert_eq!(api_url.as_deref(), Some("http://localhost:9000/api"));
                assert!(config.is_none());
            }
            _ => panic!("Expected Probe command"),
        }
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["realtime-client", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["realtime-client", "--quiet", "version"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["realtime-client", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
