//! Realtime Client - command-line front end
//!
//! Thin binary over the `realtime_client` library: watches live events,
//! probes server health and manages the configuration file.

mod cli;
mod watch;

use clap::Parser;
use realtime_client::channel::{AvailabilityProbe, HttpProbe};
use realtime_client::config::{self, RealtimeConfig};
use realtime_client::error::Error;
use realtime_client::protocol::Room;
use realtime_client::{logging, version};
use tracing::info;

use crate::cli::{Cli, Commands, ConfigSubcommand};

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        match e.downcast_ref::<Error>() {
            Some(err) => {
                eprint!("{}", err.format_for_terminal());
                std::process::exit(err.exit_code());
            }
            None => {
                eprintln!("\x1b[31mError\x1b[0m: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            // Config commands use minimal logging
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Probe { config, api_url } => {
            let config = load_config(config.as_deref(), api_url)?;
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;
            run_probe(&config)
        }
        Commands::Watch {
            token,
            config,
            api_url,
            projects,
            milestones,
            tasks,
        } => {
            let config = load_config(config.as_deref(), api_url)?;
            let _log_guards = logging::init_logging(&config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                base_url = %config.base_url(),
                "Starting realtime client"
            );

            let rooms: Vec<Room> = projects
                .into_iter()
                .map(Room::project)
                .chain(milestones.into_iter().map(Room::milestone))
                .chain(tasks.into_iter().map(Room::task))
                .collect();

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .thread_name("realtime-client")
                .build()
                .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

            runtime.block_on(watch::run(config, token, rooms))
        }
    }
}

/// Load configuration, letting a CLI URL override file and environment
fn load_config(path: Option<&str>, api_url: Option<String>) -> anyhow::Result<RealtimeConfig> {
    let mut config = RealtimeConfig::load(path)?;
    if let Some(url) = api_url {
        config.server.api_url = url;
        config.validate()?;
    }
    Ok(config)
}

fn run_probe(config: &RealtimeConfig) -> anyhow::Result<()> {
    let client_config = config.client_config();
    let probe = HttpProbe::new(&client_config.base_url, client_config.probe_timeout)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

    if runtime.block_on(probe.check()) {
        println!("Realtime server is available: {}", probe.health_url());
        Ok(())
    } else {
        println!("Realtime server is unavailable: {}", probe.health_url());
        std::process::exit(1);
    }
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> anyhow::Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = RealtimeConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg).map_err(Error::from)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            RealtimeConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
