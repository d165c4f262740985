use anyhow::Result;
use clap::{Parser, Subcommand};
use hostdeck::config::{CliOverrides, HostdeckConfig};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;

mod cmd;

#[derive(Parser)]
#[command(name = "hostdeck")]
#[command(version, about = "Live operation channels to managed hosts")]
pub struct Cli {
    /// Path to hostdeck.toml. Defaults to ./hostdeck.toml, then the user config dir.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub backend_host: Option<String>,

    #[arg(long, global = true)]
    pub backend_port: Option<u16>,

    /// Connect with wss:// and https://
    #[arg(long, global = true)]
    pub secure: bool,

    /// REST API root, e.g. http://localhost:8000/api/
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    /// trace, debug, info, warn or error. RUST_LOG takes precedence.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            backend_host: self.backend_host.clone(),
            backend_port: self.backend_port,
            secure: self.secure,
            api_base: self.api_base.clone(),
            log_level: self.log_level.clone(),
            log_json: self.log_json,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show live status cards for hosts until Ctrl-C
    Watch {
        /// Host ids; all hosts from the REST directory when omitted
        hosts: Vec<String>,
    },
    /// Run one operation on one host and wait for its outcome
    Run {
        host: String,
        /// toggle_mongo, restore_backup, fast_pull or pull_with_reload
        action: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
        /// How long to wait for the connection and for the outcome
        #[arg(long, default_value = "60")]
        wait_secs: u64,
    },
    /// List hosts known to the REST directory
    Hosts {
        /// Show a single host
        #[arg(long)]
        id: Option<String>,
    },
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Serve a simulated backend for local testing
    Simulate {
        #[arg(short, long, default_value = "8000")]
        port: u16,

        #[arg(long, default_value = "5000")]
        status_interval_ms: u64,

        /// Delay between an operation's start and its outcome
        #[arg(long, default_value = "2000")]
        operation_delay_ms: u64,

        /// Make this action always fail (repeatable)
        #[arg(long = "fail", value_name = "ACTION")]
        fail: Vec<String>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default hostdeck.toml
    Init,
}

/// Layered settings plus the logging guard, which must outlive the command.
fn setup(cli: &Cli) -> Result<(HostdeckConfig, Option<WorkerGuard>)> {
    let config = HostdeckConfig::load(cli.config.as_deref(), &cli.overrides())?;
    let guard = hostdeck::logging::init(&config.toml.logging)?;
    Ok((config, guard))
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Watch { hosts } => {
            let (config, _log_guard) = setup(&cli)?;
            cmd::cmd_watch(&config, hosts).await?
        }
        Commands::Run {
            host,
            action,
            yes,
            wait_secs,
        } => {
            let (config, _log_guard) = setup(&cli)?;
            cmd::cmd_run(&config, host, action, *yes, *wait_secs).await?
        }
        Commands::Hosts { id } => {
            let (config, _log_guard) = setup(&cli)?;
            cmd::cmd_hosts(&config, id.as_deref()).await?
        }
        Commands::Config { command } => {
            cmd::cmd_config(cli.config.as_deref(), &cli.overrides(), command.clone())?
        }
        Commands::Simulate {
            port,
            status_interval_ms,
            operation_delay_ms,
            fail,
        } => {
            let (_config, _log_guard) = setup(&cli)?;
            cmd::cmd_simulate(*port, *status_interval_ms, *operation_delay_ms, fail).await?
        }
    }

    Ok(())
}
