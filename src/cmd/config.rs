//! Configuration view and validation commands (`hostdeck config`).

use anyhow::{Context, Result};
use hostdeck::config::{CONFIG_FILE, CliOverrides, HostdeckConfig, HostdeckToml};
use hostdeck_common::HostId;
use std::path::{Path, PathBuf};

use super::super::ConfigCommands;

/// `init` runs before any settings are read, so a file that no longer
/// parses can still be recreated.
pub fn cmd_config(
    explicit: Option<&Path>,
    cli: &CliOverrides,
    command: Option<ConfigCommands>,
) -> Result<()> {
    match command {
        Some(ConfigCommands::Init) => cmd_config_init(explicit)?,
        None | Some(ConfigCommands::Show) => {
            let config = HostdeckConfig::load(explicit, cli)?;
            println!();
            println!("Hostdeck Configuration");
            println!("======================");
            println!();

            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No {} found. Using defaults.", CONFIG_FILE),
            }
            println!();
            println!("Effective values (with env/CLI overrides):");
            println!();

            let mut shown = config.toml.clone();
            if shown.api.token.is_some() {
                shown.api.token = Some("********".to_string());
            }
            let rendered =
                toml::to_string_pretty(&shown).context("Failed to render configuration")?;
            println!("{}", rendered.trim_end());
            println!();
            match config.toml.endpoint().target_for(&HostId::from(1)) {
                Ok(target) => println!("  host 1 channel = {}", target),
                Err(e) => println!("  host 1 channel = <invalid: {}>", e),
            }
            println!("  api root       = {}", config.toml.api_base());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let config = HostdeckConfig::load(explicit, cli)?;
            println!();
            println!("Validating configuration...");
            println!();

            if config.source.is_none() {
                println!("No {} found. Checking defaults.", CONFIG_FILE);
            }

            let warnings = config.toml.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
    }

    Ok(())
}

/// Write a default config file to `explicit` or `./hostdeck.toml`.
pub fn cmd_config_init(explicit: Option<&Path>) -> Result<()> {
    let path = explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if path.exists() {
        println!("{} already exists at {}", CONFIG_FILE, path.display());
        println!("Delete it first if you want to recreate it.");
        return Ok(());
    }

    HostdeckToml::default().save(&path)?;

    println!("Created {} at {}", CONFIG_FILE, path.display());
    println!();
    println!("You can now customize:");
    println!("  - [backend] host, port, secure, ws_path");
    println!("  - [api] base_url, token");
    println!("  - [channel] connect timeout and reconnect backoff");
    println!("  - [logging] level, json, directory");
    println!();
    Ok(())
}
