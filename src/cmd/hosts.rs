//! Host directory listing (`hostdeck hosts`).

use anyhow::{Context, Result};
use console::style;
use hostdeck::api::{HostDirectory, HostRecord, RestDirectory};
use hostdeck::config::HostdeckConfig;
use hostdeck_common::HostId;

const PLACEHOLDER: &str = "-";

pub async fn cmd_hosts(config: &HostdeckConfig, id: Option<&str>) -> Result<()> {
    let directory = RestDirectory::new(&config.toml.api_base(), config.toml.api.token.clone())?;

    match id {
        Some(id) => {
            let host = directory
                .get_host(&HostId::from(id))
                .await
                .with_context(|| format!("Failed to fetch host {}", id))?;
            println!();
            println!("{} {}", style(format!("Host {}", host.id)).bold(), host.name);
            println!("  address     : {}", host.host.as_deref().unwrap_or(PLACEHOLDER));
            println!("  last update : {}", host.last_update.as_deref().unwrap_or(PLACEHOLDER));
            println!("  last commit : {}", host.last_commit.as_deref().unwrap_or(PLACEHOLDER));
            println!("  commit      : {}", host.commit.as_deref().unwrap_or(PLACEHOLDER));
            println!();
        }
        None => {
            let hosts = directory
                .list_hosts()
                .await
                .with_context(|| format!("Failed to list hosts from {}", directory.base()))?;
            if hosts.is_empty() {
                println!("No hosts found.");
                return Ok(());
            }
            println!();
            for host in &hosts {
                println!("{}", host_row(host));
            }
            println!();
            println!("{} host(s)", hosts.len());
        }
    }

    Ok(())
}

fn host_row(host: &HostRecord) -> String {
    let commit = host
        .commit
        .as_deref()
        .map(|c| c.chars().take(8).collect::<String>())
        .unwrap_or_else(|| PLACEHOLDER.to_string());
    format!(
        "  {:>6}  {:<20} {:<18} {}",
        style(host.id.as_str()).cyan(),
        host.name,
        host.host.as_deref().unwrap_or(PLACEHOLDER),
        style(commit).dim()
    )
}
