//! Live host cards (`hostdeck watch`).

use anyhow::{Context, Result};
use hostdeck::api::{HostDirectory, RestDirectory};
use hostdeck::config::HostdeckConfig;
use hostdeck::fleet::{Fleet, FleetEvent};
use hostdeck::session::WsConnector;
use hostdeck::ui::{FleetCards, event_line};
use hostdeck_common::HostId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

pub async fn cmd_watch(config: &HostdeckConfig, hosts: &[String]) -> Result<()> {
    let ids: Vec<HostId> = if hosts.is_empty() {
        let directory =
            RestDirectory::new(&config.toml.api_base(), config.toml.api.token.clone())?;
        directory
            .list_hosts()
            .await
            .with_context(|| format!("Failed to list hosts from {}", directory.base()))?
            .into_iter()
            .map(|record| record.id)
            .collect()
    } else {
        hosts.iter().map(|h| HostId::from(h.as_str())).collect()
    };

    if ids.is_empty() {
        println!("No hosts to watch.");
        return Ok(());
    }

    let mut fleet = Fleet::new(
        config.toml.endpoint(),
        config.toml.channel_settings(),
        Arc::new(WsConnector),
    );
    let mut events = fleet.subscribe();
    for id in ids {
        fleet.open(id)?;
    }
    info!(hosts = fleet.len(), "watching");

    let mut cards = FleetCards::new();
    cards.update(&fleet.views());
    let mut redraw = tokio::time::interval(REDRAW_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "failed to listen for Ctrl+C");
                }
                break;
            }
            event = events.recv() => match event {
                Ok(FleetEvent { host, event }) => {
                    if let Some(line) = event_line(&host, &event) {
                        cards.println(line);
                    }
                    cards.update(&fleet.views());
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event stream lagged"),
                Err(RecvError::Closed) => break,
            },
            _ = redraw.tick() => cards.update(&fleet.views()),
        }
    }

    cards.update(&fleet.views());
    cards.finish();
    println!();
    println!("Shutting down...");
    fleet.shutdown().await;
    Ok(())
}
